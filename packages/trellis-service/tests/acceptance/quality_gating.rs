use time::OffsetDateTime;
use uuid::Uuid;

use trellis_domain::{Chunk, ChunkFlag, ChunkScale, EmbeddingView, ViewKind};
use trellis_service::{QueryContext, RetrievalOptions};
use trellis_storage::VectorStore;

use super::{VECTOR_DIM, build_service, test_config};

fn paragraph(
	document_id: Uuid,
	sequence: u32,
	quality: f32,
	flags: Vec<ChunkFlag>,
	content: &str,
) -> Chunk {
	let id = Chunk::deterministic_id(document_id, 1, ChunkScale::Paragraph, sequence);

	Chunk {
		id,
		document_id,
		document_version: 1,
		scale: ChunkScale::Paragraph,
		content: content.to_string(),
		token_count: content.chars().count().div_ceil(4) as u32,
		sequence_order: sequence,
		parent_id: None,
		child_ids: Vec::new(),
		sibling_ids: Vec::new(),
		quality_score: quality,
		coherence_score: 1.,
		hierarchy_path: vec![id],
		flags,
		start_offset: 0,
		end_offset: content.len(),
	}
}

fn content_view(chunk: &Chunk) -> EmbeddingView {
	EmbeddingView {
		chunk_id: chunk.id,
		kind: ViewKind::Content,
		vector: trellis_testkit::embed_text(&chunk.content, VECTOR_DIM),
		quality_score: 1.,
		generated_at: OffsetDateTime::now_utc(),
	}
}

#[tokio::test]
async fn low_quality_chunks_stay_stored_but_never_surface() {
	let (service, store) = build_service(test_config());
	let document_id = Uuid::new_v4();
	let strong = paragraph(
		document_id,
		0,
		0.9,
		Vec::new(),
		"The scheduler rebalances runnable tasks across idle cores every tick.",
	);
	let weak = paragraph(
		document_id,
		1,
		0.2,
		vec![ChunkFlag::QualityBelowFloor],
		"The scheduler rebalances runnable tasks across stalled cores every epoch.",
	);
	let views = vec![content_view(&strong), content_view(&weak)];

	store
		.upsert(&[strong.clone(), weak.clone()], &views)
		.await
		.expect("Upsert failed.");

	let response = service
		.retrieve(
			"how does the scheduler rebalance runnable tasks",
			&QueryContext::default(),
			&RetrievalOptions::default(),
		)
		.await
		.expect("Retrieval failed.");

	assert!(!response.no_qualifying_context);
	assert!(!response.results.is_empty());
	assert!(response.results.iter().all(|candidate| candidate.chunk.id == strong.id));

	// Flagged, not dropped: the chunk stays fetchable for inspection.
	let kept = store.fetch_chunks(&[weak.id]).await.expect("Fetch failed.");
	assert_eq!(kept.len(), 1);
	assert!(kept[0].is_flagged(ChunkFlag::QualityBelowFloor));
}
