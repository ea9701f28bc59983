use time::OffsetDateTime;
use uuid::Uuid;

use trellis_domain::{Chunk, ChunkScale, EmbeddingView, ViewKind};
use trellis_storage::{MemoryStore, StoreFilter, VectorStore};

const DIM: usize = 64;

fn dummy_chunk(document_id: Uuid, scale: ChunkScale, sequence: u32, content: &str) -> Chunk {
	let id = Chunk::deterministic_id(document_id, 1, scale, sequence);

	Chunk {
		id,
		document_id,
		document_version: 1,
		scale,
		content: content.to_string(),
		token_count: content.len().div_ceil(4) as u32,
		sequence_order: sequence,
		parent_id: None,
		child_ids: Vec::new(),
		sibling_ids: Vec::new(),
		quality_score: 1.,
		coherence_score: 1.,
		hierarchy_path: vec![id],
		flags: Vec::new(),
		start_offset: 0,
		end_offset: content.len(),
	}
}

fn content_view(chunk: &Chunk) -> EmbeddingView {
	EmbeddingView {
		chunk_id: chunk.id,
		kind: ViewKind::Content,
		vector: trellis_testkit::embed_text(&chunk.content, DIM),
		quality_score: chunk.quality_score,
		generated_at: OffsetDateTime::now_utc(),
	}
}

async fn seeded_store(document_id: Uuid) -> (MemoryStore, Vec<Chunk>) {
	let chunks = vec![
		dummy_chunk(document_id, ChunkScale::Paragraph, 0, "the scheduler drains the runqueue"),
		dummy_chunk(document_id, ChunkScale::Paragraph, 1, "reclaim scans the inactive lists"),
		dummy_chunk(document_id, ChunkScale::Sentence, 0, "the planner reorders join trees"),
	];
	let views = chunks.iter().map(content_view).collect::<Vec<_>>();
	let store = MemoryStore::new();

	store.upsert(&chunks, &views).await.expect("Upsert must succeed.");

	(store, chunks)
}

#[tokio::test]
async fn nearest_neighbors_rank_by_cosine() {
	let document_id = Uuid::new_v4();
	let (store, chunks) = seeded_store(document_id).await;
	let query = trellis_testkit::embed_text(&chunks[1].content, DIM);
	let hits = store
		.query_nearest(ViewKind::Content, &query, 10, &StoreFilter::default())
		.await
		.expect("Query must succeed.");

	assert_eq!(hits.len(), 3);
	assert_eq!(hits[0].chunk_id, chunks[1].id);
	assert!(hits[0].score > 0.99);
	assert!(hits[0].score >= hits[1].score && hits[1].score >= hits[2].score);
}

#[tokio::test]
async fn filters_narrow_by_document_and_scale() {
	let document_id = Uuid::new_v4();
	let other_document = Uuid::new_v4();
	let (store, chunks) = seeded_store(document_id).await;
	let foreign = dummy_chunk(other_document, ChunkScale::Paragraph, 0, "the scheduler yields");

	store.upsert(&[foreign.clone()], &[content_view(&foreign)]).await.expect("Upsert must succeed.");

	let query = trellis_testkit::embed_text("the scheduler", DIM);
	let filter = StoreFilter { document_id: Some(document_id), scales: Vec::new() };
	let hits = store
		.query_nearest(ViewKind::Content, &query, 10, &filter)
		.await
		.expect("Query must succeed.");

	assert!(hits.iter().all(|hit| hit.chunk_id != foreign.id));

	let filter =
		StoreFilter { document_id: Some(document_id), scales: vec![ChunkScale::Sentence] };
	let hits = store
		.query_nearest(ViewKind::Content, &query, 10, &filter)
		.await
		.expect("Query must succeed.");

	assert_eq!(hits.len(), 1);
	assert_eq!(hits[0].chunk_id, chunks[2].id);
}

#[tokio::test]
async fn term_queries_score_the_matched_fraction() {
	let document_id = Uuid::new_v4();
	let (store, chunks) = seeded_store(document_id).await;
	let terms = ["reclaim".to_string(), "inactive".to_string()];
	let hits = store
		.query_terms(&terms, 10, &StoreFilter::default())
		.await
		.expect("Query must succeed.");

	assert_eq!(hits.len(), 1);
	assert_eq!(hits[0].chunk_id, chunks[1].id);
	assert!((hits[0].score - 1.).abs() < f32::EPSILON);

	let terms = ["reclaim".to_string(), "runqueue".to_string()];
	let hits = store
		.query_terms(&terms, 10, &StoreFilter::default())
		.await
		.expect("Query must succeed.");

	assert_eq!(hits.len(), 2);
	assert!(hits.iter().all(|hit| (hit.score - 0.5).abs() < f32::EPSILON));
}

#[tokio::test]
async fn reupserting_a_chunk_replaces_it() {
	let document_id = Uuid::new_v4();
	let (store, chunks) = seeded_store(document_id).await;
	let mut replacement = chunks[0].clone();

	replacement.content = "the allocator compacts the arena".to_string();

	store
		.upsert(&[replacement.clone()], &[content_view(&replacement)])
		.await
		.expect("Upsert must succeed.");

	assert_eq!(store.len().await, 3);

	let fetched =
		store.fetch_chunks(&[replacement.id]).await.expect("Fetch must succeed.");

	assert_eq!(fetched[0].content, replacement.content);

	let hits = store
		.query_terms(&["runqueue".to_string()], 10, &StoreFilter::default())
		.await
		.expect("Query must succeed.");

	assert!(hits.is_empty());
}

#[tokio::test]
async fn removing_a_document_drops_its_points() {
	let document_id = Uuid::new_v4();
	let survivor_document = Uuid::new_v4();
	let (store, chunks) = seeded_store(document_id).await;
	let survivor =
		dummy_chunk(survivor_document, ChunkScale::Paragraph, 0, "the compactor seals runs");

	store
		.upsert(&[survivor.clone()], &[content_view(&survivor)])
		.await
		.expect("Upsert must succeed.");
	store.remove_document(document_id).await.expect("Remove must succeed.");

	assert_eq!(store.len().await, 1);

	let ids = chunks.iter().map(|chunk| chunk.id).collect::<Vec<_>>();
	let fetched = store.fetch_chunks(&ids).await.expect("Fetch must succeed.");

	assert!(fetched.is_empty());

	let query = trellis_testkit::embed_text(&chunks[0].content, DIM);
	let hits = store
		.query_nearest(ViewKind::Content, &query, 10, &StoreFilter::default())
		.await
		.expect("Query must succeed.");

	assert_eq!(hits.len(), 1);
	assert_eq!(hits[0].chunk_id, survivor.id);
}

#[tokio::test]
async fn unknown_ids_are_skipped_on_fetch() {
	let document_id = Uuid::new_v4();
	let (store, chunks) = seeded_store(document_id).await;
	let ids = [chunks[0].id, Uuid::new_v4()];
	let fetched = store.fetch_chunks(&ids).await.expect("Fetch must succeed.");

	assert_eq!(fetched.len(), 1);
	assert_eq!(fetched[0].id, chunks[0].id);
}
