use std::collections::HashMap;

use uuid::Uuid;

use trellis_domain::{ViewKind, similarity};

use super::{VECTOR_DIM, build_service, test_config};

#[tokio::test]
async fn oversized_roots_pool_a_content_view_while_other_chunks_get_all_views() {
	let mut cfg = test_config();

	// Fits every section and paragraph but not the whole document.
	cfg.embedding.single_input_budget_tokens = 2_000;

	let (service, _store) = build_service(cfg);
	let document = trellis_testkit::two_section_document();

	let result = service.process(&document).await.expect("Processing failed.");
	let root = result.forest.roots()[0];
	assert!(root.token_count > 2_000);

	let mut kinds_by_chunk: HashMap<Uuid, Vec<ViewKind>> = HashMap::new();
	for view in &result.views {
		assert_eq!(view.vector.len(), VECTOR_DIM);
		kinds_by_chunk.entry(view.chunk_id).or_default().push(view.kind);
	}

	for chunk in result.forest.iter() {
		let kinds = kinds_by_chunk.get(&chunk.id).expect("Every chunk must carry views.");

		if chunk.id == root.id {
			assert_eq!(kinds.as_slice(), [ViewKind::Content]);
		} else {
			assert_eq!(kinds.len(), ViewKind::ALL.len());
		}
	}

	// The pooled root vector is the mean of its section content vectors.
	let section_vectors: Vec<Vec<f32>> = result
		.forest
		.children_of(root.id)
		.iter()
		.map(|section| {
			result
				.views
				.iter()
				.find(|view| view.chunk_id == section.id && view.kind == ViewKind::Content)
				.expect("Sections must carry a content view.")
				.vector
				.clone()
		})
		.collect();
	let pooled = similarity::mean_pool(&section_vectors).expect("Pooling must succeed.");
	let root_view = result
		.views
		.iter()
		.find(|view| view.chunk_id == root.id)
		.expect("The root must carry a pooled content view.");
	let agreement = similarity::cosine_similarity(&root_view.vector, &pooled)
		.expect("Pooled vectors must have signal.");
	assert!(agreement > 0.999, "pooled root view diverged: {agreement}");

	let absent = &result.quality.absent_views;
	assert_eq!(absent.len(), ViewKind::ALL.len() - 1);
	assert!(absent.iter().all(|view| view.chunk_id == root.id));
	assert!(absent.iter().all(|view| view.reason == "Text exceeds the single-input budget."));
	assert_eq!(result.stats.embeddings_generated as usize, result.views.len());
}
