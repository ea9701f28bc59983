use uuid::Uuid;

use trellis_service::{QueryContext, RetrievalOptions};
use trellis_storage::VectorStore;

use super::{build_service, test_config};

#[tokio::test]
async fn reingesting_a_new_version_replaces_every_stored_chunk() {
	let (service, store) = build_service(test_config());
	let first = trellis_testkit::two_section_document();

	let one = service.process(&first).await.expect("First processing failed.");
	let first_ids: Vec<Uuid> = one.forest.iter().map(|chunk| chunk.id).collect();
	assert_eq!(store.len().await, first_ids.len());

	let mut second = first.clone();
	second.version = 2;

	let two = service.process(&second).await.expect("Second processing failed.");

	// Same text, new version: fresh identities, and none of the old ones left.
	assert_eq!(store.len().await, two.forest.len());
	assert!(two.forest.iter().all(|chunk| chunk.document_version == 2));

	let stale = store.fetch_chunks(&first_ids).await.expect("Fetch failed.");
	assert!(stale.is_empty());

	let cached = service.cached_forest(first.id).await.expect("Forest must stay cached.");
	assert_eq!(cached.roots()[0].document_version, 2);

	let response = service
		.retrieve(
			"how does the reclaim scanner age the working set",
			&QueryContext::default(),
			&RetrievalOptions::default(),
		)
		.await
		.expect("Retrieval failed.");

	assert!(!response.results.is_empty());
	assert!(response.results.iter().all(|candidate| candidate.chunk.document_version == 2));
}
