use ahash::AHashMap;
use uuid::Uuid;

use trellis_domain::ChunkForest;

/// In-process arena of the chunk hierarchies produced by the pipeline, one
/// forest per document, replaced wholesale on re-ingestion.
///
/// Retrieval reads relationship links from here when the document was
/// processed by this instance; everything else it needs travels inside the
/// stored chunks themselves.
#[derive(Default)]
pub struct ChunkRegistry {
	documents: AHashMap<Uuid, ChunkForest>,
}
impl ChunkRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn len(&self) -> usize {
		self.documents.len()
	}

	pub fn is_empty(&self) -> bool {
		self.documents.is_empty()
	}

	pub fn insert(&mut self, document_id: Uuid, forest: ChunkForest) {
		self.documents.insert(document_id, forest);
	}

	pub fn forest(&self, document_id: Uuid) -> Option<&ChunkForest> {
		self.documents.get(&document_id)
	}

	/// Ids related to `chunk_id` through recorded relationships, strongest
	/// first, each paired with the relationship strength.
	pub fn related_ids(&self, document_id: Uuid, chunk_id: Uuid) -> Vec<(Uuid, f32)> {
		let Some(forest) = self.documents.get(&document_id) else {
			return Vec::new();
		};
		let mut related = forest
			.relationships_for(chunk_id)
			.into_iter()
			.map(|relationship| {
				let other = if relationship.source_chunk_id == chunk_id {
					relationship.target_chunk_id
				} else {
					relationship.source_chunk_id
				};

				(other, relationship.strength)
			})
			.collect::<Vec<_>>();

		related.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
		related.dedup_by_key(|entry| entry.0);

		related
	}
}
