//! In-process [`VectorStore`] backed by hash maps. Exact nearest-neighbor by
//! linear scan, so it doubles as the reference the Qdrant backend is checked
//! against.

use std::collections::HashMap;

use ahash::AHashSet;
use tokio::sync::RwLock;
use uuid::Uuid;

use trellis_domain::{Chunk, EmbeddingView, ViewKind, similarity, terms};

use crate::{BoxFuture, Result, SearchHit, StoreFilter, VectorStore};

#[derive(Default)]
struct Inner {
	chunks: HashMap<Uuid, Chunk>,
	vectors: HashMap<(Uuid, ViewKind), Vec<f32>>,
	term_sets: HashMap<Uuid, AHashSet<String>>,
}

#[derive(Default)]
pub struct MemoryStore {
	inner: RwLock<Inner>,
}
impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Number of chunks currently held.
	pub async fn len(&self) -> usize {
		self.inner.read().await.chunks.len()
	}

	pub async fn is_empty(&self) -> bool {
		self.inner.read().await.chunks.is_empty()
	}
}
impl VectorStore for MemoryStore {
	fn upsert<'a>(
		&'a self,
		chunks: &'a [Chunk],
		views: &'a [EmbeddingView],
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let mut inner = self.inner.write().await;

			for chunk in chunks {
				inner.term_sets.insert(chunk.id, terms::term_set(&chunk.content));
				inner.chunks.insert(chunk.id, chunk.clone());
			}
			for view in views {
				inner.vectors.insert((view.chunk_id, view.kind), view.vector.clone());
			}

			Ok(())
		})
	}

	fn query_nearest<'a>(
		&'a self,
		kind: ViewKind,
		vector: &'a [f32],
		limit: usize,
		filter: &'a StoreFilter,
	) -> BoxFuture<'a, Result<Vec<SearchHit>>> {
		Box::pin(async move {
			let inner = self.inner.read().await;
			let mut hits = Vec::new();

			for ((chunk_id, view_kind), candidate) in &inner.vectors {
				if *view_kind != kind {
					continue;
				}

				let Some(chunk) = inner.chunks.get(chunk_id) else {
					continue;
				};

				if !filter.matches(chunk) {
					continue;
				}
				if let Some(score) = similarity::cosine_similarity(vector, candidate) {
					hits.push(SearchHit { chunk_id: *chunk_id, score });
				}
			}

			sort_hits(&mut hits, limit);

			Ok(hits)
		})
	}

	fn query_terms<'a>(
		&'a self,
		terms: &'a [String],
		limit: usize,
		filter: &'a StoreFilter,
	) -> BoxFuture<'a, Result<Vec<SearchHit>>> {
		Box::pin(async move {
			if terms.is_empty() {
				return Ok(Vec::new());
			}

			let inner = self.inner.read().await;
			let query =
				terms.iter().map(|t| t.to_lowercase()).collect::<AHashSet<_>>();
			let mut hits = Vec::new();

			for (chunk_id, chunk) in &inner.chunks {
				if !filter.matches(chunk) {
					continue;
				}

				let Some(term_set) = inner.term_sets.get(chunk_id) else {
					continue;
				};
				let matched = query.iter().filter(|t| term_set.contains(*t)).count();

				if matched > 0 {
					hits.push(SearchHit {
						chunk_id: *chunk_id,
						score: matched as f32 / query.len() as f32,
					});
				}
			}

			sort_hits(&mut hits, limit);

			Ok(hits)
		})
	}

	fn fetch_chunks<'a>(&'a self, ids: &'a [Uuid]) -> BoxFuture<'a, Result<Vec<Chunk>>> {
		Box::pin(async move {
			let inner = self.inner.read().await;

			Ok(ids.iter().filter_map(|id| inner.chunks.get(id)).cloned().collect())
		})
	}

	fn remove_document<'a>(&'a self, document_id: Uuid) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let mut inner = self.inner.write().await;
			let removed = inner
				.chunks
				.values()
				.filter(|chunk| chunk.document_id == document_id)
				.map(|chunk| chunk.id)
				.collect::<Vec<_>>();

			for id in &removed {
				inner.chunks.remove(id);
				inner.term_sets.remove(id);
				for kind in ViewKind::ALL {
					inner.vectors.remove(&(*id, kind));
				}
			}

			Ok(())
		})
	}
}

/// Score-descending with an id tiebreak, so equal scores order the same way
/// run over run.
fn sort_hits(hits: &mut Vec<SearchHit>, limit: usize) {
	hits.sort_by(|a, b| {
		b.score.total_cmp(&a.score).then_with(|| a.chunk_id.cmp(&b.chunk_id))
	});
	hits.truncate(limit);
}
