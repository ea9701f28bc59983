//! Vector persistence for chunks and their embedding views.
//!
//! The service talks to storage only through [`VectorStore`], so retrieval
//! logic stays identical whether it runs against the in-process
//! [`MemoryStore`] or a Qdrant collection.

pub mod memory;
pub mod qdrant;

mod error;

pub use error::Error;
pub use memory::MemoryStore;
pub use qdrant::QdrantStore;

pub type Result<T, E = Error> = std::result::Result<T, E>;
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

use std::{future::Future, pin::Pin};

use uuid::Uuid;

use trellis_domain::{Chunk, ChunkScale, EmbeddingView, ViewKind};

/// Narrowing applied to store queries. An empty filter matches everything.
#[derive(Clone, Debug, Default)]
pub struct StoreFilter {
	pub document_id: Option<Uuid>,
	pub scales: Vec<ChunkScale>,
}
impl StoreFilter {
	pub(crate) fn matches(&self, chunk: &Chunk) -> bool {
		if self.document_id.is_some_and(|id| id != chunk.document_id) {
			return false;
		}

		self.scales.is_empty() || self.scales.contains(&chunk.scale)
	}
}

/// A nearest-neighbor match, higher score first.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SearchHit {
	pub chunk_id: Uuid,
	pub score: f32,
}

/// Persistence seam between the pipeline and a vector backend.
///
/// Chunks and views are written together because a backend point carries all
/// of a chunk's named vectors at once; writing them in two passes would let
/// the second pass clobber the first.
pub trait VectorStore
where
	Self: Send + Sync,
{
	/// Writes one point per chunk, carrying every view vector produced for it
	/// plus the chunk itself as payload. Re-upserting an id replaces it.
	fn upsert<'a>(
		&'a self,
		chunks: &'a [Chunk],
		views: &'a [EmbeddingView],
	) -> BoxFuture<'a, Result<()>>;

	/// Nearest neighbors of `vector` within the named view space.
	fn query_nearest<'a>(
		&'a self,
		kind: ViewKind,
		vector: &'a [f32],
		limit: usize,
		filter: &'a StoreFilter,
	) -> BoxFuture<'a, Result<Vec<SearchHit>>>;

	/// Sparse term matching over chunk content, for exact-term lookups.
	fn query_terms<'a>(
		&'a self,
		terms: &'a [String],
		limit: usize,
		filter: &'a StoreFilter,
	) -> BoxFuture<'a, Result<Vec<SearchHit>>>;

	/// Materializes chunks by id. Unknown ids are skipped, not errors; the
	/// caller decides whether a miss matters.
	fn fetch_chunks<'a>(&'a self, ids: &'a [Uuid]) -> BoxFuture<'a, Result<Vec<Chunk>>>;

	/// Drops every point belonging to the document, across all scales.
	fn remove_document<'a>(&'a self, document_id: Uuid) -> BoxFuture<'a, Result<()>>;
}
