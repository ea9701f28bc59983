//! Orchestration layer: multi-view embedding, strategy-driven retrieval and
//! the document processing pipeline, wired over the storage and provider
//! seams so tests can swap either side out.

pub mod embed;
pub mod pipeline;
pub mod registry;
pub mod retrieve;

mod error;

use std::{future::Future, pin::Pin, sync::Arc};

pub use embed::{AbsentView, EmbeddingReport};
pub use error::{Error, Result};
pub use pipeline::{
	BatchFailure, BatchReport, FlaggedChunk, ProcessingResult, ProcessingStats, QualityReport,
};
pub use registry::ChunkRegistry;
pub use retrieve::{
	ExpansionSource, QueryContext, RetrievalCandidate, RetrievalOptions, RetrievalResponse,
	Strategy,
};

use tokio::sync::RwLock;
use uuid::Uuid;

use trellis_chunking::TokenCounter;
use trellis_config::{Config, EmbeddingProviderConfig};
use trellis_domain::ChunkForest;
use trellis_providers::embedding;
use trellis_storage::VectorStore;

use crate::embed::ViewCache;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>>;
}

struct DefaultProviders;
impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
		Box::pin(async move { embedding::embed(cfg, texts).await.map_err(Error::from) })
	}
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
}
impl Providers {
	pub fn new(embedding: Arc<dyn EmbeddingProvider>) -> Self {
		Self { embedding }
	}
}
impl Default for Providers {
	fn default() -> Self {
		Self { embedding: Arc::new(DefaultProviders) }
	}
}

pub struct TrellisService {
	pub cfg: Config,
	pub store: Arc<dyn VectorStore>,
	pub providers: Providers,
	counter: TokenCounter,
	cache: ViewCache,
	registry: RwLock<ChunkRegistry>,
}
impl TrellisService {
	pub fn new(cfg: Config, store: Arc<dyn VectorStore>) -> Result<Self> {
		Self::with_providers(cfg, store, Providers::default())
	}

	pub fn with_providers(
		cfg: Config,
		store: Arc<dyn VectorStore>,
		providers: Providers,
	) -> Result<Self> {
		let counter = TokenCounter::from_config(&cfg.chunking)?;
		let cache = ViewCache::new(cfg.embedding.cache_capacity);

		Ok(Self {
			cfg,
			store,
			providers,
			counter,
			cache,
			registry: RwLock::new(ChunkRegistry::new()),
		})
	}

	/// Forest of the most recent in-process run for a document, if any. The
	/// registry is a cache, not a store: a fresh service instance starts
	/// empty and retrieval degrades gracefully without it.
	pub async fn cached_forest(&self, document_id: Uuid) -> Option<ChunkForest> {
		self.registry.read().await.forest(document_id).cloned()
	}
}
