mod acceptance {
	mod hierarchy_shape;
	mod multi_view_ingestion;
	mod quality_gating;
	mod version_replacement;

	use std::sync::Arc;

	use trellis_config::{Config, EmbeddingProviderConfig};
	use trellis_service::{BoxFuture, EmbeddingProvider, Providers, Result, TrellisService};
	use trellis_storage::MemoryStore;

	pub const VECTOR_DIM: usize = 64;

	/// Deterministic provider double. Identical text always produces the same
	/// unit vector, so every journey replays identically run over run.
	pub struct StubEmbedding;
	impl EmbeddingProvider for StubEmbedding {
		fn embed<'a>(
			&'a self,
			_: &'a EmbeddingProviderConfig,
			texts: &'a [String],
		) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
			Box::pin(async move {
				Ok(texts
					.iter()
					.map(|text| trellis_testkit::embed_text(text, VECTOR_DIM))
					.collect())
			})
		}
	}

	pub fn test_config() -> Config {
		let mut cfg = Config::default();

		cfg.embedding.provider.dimensions = VECTOR_DIM as u32;
		cfg.embedding.max_attempts = 1;

		cfg
	}

	pub fn build_service(cfg: Config) -> (Arc<TrellisService>, Arc<MemoryStore>) {
		trellis_testkit::init_tracing();

		let store = Arc::new(MemoryStore::new());
		let providers = Providers::new(Arc::new(StubEmbedding));
		let service = TrellisService::with_providers(cfg, store.clone(), providers)
			.expect("Failed to build service.");

		(Arc::new(service), store)
	}
}
