use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
	pub chunking: Chunking,
	pub embedding: Embedding,
	pub retrieval: Retrieval,
	pub pipeline: Pipeline,
	pub storage: Storage,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Chunking {
	pub adaptive_sizing: bool,
	pub semantic_boundaries: bool,
	pub preserve_cross_references: bool,
	/// Similarity drop an accepted boundary must exceed.
	pub boundary_threshold: f32,
	pub quality_floor: f32,
	pub remerge_below_floor: bool,
	pub tokenizer_repo: Option<String>,
	pub scales: Scales,
}
impl Default for Chunking {
	fn default() -> Self {
		Self {
			adaptive_sizing: true,
			semantic_boundaries: true,
			preserve_cross_references: true,
			boundary_threshold: 0.3,
			quality_floor: 0.4,
			remerge_below_floor: true,
			tokenizer_repo: None,
			scales: Scales::default(),
		}
	}
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Scales {
	pub document: ScaleLimits,
	pub section: ScaleLimits,
	pub paragraph: ScaleLimits,
	pub sentence: ScaleLimits,
}
impl Default for Scales {
	fn default() -> Self {
		Self {
			document: ScaleLimits { max_tokens: 8_000, min_tokens: 2_000, overlap_tokens: 0 },
			section: ScaleLimits { max_tokens: 2_000, min_tokens: 500, overlap_tokens: 100 },
			paragraph: ScaleLimits { max_tokens: 500, min_tokens: 100, overlap_tokens: 50 },
			sentence: ScaleLimits { max_tokens: 150, min_tokens: 20, overlap_tokens: 0 },
		}
	}
}

#[derive(Clone, Copy, Debug, Deserialize)]
pub struct ScaleLimits {
	pub max_tokens: u32,
	pub min_tokens: u32,
	pub overlap_tokens: u32,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Embedding {
	pub provider: EmbeddingProviderConfig,
	/// View kinds generated per chunk. Subset of content, contextual,
	/// hierarchical, semantic.
	pub views: Vec<String>,
	pub batch_size: u32,
	pub max_attempts: u32,
	pub batch_timeout_ms: u64,
	pub cache_capacity: usize,
	pub context_window_tokens: u32,
	/// Texts longer than this are not embedded directly; document-scale
	/// chunks fall back to pooling their children's vectors.
	pub single_input_budget_tokens: u32,
	pub domain_terms: Vec<String>,
	pub domain_boost: f32,
	pub validation_floor: f32,
}
impl Default for Embedding {
	fn default() -> Self {
		Self {
			provider: EmbeddingProviderConfig::default(),
			views: vec![
				"content".to_string(),
				"contextual".to_string(),
				"hierarchical".to_string(),
				"semantic".to_string(),
			],
			batch_size: 100,
			max_attempts: 3,
			batch_timeout_ms: 30_000,
			cache_capacity: 4_096,
			context_window_tokens: 1_000,
			single_input_budget_tokens: 6_000,
			domain_terms: Vec::new(),
			domain_boost: 1.2,
			validation_floor: 0.3,
		}
	}
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	pub default_headers: Map<String, Value>,
}
impl Default for EmbeddingProviderConfig {
	fn default() -> Self {
		Self {
			provider_id: "openai".to_string(),
			api_base: "https://api.openai.com".to_string(),
			api_key: String::new(),
			path: "/v1/embeddings".to_string(),
			model: "text-embedding-3-small".to_string(),
			dimensions: 1_536,
			timeout_ms: 30_000,
			default_headers: Map::new(),
		}
	}
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Retrieval {
	pub top_n: u32,
	pub quality_floor: f32,
	/// Ends-inward reordering of the final list for long-context consumers.
	pub reorder: bool,
	pub expansion: Expansion,
	pub diversity: Diversity,
	pub multi_hop: MultiHop,
}
impl Default for Retrieval {
	fn default() -> Self {
		Self {
			top_n: 10,
			quality_floor: 0.5,
			reorder: true,
			expansion: Expansion::default(),
			diversity: Diversity::default(),
			multi_hop: MultiHop::default(),
		}
	}
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Expansion {
	pub enabled: bool,
	pub sibling_limit: u32,
	pub max_related: u32,
}
impl Default for Expansion {
	fn default() -> Self {
		Self { enabled: true, sibling_limit: 2, max_related: 3 }
	}
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Diversity {
	pub final_k: u32,
	pub mmr_lambda: f32,
	pub duplication_ceiling: f32,
	pub max_skips: u32,
}
impl Default for Diversity {
	fn default() -> Self {
		Self { final_k: 5, mmr_lambda: 0.5, duplication_ceiling: 0.88, max_skips: 16 }
	}
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct MultiHop {
	pub enabled: bool,
	pub max_hops: u32,
	pub confidence_floor: f32,
}
impl Default for MultiHop {
	fn default() -> Self {
		Self { enabled: true, max_hops: 2, confidence_floor: 0.55 }
	}
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Pipeline {
	/// 0 selects min(4, available parallelism).
	pub concurrency: u32,
}
impl Default for Pipeline {
	fn default() -> Self {
		Self { concurrency: 0 }
	}
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Storage {
	pub qdrant: Option<Qdrant>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Qdrant {
	pub url: String,
	pub collection: String,
	pub vector_dim: u32,
}
