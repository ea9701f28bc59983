mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Chunking, Config, Diversity, Embedding, EmbeddingProviderConfig, Expansion, MultiHop, Pipeline,
	Qdrant, Retrieval, ScaleLimits, Scales, Storage,
};

use std::{fs, path::Path};

pub const KNOWN_VIEWS: [&str; 4] = ["content", "contextual", "hierarchical", "semantic"];

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if !(0.0..1.0).contains(&cfg.chunking.boundary_threshold) {
		return Err(Error::Validation {
			message: "chunking.boundary_threshold must be in the range 0.0-1.0.".to_string(),
		});
	}
	if !(0.0..=1.0).contains(&cfg.chunking.quality_floor) {
		return Err(Error::Validation {
			message: "chunking.quality_floor must be in the range 0.0-1.0.".to_string(),
		});
	}

	for (label, limits) in [
		("document", &cfg.chunking.scales.document),
		("section", &cfg.chunking.scales.section),
		("paragraph", &cfg.chunking.scales.paragraph),
		("sentence", &cfg.chunking.scales.sentence),
	] {
		if limits.max_tokens == 0 {
			return Err(Error::Validation {
				message: format!("chunking.scales.{label}.max_tokens must be greater than zero."),
			});
		}
		if limits.min_tokens >= limits.max_tokens {
			return Err(Error::Validation {
				message: format!(
					"chunking.scales.{label}.min_tokens must be less than max_tokens."
				),
			});
		}
		if limits.overlap_tokens >= limits.max_tokens {
			return Err(Error::Validation {
				message: format!(
					"chunking.scales.{label}.overlap_tokens must be less than max_tokens."
				),
			});
		}
	}

	let scales = &cfg.chunking.scales;

	if scales.section.max_tokens > scales.document.max_tokens
		|| scales.paragraph.max_tokens > scales.section.max_tokens
		|| scales.sentence.max_tokens > scales.paragraph.max_tokens
	{
		return Err(Error::Validation {
			message: "chunking.scales max_tokens must not increase from document to sentence."
				.to_string(),
		});
	}

	if cfg.embedding.views.is_empty() {
		return Err(Error::Validation {
			message: "embedding.views must be non-empty.".to_string(),
		});
	}

	for view in &cfg.embedding.views {
		if !KNOWN_VIEWS.contains(&view.as_str()) {
			return Err(Error::Validation {
				message: format!(
					"embedding.views entries must be one of content, contextual, hierarchical, or semantic. Got {view}."
				),
			});
		}
	}

	if cfg.embedding.batch_size == 0 {
		return Err(Error::Validation {
			message: "embedding.batch_size must be greater than zero.".to_string(),
		});
	}
	if cfg.embedding.max_attempts == 0 {
		return Err(Error::Validation {
			message: "embedding.max_attempts must be greater than zero.".to_string(),
		});
	}
	if cfg.embedding.batch_timeout_ms == 0 {
		return Err(Error::Validation {
			message: "embedding.batch_timeout_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.embedding.cache_capacity == 0 {
		return Err(Error::Validation {
			message: "embedding.cache_capacity must be greater than zero.".to_string(),
		});
	}
	if !cfg.embedding.domain_boost.is_finite() || cfg.embedding.domain_boost <= 0.0 {
		return Err(Error::Validation {
			message: "embedding.domain_boost must be a positive finite number.".to_string(),
		});
	}
	if !(0.0..=1.0).contains(&cfg.embedding.validation_floor) {
		return Err(Error::Validation {
			message: "embedding.validation_floor must be in the range 0.0-1.0.".to_string(),
		});
	}
	if cfg.embedding.provider.dimensions == 0 {
		return Err(Error::Validation {
			message: "embedding.provider.dimensions must be greater than zero.".to_string(),
		});
	}
	if cfg.embedding.provider.api_key.trim().is_empty() {
		return Err(Error::Validation {
			message: "embedding.provider.api_key must be non-empty.".to_string(),
		});
	}

	if cfg.retrieval.top_n == 0 {
		return Err(Error::Validation {
			message: "retrieval.top_n must be greater than zero.".to_string(),
		});
	}
	if !(0.0..=1.0).contains(&cfg.retrieval.quality_floor) {
		return Err(Error::Validation {
			message: "retrieval.quality_floor must be in the range 0.0-1.0.".to_string(),
		});
	}
	if !cfg.retrieval.diversity.mmr_lambda.is_finite()
		|| !(0.0..=1.0).contains(&cfg.retrieval.diversity.mmr_lambda)
	{
		return Err(Error::Validation {
			message: "retrieval.diversity.mmr_lambda must be in the range 0.0-1.0.".to_string(),
		});
	}
	if !(0.0..=1.0).contains(&cfg.retrieval.diversity.duplication_ceiling) {
		return Err(Error::Validation {
			message: "retrieval.diversity.duplication_ceiling must be in the range 0.0-1.0."
				.to_string(),
		});
	}
	if cfg.retrieval.diversity.final_k == 0 {
		return Err(Error::Validation {
			message: "retrieval.diversity.final_k must be greater than zero.".to_string(),
		});
	}
	if cfg.retrieval.multi_hop.max_hops == 0 {
		return Err(Error::Validation {
			message: "retrieval.multi_hop.max_hops must be greater than zero.".to_string(),
		});
	}
	if !(0.0..=1.0).contains(&cfg.retrieval.multi_hop.confidence_floor) {
		return Err(Error::Validation {
			message: "retrieval.multi_hop.confidence_floor must be in the range 0.0-1.0."
				.to_string(),
		});
	}

	if let Some(qdrant) = cfg.storage.qdrant.as_ref() {
		if qdrant.url.trim().is_empty() {
			return Err(Error::Validation {
				message: "storage.qdrant.url must be non-empty.".to_string(),
			});
		}
		if qdrant.collection.trim().is_empty() {
			return Err(Error::Validation {
				message: "storage.qdrant.collection must be non-empty.".to_string(),
			});
		}
		if qdrant.vector_dim != cfg.embedding.provider.dimensions {
			return Err(Error::Validation {
				message: "storage.qdrant.vector_dim must match embedding.provider.dimensions."
					.to_string(),
			});
		}
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	if cfg.chunking.tokenizer_repo.as_deref().map(|repo| repo.trim().is_empty()).unwrap_or(false) {
		cfg.chunking.tokenizer_repo = None;
	}

	let mut views = Vec::with_capacity(cfg.embedding.views.len());

	for view in &cfg.embedding.views {
		let view = view.trim().to_ascii_lowercase();

		if !view.is_empty() && !views.contains(&view) {
			views.push(view);
		}
	}

	cfg.embedding.views = views;
}
