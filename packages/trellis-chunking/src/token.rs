use tokenizers::Tokenizer;

use crate::error::Error;

/// Counts tokens for budget decisions and cuts overlap tails.
///
/// The heuristic mode approximates four characters per token, which keeps
/// chunking deterministic and offline; a pretrained tokenizer is loaded only
/// when the config names a repository.
pub enum TokenCounter {
	Heuristic,
	Pretrained(Box<Tokenizer>),
}
impl TokenCounter {
	pub fn from_config(cfg: &trellis_config::Chunking) -> Result<Self, Error> {
		let Some(repo) = cfg.tokenizer_repo.as_deref() else {
			return Ok(Self::Heuristic);
		};
		let tokenizer = Tokenizer::from_pretrained(repo, None).map_err(|err| Error::Tokenizer {
			repo: repo.to_string(),
			message: err.to_string(),
		})?;

		Ok(Self::Pretrained(Box::new(tokenizer)))
	}

	pub fn count(&self, text: &str) -> u32 {
		match self {
			Self::Heuristic => heuristic_count(text),
			Self::Pretrained(tokenizer) => match tokenizer.encode(text, false) {
				Ok(encoding) => encoding.len() as u32,
				Err(err) => {
					tracing::error!(error = %err, "Tokenizer failed to encode text.");

					heuristic_count(text)
				},
			},
		}
	}

	/// Leading text worth roughly `tokens`, used to budget context windows.
	pub fn head(&self, text: &str, tokens: u32) -> String {
		if tokens == 0 || text.is_empty() {
			return String::new();
		}

		match self {
			Self::Heuristic => {
				let take = (tokens as usize).saturating_mul(4);

				match text.char_indices().nth(take) {
					Some((end, _)) => text[..end].to_string(),
					None => text.to_string(),
				}
			},
			Self::Pretrained(tokenizer) => {
				let encoding = match tokenizer.encode(text, false) {
					Ok(encoding) => encoding,
					Err(err) => {
						tracing::error!(error = %err, "Tokenizer failed to encode context head.");

						return String::new();
					},
				};
				let tokens_ids = encoding.get_ids();
				let end = (tokens as usize).min(tokens_ids.len());

				match tokenizer.decode(&tokens_ids[..end], true) {
					Ok(decoded) => decoded,
					Err(err) => {
						tracing::error!(error = %err, "Tokenizer failed to decode context head.");

						String::new()
					},
				}
			},
		}
	}

	/// Trailing text worth roughly `overlap_tokens`, duplicated into the next
	/// sibling chunk.
	pub fn tail(&self, text: &str, overlap_tokens: u32) -> String {
		if overlap_tokens == 0 || text.is_empty() {
			return String::new();
		}

		match self {
			Self::Heuristic => {
				let take = (overlap_tokens as usize).saturating_mul(4);
				let start = text
					.char_indices()
					.rev()
					.nth(take.saturating_sub(1))
					.map(|(i, _)| i)
					.unwrap_or(0);

				text[start..].to_string()
			},
			Self::Pretrained(tokenizer) => {
				let encoding = match tokenizer.encode(text, false) {
					Ok(encoding) => encoding,
					Err(err) => {
						tracing::error!(error = %err, "Tokenizer failed to encode overlap tail.");

						return String::new();
					},
				};
				let tokens = encoding.get_ids();
				let start = tokens.len().saturating_sub(overlap_tokens as usize);

				match tokenizer.decode(&tokens[start..], true) {
					Ok(decoded) => decoded,
					Err(err) => {
						tracing::error!(error = %err, "Tokenizer failed to decode overlap tail.");

						String::new()
					},
				}
			},
		}
	}
}

fn heuristic_count(text: &str) -> u32 {
	text.chars().count().div_ceil(4) as u32
}
