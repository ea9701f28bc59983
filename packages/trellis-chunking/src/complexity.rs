use trellis_config::ScaleLimits;
use trellis_domain::terms;

/// Tokens per sentence at which the length component of the complexity score
/// saturates.
const SENTENCE_TOKEN_SATURATION: f32 = 40.;

/// Sizing factor in `[0.5, 1.5]` for a segment about to be split.
///
/// Vocabulary diversity and average sentence length both push the factor
/// down, so dense technical text yields smaller chunks and plain prose yields
/// larger ones.
pub fn sizing_factor(segment_text: &str, token_counts: &[u32]) -> f32 {
	if token_counts.is_empty() {
		return 1.;
	}

	let diversity = terms::vocabulary_diversity(segment_text);
	let total = token_counts.iter().sum::<u32>() as f32;
	let avg_sentence_tokens = total / token_counts.len() as f32;
	let length_norm = (avg_sentence_tokens / SENTENCE_TOKEN_SATURATION).clamp(0., 1.);
	let complexity = 0.5 * diversity + 0.5 * length_norm;

	(1.5 - complexity).clamp(0.5, 1.5)
}

/// `(min, max)` token bounds for one scale after adaptive scaling.
pub fn scaled_bounds(limits: ScaleLimits, factor: f32) -> (u32, u32) {
	let max = ((limits.max_tokens as f32 * factor).round() as u32).max(1);
	let min = ((limits.min_tokens as f32 * factor).round() as u32).min(max);

	(min, max)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn factor_stays_within_range() {
		assert_eq!(sizing_factor("", &[]), 1.);

		let dense = sizing_factor(
			"Heterogeneous quorum reconfiguration invalidates stale lease epochs atomically.",
			&[60],
		);
		let plain = sizing_factor("it was nice. it was nice. it was nice.", &[3, 3, 3]);

		assert!((0.5..=1.5).contains(&dense));
		assert!((0.5..=1.5).contains(&plain));
		assert!(dense < plain);
	}

	#[test]
	fn bounds_scale_with_the_factor() {
		let limits = ScaleLimits { max_tokens: 500, min_tokens: 100, overlap_tokens: 50 };

		assert_eq!(scaled_bounds(limits, 1.), (100, 500));
		assert_eq!(scaled_bounds(limits, 0.5), (50, 250));
		assert_eq!(scaled_bounds(limits, 1.5), (150, 750));
	}
}
