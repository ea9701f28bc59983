/// Cosine similarity between two vectors.
///
/// Returns [`None`] for empty input, mismatched dimensions or a zero-norm
/// vector; callers treat that as "no signal" rather than zero similarity.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
	if a.is_empty() || a.len() != b.len() {
		return None;
	}

	let mut dot = 0_f32;
	let mut norm_a = 0_f32;
	let mut norm_b = 0_f32;

	for (x, y) in a.iter().zip(b.iter()) {
		dot += x * y;
		norm_a += x * x;
		norm_b += y * y;
	}

	if norm_a <= f32::EPSILON || norm_b <= f32::EPSILON {
		return None;
	}

	Some((dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1., 1.))
}

/// Element-wise mean of equal-length vectors. Returns [`None`] for empty
/// input or mismatched dimensions.
pub fn mean_pool(vectors: &[Vec<f32>]) -> Option<Vec<f32>> {
	let dim = vectors.first()?.len();
	let mut pooled = vec![0.; dim];

	for vector in vectors {
		if vector.len() != dim {
			return None;
		}
		for (slot, value) in pooled.iter_mut().zip(vector.iter()) {
			*slot += value;
		}
	}

	let count = vectors.len() as f32;

	for slot in &mut pooled {
		*slot /= count;
	}

	Some(pooled)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn cosine_of_parallel_vectors_is_one() {
		let similarity =
			cosine_similarity(&[1., 2., 3.], &[2., 4., 6.]).expect("Similarity must exist.");

		assert!((similarity - 1.).abs() < 1e-6);
	}

	#[test]
	fn cosine_rejects_degenerate_input() {
		assert_eq!(cosine_similarity(&[], &[]), None);
		assert_eq!(cosine_similarity(&[1., 0.], &[1.]), None);
		assert_eq!(cosine_similarity(&[0., 0.], &[1., 0.]), None);
	}

	#[test]
	fn mean_pool_averages_elementwise() {
		let pooled =
			mean_pool(&[vec![1., 3.], vec![3., 5.]]).expect("Pooling must succeed.");

		assert_eq!(pooled, [2., 4.]);
	}

	#[test]
	fn mean_pool_rejects_ragged_input() {
		assert_eq!(mean_pool(&[]), None);
		assert_eq!(mean_pool(&[vec![1.], vec![1., 2.]]), None);
	}
}
