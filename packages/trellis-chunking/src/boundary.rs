use unicode_segmentation::UnicodeSegmentation;

use trellis_domain::{similarity, terms};

/// Sentence segments of `text` as `(byte_offset, sentence)` pairs, skipping
/// segments with no alphanumeric content.
pub fn segment_sentences(text: &str) -> Vec<(usize, &str)> {
	text.split_sentence_bound_indices()
		.filter(|(_, sentence)| sentence.chars().any(char::is_alphanumeric))
		.collect()
}

/// Where adjacent-sentence similarity comes from.
pub enum BoundarySource<'a> {
	/// Term-set overlap between adjacent sentences. Used when no sentence
	/// embeddings are available.
	Lexical,
	/// Precomputed sentence embeddings, parallel to the sentence list.
	Semantic(&'a [Vec<f32>]),
}

#[derive(Clone, Copy, Debug)]
pub struct BoundaryCandidate {
	/// Index of the sentence the boundary precedes.
	pub position: usize,
	pub similarity_drop: f32,
	pub confidence: f32,
}

/// Scores candidate split points in a sentence stream.
///
/// A position qualifies as a boundary when the similarity drop between the
/// two sentences around it exceeds the threshold; the caller still decides
/// which qualifying position to split at under its token constraints.
pub struct BoundaryDetector<'a> {
	threshold: f32,
	source: BoundarySource<'a>,
}
impl<'a> BoundaryDetector<'a> {
	pub fn new(threshold: f32, source: BoundarySource<'a>) -> Self {
		Self { threshold, source }
	}

	/// `1 − similarity` between sentences `position − 1` and `position`.
	///
	/// Falls back to lexical overlap for a pair whose embeddings carry no
	/// signal (missing or zero-norm).
	pub fn similarity_drop(&self, sentences: &[(usize, &str)], position: usize) -> f32 {
		if position == 0 || position >= sentences.len() {
			return 0.;
		}

		let semantic = if let BoundarySource::Semantic(vectors) = self.source {
			vectors
				.get(position - 1)
				.zip(vectors.get(position))
				.and_then(|(a, b)| similarity::cosine_similarity(a, b))
		} else {
			None
		};
		let similarity = semantic.unwrap_or_else(|| {
			terms::jaccard(
				&terms::term_set(sentences[position - 1].1),
				&terms::term_set(sentences[position].1),
			)
		});

		1. - similarity
	}

	pub fn is_boundary(&self, drop: f32) -> bool {
		drop > self.threshold
	}

	/// How far an accepted drop clears the threshold, normalized to `[0, 1]`.
	pub fn confidence(&self, drop: f32) -> f32 {
		if self.threshold >= 1. {
			return 0.;
		}

		((drop - self.threshold) / (1. - self.threshold)).clamp(0., 1.)
	}

	/// Accepted boundaries strictly inside the sentence range `[lo, hi)`.
	pub fn candidates(
		&self,
		sentences: &[(usize, &str)],
		lo: usize,
		hi: usize,
	) -> Vec<BoundaryCandidate> {
		(lo + 1..hi.min(sentences.len()))
			.filter_map(|position| {
				let drop = self.similarity_drop(sentences, position);

				if !self.is_boundary(drop) {
					return None;
				}

				Some(BoundaryCandidate {
					position,
					similarity_drop: drop,
					confidence: self.confidence(drop),
				})
			})
			.collect()
	}
}
