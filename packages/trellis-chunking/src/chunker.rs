use ahash::AHashMap;
use uuid::Uuid;

use trellis_config::{Chunking as ChunkingConfig, ScaleLimits};
use trellis_domain::{Chunk, ChunkFlag, ChunkForest, ChunkScale, Document, HintKind, terms};

use crate::{
	Result,
	boundary::{BoundaryDetector, BoundarySource, segment_sentences},
	complexity,
	error::Error,
	refs,
	token::TokenCounter,
};

/// Multi-scale document chunker.
///
/// One call to [`chunk_document`](Self::chunk_document) turns a document into
/// a validated forest: document roots split into sections, sections into
/// paragraphs, paragraphs into sentence-scale leaves, every level shaped by
/// the boundary detector and the per-scale token budgets.
pub struct Chunker<'a> {
	config: &'a ChunkingConfig,
	counter: &'a TokenCounter,
}

/// One contiguous sentence run selected for a chunk, before overlap and
/// scoring.
#[derive(Clone, Copy)]
struct Segment {
	lo: usize,
	hi: usize,
	token_count: u32,
	boundary_confidence: f32,
	oversized: bool,
}

/// Construction-time record consumed by the scoring pass.
struct Placed {
	id: Uuid,
	scale: ChunkScale,
	lo: usize,
	hi: usize,
	boundary_confidence: f32,
	/// Chunk spans its entire source segment; length bounds do not apply.
	covers_source: bool,
}

impl<'a> Chunker<'a> {
	pub fn new(config: &'a ChunkingConfig, counter: &'a TokenCounter) -> Self {
		Self { config, counter }
	}

	pub fn chunk_document(
		&self,
		document: &Document,
		source: BoundarySource<'_>,
	) -> Result<ChunkForest> {
		let sentences = segment_sentences(&document.raw_text);

		if sentences.is_empty() {
			return Err(Error::EmptyDocument { id: document.id });
		}

		let counts = sentences.iter().map(|&(_, s)| self.counter.count(s)).collect::<Vec<_>>();
		let detector = BoundaryDetector::new(self.config.boundary_threshold, source);
		let heading_hints = hint_positions(document, &sentences, HintKind::Heading);
		let break_hints = hint_positions(document, &sentences, HintKind::PageBreak);
		let mut forest = ChunkForest::new();
		let mut placed = Vec::new();
		let mut sequences = [0_u32; 4];
		let mut parents: Vec<(Uuid, usize, usize)> = Vec::new();

		for scale in ChunkScale::ALL {
			let limits = self.limits_for(scale);
			let hints: &[usize] = match scale {
				ChunkScale::Document => &break_hints,
				ChunkScale::Section => &heading_hints,
				_ => &[],
			};
			let spans: Vec<(Option<Uuid>, usize, usize)> = if scale == ChunkScale::Document {
				vec![(None, 0, sentences.len())]
			} else {
				parents.iter().map(|&(id, lo, hi)| (Some(id), lo, hi)).collect()
			};
			let mut next = Vec::new();

			for (origin, lo, hi) in spans {
				let segments = self.split_segment(
					&document.raw_text,
					&sentences,
					&counts,
					&detector,
					hints,
					lo,
					hi,
					limits,
				);

				for segment in segments {
					let sequence = sequences[scale as usize];

					sequences[scale as usize] += 1;

					let id =
						Chunk::deterministic_id(document.id, document.version, scale, sequence);
					let (start, end) = span_bounds(&sentences, segment.lo, segment.hi);
					let mut chunk = Chunk {
						id,
						document_id: document.id,
						document_version: document.version,
						scale,
						content: document.raw_text[start..end].to_string(),
						token_count: segment.token_count,
						sequence_order: sequence,
						parent_id: None,
						child_ids: Vec::new(),
						sibling_ids: Vec::new(),
						quality_score: 0.,
						coherence_score: 0.,
						hierarchy_path: vec![id],
						flags: Vec::new(),
						start_offset: start,
						end_offset: end,
					};

					if segment.oversized {
						chunk.add_flag(ChunkFlag::Oversized);
					}

					forest.insert(chunk)?;

					if let Some(origin) = origin {
						let parent = self.select_parent(
							&forest,
							id,
							origin,
							scale,
							document.raw_text.len(),
						);

						forest.link(parent, id)?;
					}

					placed.push(Placed {
						id,
						scale,
						lo: segment.lo,
						hi: segment.hi,
						boundary_confidence: segment.boundary_confidence,
						covers_source: segment.lo == lo && segment.hi == hi,
					});
					next.push((id, segment.lo, segment.hi));
				}
			}

			parents = next;
		}

		let references = if self.config.preserve_cross_references {
			refs::detect(document, &forest)
		} else {
			refs::DetectedReferences { relationships: Vec::new(), stats: AHashMap::new() }
		};

		for relationship in references.relationships {
			forest.add_relationship(relationship);
		}

		self.score(&mut forest, &placed, &references.stats, &sentences, &detector);
		self.apply_overlap(&mut forest);
		forest.refresh_sibling_ids();
		forest.validate()?;

		Ok(forest)
	}

	/// Splits the sentence range `[lo, hi)` into budget-respecting segments.
	///
	/// Split positions are chosen in priority order: structural hints, then
	/// accepted similarity boundaries, then a forced split at the token
	/// limit. Among qualifying positions the one whose left side lands
	/// closest to the midpoint of the scaled bounds wins.
	#[allow(clippy::too_many_arguments)]
	fn split_segment(
		&self,
		text: &str,
		sentences: &[(usize, &str)],
		counts: &[u32],
		detector: &BoundaryDetector<'_>,
		hints: &[usize],
		lo: usize,
		hi: usize,
		limits: ScaleLimits,
	) -> Vec<Segment> {
		if lo >= hi {
			return Vec::new();
		}

		let factor = if self.config.adaptive_sizing {
			let (start, end) = span_bounds(sentences, lo, hi);

			complexity::sizing_factor(&text[start..end], &counts[lo..hi])
		} else {
			1.
		};
		let (effective_min, effective_max) = complexity::scaled_bounds(limits, factor);
		let target = (effective_min + effective_max) / 2;
		let mut segments = Vec::new();
		let mut start = lo;

		while start < hi {
			// An indivisible unit over budget is kept whole, never truncated.
			if counts[start] > effective_max {
				segments.push(Segment {
					lo: start,
					hi: start + 1,
					token_count: counts[start],
					boundary_confidence: 0.,
					oversized: true,
				});

				start += 1;

				continue;
			}

			let mut cum = counts[start];
			let mut fit = start + 1;

			while fit < hi && cum + counts[fit] <= effective_max {
				cum += counts[fit];
				fit += 1;
			}

			if fit >= hi {
				// Everything left fits; end of input closes the segment.
				segments.push(Segment {
					lo: start,
					hi,
					token_count: cum,
					boundary_confidence: 1.,
					oversized: false,
				});

				break;
			}

			let mut chosen: Option<(usize, f32)> = None;
			let mut best_distance = u32::MAX;
			let mut running = 0_u32;

			for position in start + 1..=fit {
				running += counts[position - 1];

				if running < effective_min || hints.binary_search(&position).is_err() {
					continue;
				}

				let distance = running.abs_diff(target);

				if distance < best_distance {
					best_distance = distance;
					chosen = Some((position, 1.));
				}
			}
			if chosen.is_none() {
				let mut running = 0_u32;

				for position in start + 1..=fit {
					running += counts[position - 1];

					if running < effective_min {
						continue;
					}

					let drop = detector.similarity_drop(sentences, position);

					if !detector.is_boundary(drop) {
						continue;
					}

					let distance = running.abs_diff(target);

					if distance < best_distance {
						best_distance = distance;
						chosen = Some((position, detector.confidence(drop)));
					}
				}
			}

			let (end, confidence) = chosen.unwrap_or((fit, 0.));
			let token_count = counts[start..end].iter().sum();

			segments.push(Segment {
				lo: start,
				hi: end,
				token_count,
				boundary_confidence: confidence,
				oversized: false,
			});

			start = end;
		}

		if self.config.remerge_below_floor {
			self.remerge(&mut segments, limits);
		}

		segments
	}

	/// Folds segments whose pre-reference quality estimate falls below the
	/// floor into the shorter of their fitting neighbors, as long as the
	/// combined size stays within the configured maximum.
	fn remerge(&self, segments: &mut Vec<Segment>, limits: ScaleLimits) {
		let mut index = 0;

		while index < segments.len() {
			let segment = segments[index];

			if segment.oversized
				|| self.provisional_quality(segment, limits) >= self.config.quality_floor
			{
				index += 1;

				continue;
			}

			let prev_fits = index > 0
				&& !segments[index - 1].oversized
				&& segments[index - 1].token_count + segment.token_count <= limits.max_tokens;
			let next_fits = index + 1 < segments.len()
				&& !segments[index + 1].oversized
				&& segment.token_count + segments[index + 1].token_count <= limits.max_tokens;
			let into_prev = prev_fits
				&& (!next_fits
					|| segments[index - 1].token_count <= segments[index + 1].token_count);

			if into_prev {
				segments[index - 1].hi = segment.hi;
				segments[index - 1].token_count += segment.token_count;
				segments[index - 1].boundary_confidence = segment.boundary_confidence;
				segments.remove(index);

				index = index.saturating_sub(1);

				continue;
			}

			if next_fits {
				let following = segments.remove(index + 1);

				segments[index].hi = following.hi;
				segments[index].token_count += following.token_count;
				segments[index].boundary_confidence = following.boundary_confidence;

				continue;
			}

			index += 1;
		}
	}

	/// Quality of a segment before reference resolution exists, with the
	/// reference component assumed complete.
	fn provisional_quality(&self, segment: Segment, limits: ScaleLimits) -> f32 {
		0.4 * length_score(segment.token_count, limits, false)
			+ 0.3 * segment.boundary_confidence
			+ 0.3
	}

	/// Picks the parent among all chunks at the scale above by scoring span
	/// containment, hierarchy-path agreement with the split origin,
	/// positional proximity and term overlap.
	fn select_parent(
		&self,
		forest: &ChunkForest,
		child_id: Uuid,
		origin: Uuid,
		scale: ChunkScale,
		document_len: usize,
	) -> Uuid {
		let Some(coarser) = scale.coarser() else {
			return origin;
		};
		let Some(child) = forest.get(child_id) else {
			return origin;
		};
		let origin_path =
			forest.get(origin).map(|c| c.hierarchy_path.as_slice()).unwrap_or_default();
		let child_terms = terms::term_set(&child.content);
		let mut best: Option<(f32, Uuid)> = None;

		for candidate in forest.at_scale(coarser) {
			let containment = span_containment(
				child.start_offset,
				child.end_offset,
				candidate.start_offset,
				candidate.end_offset,
			);
			let path = path_similarity(origin_path, &candidate.hierarchy_path);
			let proximity = position_proximity(child, candidate, document_len);
			let content = terms::jaccard(&child_terms, &terms::term_set(&candidate.content));
			let score = 0.4 * containment + 0.3 * path + 0.2 * proximity + 0.1 * content;
			let better = match best {
				None => true,
				Some((best_score, _)) => score > best_score,
			};

			if better {
				best = Some((score, candidate.id));
			}
		}

		best.map(|(_, id)| id).unwrap_or(origin)
	}

	fn score(
		&self,
		forest: &mut ChunkForest,
		placed: &[Placed],
		stats: &AHashMap<Uuid, refs::ReferenceStats>,
		sentences: &[(usize, &str)],
		detector: &BoundaryDetector<'_>,
	) {
		for record in placed {
			let limits = self.limits_for(record.scale);
			let refs_score = stats.get(&record.id).map(|s| s.completeness()).unwrap_or(1.);
			let coherence = coherence_score(sentences, detector, record.lo, record.hi);
			let Some(chunk) = forest.get_mut(record.id) else {
				continue;
			};
			let length = length_score(chunk.token_count, limits, record.covers_source);
			let quality = (0.4 * length
				+ 0.3 * record.boundary_confidence
				+ 0.3 * refs_score)
				.clamp(0., 1.);

			chunk.quality_score = quality;
			chunk.coherence_score = coherence;

			if quality < self.config.quality_floor {
				chunk.add_flag(ChunkFlag::QualityBelowFloor);
			}
		}
	}

	/// Duplicates each chunk's trailing tokens into the next chunk at the
	/// same scale. Content grows; the recorded span keeps pointing at the
	/// core text.
	fn apply_overlap(&self, forest: &mut ChunkForest) {
		for scale in ChunkScale::ALL {
			let limits = self.limits_for(scale);

			if limits.overlap_tokens == 0 {
				continue;
			}

			let mut ordered = forest.at_scale(scale).iter().map(|c| c.id).collect::<Vec<_>>();

			ordered.sort_by_key(|id| {
				forest.get(*id).map(|c| c.sequence_order).unwrap_or(u32::MAX)
			});

			for pair in ordered.windows(2) {
				let tail = {
					let Some(previous) = forest.get(pair[0]) else {
						continue;
					};

					self.counter.tail(&previous.content, limits.overlap_tokens)
				};

				if tail.is_empty() {
					continue;
				}

				let Some(chunk) = forest.get_mut(pair[1]) else {
					continue;
				};
				let mut content = tail;

				if !content.ends_with(char::is_whitespace) {
					content.push(' ');
				}

				content.push_str(&chunk.content);

				chunk.content = content;
				chunk.token_count = self.counter.count(&chunk.content);
			}
		}
	}

	fn limits_for(&self, scale: ChunkScale) -> ScaleLimits {
		match scale {
			ChunkScale::Document => self.config.scales.document,
			ChunkScale::Section => self.config.scales.section,
			ChunkScale::Paragraph => self.config.scales.paragraph,
			ChunkScale::Sentence => self.config.scales.sentence,
		}
	}
}

/// Byte span covering sentences `[lo, hi)`. Callers guarantee a non-empty
/// range.
fn span_bounds(sentences: &[(usize, &str)], lo: usize, hi: usize) -> (usize, usize) {
	let start = sentences[lo].0;
	let (last_offset, last) = sentences[hi - 1];

	(start, last_offset + last.len())
}

/// Sentence positions where hints of `kind` request a boundary.
fn hint_positions(document: &Document, sentences: &[(usize, &str)], kind: HintKind) -> Vec<usize> {
	let mut positions = document
		.structural_hints
		.iter()
		.filter(|hint| hint.kind == kind)
		.map(|hint| sentences.partition_point(|&(offset, _)| offset < hint.offset))
		.filter(|&position| position > 0 && position < sentences.len())
		.collect::<Vec<_>>();

	positions.sort_unstable();
	positions.dedup();

	positions
}

fn length_score(token_count: u32, limits: ScaleLimits, covers_source: bool) -> f32 {
	if covers_source {
		return 1.;
	}
	if token_count == 0 {
		return 0.;
	}
	if token_count < limits.min_tokens {
		return token_count as f32 / limits.min_tokens as f32;
	}
	if token_count > limits.max_tokens {
		return limits.max_tokens as f32 / token_count as f32;
	}

	1.
}

fn span_containment(
	child_start: usize,
	child_end: usize,
	parent_start: usize,
	parent_end: usize,
) -> f32 {
	let length = child_end.saturating_sub(child_start);

	if length == 0 {
		return 0.;
	}

	let overlap = child_end.min(parent_end).saturating_sub(child_start.max(parent_start));

	overlap as f32 / length as f32
}

/// Shared-prefix fraction of two root-first hierarchy paths.
fn path_similarity(a: &[Uuid], b: &[Uuid]) -> f32 {
	let longest = a.len().max(b.len());

	if longest == 0 {
		return 0.;
	}

	let shared = a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count();

	shared as f32 / longest as f32
}

fn position_proximity(child: &Chunk, candidate: &Chunk, document_len: usize) -> f32 {
	if document_len == 0 {
		return 0.;
	}

	let child_mid = (child.start_offset + child.end_offset) / 2;
	let candidate_mid = (candidate.start_offset + candidate.end_offset) / 2;

	1. - (child_mid.abs_diff(candidate_mid) as f32 / document_len as f32)
}

/// `1 − 2·stddev` of adjacent-sentence similarities inside the chunk. A
/// chunk too short for two similarity samples is fully coherent.
fn coherence_score(
	sentences: &[(usize, &str)],
	detector: &BoundaryDetector<'_>,
	lo: usize,
	hi: usize,
) -> f32 {
	let similarities =
		(lo + 1..hi).map(|p| 1. - detector.similarity_drop(sentences, p)).collect::<Vec<_>>();

	if similarities.len() < 2 {
		return 1.;
	}

	let mean = similarities.iter().sum::<f32>() / similarities.len() as f32;
	let variance =
		similarities.iter().map(|s| (s - mean).powi(2)).sum::<f32>() / similarities.len() as f32;

	(1. - 2. * variance.sqrt()).clamp(0., 1.)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn limits(min: u32, max: u32) -> ScaleLimits {
		ScaleLimits { max_tokens: max, min_tokens: min, overlap_tokens: 0 }
	}

	#[test]
	fn length_score_decays_outside_bounds() {
		assert_eq!(length_score(50, limits(100, 500), false), 0.5);
		assert_eq!(length_score(300, limits(100, 500), false), 1.);
		assert_eq!(length_score(1_000, limits(100, 500), false), 0.5);
		assert_eq!(length_score(50, limits(100, 500), true), 1.);
		assert_eq!(length_score(0, limits(100, 500), false), 0.);
	}

	#[test]
	fn path_similarity_counts_the_shared_prefix() {
		let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

		assert_eq!(path_similarity(&[a, b], &[a, b]), 1.);
		assert_eq!(path_similarity(&[a, b], &[a, c]), 0.5);
		assert_eq!(path_similarity(&[a], &[b, c]), 0.);
		assert_eq!(path_similarity(&[], &[]), 0.);
	}

	#[test]
	fn containment_measures_the_child_side() {
		assert_eq!(span_containment(10, 20, 0, 100), 1.);
		assert_eq!(span_containment(90, 110, 0, 100), 0.5);
		assert_eq!(span_containment(200, 300, 0, 100), 0.);
		assert_eq!(span_containment(5, 5, 0, 100), 0.);
	}
}
