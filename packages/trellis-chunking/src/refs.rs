use ahash::{AHashMap, AHashSet};
use regex::Regex;
use uuid::Uuid;

use trellis_domain::{ChunkForest, ChunkScale, Document, RelationKind, Relationship, terms};

/// Minimum term overlap for a quoted mention to resolve against a section
/// heading.
const TITLE_OVERLAP_FLOOR: f32 = 0.5;

/// Per-chunk tally of reference mentions and how many of them resolved to a
/// chunk in the same document.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReferenceStats {
	pub mentions: u32,
	pub resolved: u32,
}
impl ReferenceStats {
	/// `1.0` for chunks without references; otherwise the resolved fraction.
	pub fn completeness(&self) -> f32 {
		if self.mentions == 0 {
			return 1.;
		}

		self.resolved as f32 / self.mentions as f32
	}
}

pub struct DetectedReferences {
	pub relationships: Vec<Relationship>,
	pub stats: AHashMap<Uuid, ReferenceStats>,
}

/// Scans paragraph and sentence chunks for textual cross-references and
/// resolves them against the forest.
///
/// Recognized forms: `section N` (section ordinals), `step N` (paragraphs
/// that open with a step marker), `figure N`/`table N` (caption lines), and
/// quoted heading titles after see/in/under. A marker that opens its own
/// chunk is a definition, not a mention.
pub fn detect(document: &Document, forest: &ChunkForest) -> DetectedReferences {
	let section_re = pattern(r"(?i)\bsection\s+(\d{1,3})\b");
	let step_re = pattern(r"(?i)\bstep\s+(\d{1,3})\b");
	let graphic_re = pattern(r"(?i)\b(figure|table)\s+(\d{1,3})\b");
	let title_re = pattern("(?i)\\b(?:see|in|under)\\s+[\"“]([^\"“”]{2,64})[\"”]");
	let graphic_def_re = pattern(r"(?im)^\s*(figure|table)\s+(\d{1,3})\b");

	let sections = forest.at_scale(ChunkScale::Section);
	let step_definitions = collect_step_definitions(forest, step_re.as_ref());
	let graphic_definitions = collect_graphic_definitions(forest, graphic_def_re.as_ref());
	let section_titles = sections
		.iter()
		.map(|section| {
			let title = document
				.heading_in_span(section.start_offset, section.end_offset)
				.map(terms::term_set)
				.unwrap_or_default();

			(section.id, title)
		})
		.collect::<Vec<_>>();

	let mut relationships = Vec::new();
	let mut seen = AHashSet::<(Uuid, Uuid, RelationKind)>::new();
	let mut stats = AHashMap::new();
	let mut push = |source: Uuid, target: Uuid, kind: RelationKind, strength: f32| {
		if source != target && seen.insert((source, target, kind)) {
			relationships.push(Relationship {
				source_chunk_id: source,
				target_chunk_id: target,
				kind,
				strength,
			});
		}
	};

	for chunk in forest
		.iter()
		.filter(|c| matches!(c.scale, ChunkScale::Paragraph | ChunkScale::Sentence))
	{
		let content = chunk.content.as_str();
		let lead = content.len() - content.trim_start().len();
		let mut tally = ReferenceStats::default();

		if let Some(re) = &section_re {
			for captures in re.captures_iter(content) {
				let Some(whole) = captures.get(0) else {
					continue;
				};

				// A marker opening the chunk is the heading itself.
				if whole.start() == lead {
					continue;
				}

				tally.mentions += 1;

				let ordinal = captures[1].parse::<usize>().unwrap_or(0);

				if let Some(target) = ordinal.checked_sub(1).and_then(|i| sections.get(i)) {
					tally.resolved += 1;

					push(chunk.id, target.id, RelationKind::CrossReference, 0.9);
				}
			}
		}
		if let Some(re) = &step_re {
			for captures in re.captures_iter(content) {
				let Some(whole) = captures.get(0) else {
					continue;
				};

				if whole.start() == lead {
					continue;
				}

				tally.mentions += 1;

				let number = captures[1].parse::<u32>().unwrap_or(0);

				if let Some(&target) = step_definitions.get(&number) {
					tally.resolved += 1;

					push(chunk.id, target, RelationKind::CrossReference, 1.);
				}
			}
		}
		if let Some(re) = &graphic_re {
			for captures in re.captures_iter(content) {
				let Some(whole) = captures.get(0) else {
					continue;
				};

				if whole.start() == lead {
					continue;
				}

				tally.mentions += 1;

				let kind = captures[1].to_lowercase();
				let number = captures[2].parse::<u32>().unwrap_or(0);

				if let Some(&target) = graphic_definitions.get(&(kind, number)) {
					tally.resolved += 1;

					push(chunk.id, target, RelationKind::CrossReference, 0.8);
				}
			}
		}
		if let Some(re) = &title_re {
			for captures in re.captures_iter(content) {
				tally.mentions += 1;

				let quoted = terms::term_set(&captures[1]);
				let best = section_titles
					.iter()
					.map(|(id, title)| (*id, terms::jaccard(&quoted, title)))
					.filter(|(_, overlap)| *overlap >= TITLE_OVERLAP_FLOOR)
					.max_by(|(_, a), (_, b)| a.total_cmp(b));

				if let Some((target, overlap)) = best {
					tally.resolved += 1;

					push(chunk.id, target, RelationKind::CrossReference, overlap);
				}
			}
		}

		stats.insert(chunk.id, tally);
	}

	// Consecutive step definitions read in order.
	let mut numbers = step_definitions.keys().copied().collect::<Vec<_>>();

	numbers.sort_unstable();

	for pair in numbers.windows(2) {
		if pair[1] == pair[0] + 1 {
			let (source, target) = (step_definitions[&pair[0]], step_definitions[&pair[1]]);

			push(source, target, RelationKind::Sequential, 1.);
		}
	}

	DetectedReferences { relationships, stats }
}

fn pattern(raw: &str) -> Option<Regex> {
	Regex::new(raw).ok()
}

/// Paragraphs that open with `step N`, keyed by step number. First definition
/// wins.
fn collect_step_definitions(forest: &ChunkForest, re: Option<&Regex>) -> AHashMap<u32, Uuid> {
	let mut definitions = AHashMap::new();
	let Some(re) = re else {
		return definitions;
	};

	for chunk in forest.at_scale(ChunkScale::Paragraph) {
		let content = chunk.content.trim_start();
		let Some(captures) = re.captures(content) else {
			continue;
		};
		let Some(whole) = captures.get(0) else {
			continue;
		};

		if whole.start() != 0 {
			continue;
		}

		let number = captures[1].parse::<u32>().unwrap_or(0);

		definitions.entry(number).or_insert(chunk.id);
	}

	definitions
}

/// Paragraphs containing a `figure N`/`table N` caption line, keyed by
/// `(kind, number)`.
fn collect_graphic_definitions(
	forest: &ChunkForest,
	re: Option<&Regex>,
) -> AHashMap<(String, u32), Uuid> {
	let mut definitions = AHashMap::new();
	let Some(re) = re else {
		return definitions;
	};

	for chunk in forest.at_scale(ChunkScale::Paragraph) {
		for captures in re.captures_iter(&chunk.content) {
			let kind = captures[1].to_lowercase();
			let number = captures[2].parse::<u32>().unwrap_or(0);

			definitions.entry((kind, number)).or_insert(chunk.id);
		}
	}

	definitions
}
