use uuid::Uuid;

use trellis_chunking::{BoundarySource, Chunker, Error, TokenCounter};
use trellis_config::{Chunking, Config};
use trellis_domain::{ChunkFlag, ChunkForest, ChunkScale};
use trellis_testkit::{document_from, two_section_document};

const FILLER_A: &str = "The migration planner keeps the ledger warm while the arena recycles \
	the slabs and the flusher retires the stale intents and the probes keep the counters honest \
	while the drains keep the buffers level and the clocks keep the epochs aligned while the \
	janitor keeps the indexes tight and the broker keeps the queues shallow while the sampler \
	keeps the gauges fresh and the warden keeps the quotas fair";
const FILLER_C: &str = "The recovery sweep walks the journal twice while the replayer rebuilds \
	the page tables and the verifier checks the torn writes and the allocator reseeds the \
	freelists while the mover restages the cold extents and the scrubber repairs the weak \
	sectors while the auditor recounts the live references and the packer reorders the dense \
	runs while the balancer levels the hot shards and the archiver seals the finished segments \
	and the notifier wakes the waiting clients while the limiter paces the eager writers and \
	the tracer stamps the settled batches";

fn default_chunking() -> Chunking {
	Config::default().chunking
}

fn chunk_fixture(config: &Chunking) -> ChunkForest {
	let counter = TokenCounter::Heuristic;
	let chunker = Chunker::new(config, &counter);

	chunker
		.chunk_document(&two_section_document(), BoundarySource::Lexical)
		.expect("Fixture document has content.")
}

#[test]
fn two_headed_document_splits_into_two_sections() {
	let config = default_chunking();
	let forest = chunk_fixture(&config);
	let sections = forest.at_scale(ChunkScale::Section);
	let paragraphs = forest.at_scale(ChunkScale::Paragraph);

	assert_eq!(sections.len(), 2);
	assert!(paragraphs.len() >= 5);

	let section_ids = sections.iter().map(|s| s.id).collect::<Vec<_>>();

	for paragraph in &paragraphs {
		let parent = paragraph.parent_id.expect("Paragraphs always land under a section.");

		assert!(section_ids.contains(&parent));
	}
}

#[test]
fn every_scale_links_toward_the_document_root() {
	let config = default_chunking();
	let forest = chunk_fixture(&config);
	let roots = forest.roots();

	assert_eq!(roots.len(), 1);
	assert_eq!(roots[0].scale, ChunkScale::Document);

	for chunk in forest.iter() {
		if chunk.scale == ChunkScale::Document {
			continue;
		}

		let parent = forest.parent_of(chunk.id).expect("Non-root chunks have parents.");

		assert_eq!(parent.scale.finer(), Some(chunk.scale));
		assert!(chunk.hierarchy_path.ends_with(&[chunk.id]));
		assert_eq!(chunk.hierarchy_path[0], roots[0].id);
	}
}

#[test]
fn scores_stay_in_unit_range() {
	let config = default_chunking();
	let forest = chunk_fixture(&config);

	for chunk in forest.iter() {
		assert!((0. ..=1.).contains(&chunk.quality_score), "quality of {}", chunk.id);
		assert!((0. ..=1.).contains(&chunk.coherence_score), "coherence of {}", chunk.id);
	}
}

#[test]
fn rechunking_reproduces_identical_ids() {
	let config = default_chunking();
	let mut first = chunk_fixture(&config).iter().map(|c| c.id).collect::<Vec<_>>();
	let mut second = chunk_fixture(&config).iter().map(|c| c.id).collect::<Vec<_>>();

	first.sort_unstable();
	second.sort_unstable();

	assert_eq!(first, second);
}

#[test]
fn paragraph_overlap_duplicates_the_previous_tail() {
	let config = default_chunking();
	let counter = TokenCounter::Heuristic;
	let document = two_section_document();
	let forest = Chunker::new(&config, &counter)
		.chunk_document(&document, BoundarySource::Lexical)
		.expect("Fixture document has content.");
	let mut paragraphs = forest.at_scale(ChunkScale::Paragraph);

	paragraphs.sort_by_key(|c| c.sequence_order);

	let previous = paragraphs[0];
	let current = paragraphs[1];
	let previous_core = &document.raw_text[previous.start_offset..previous.end_offset];
	let current_core = &document.raw_text[current.start_offset..current.end_offset];
	let tail = counter.tail(previous_core, config.scales.paragraph.overlap_tokens);

	assert!(!tail.is_empty());
	assert!(current.content.starts_with(&tail));
	assert!(current.content.ends_with(current_core));
	assert!(current.content.len() > current_core.len());
	// The first chunk at a scale has nothing to inherit.
	assert_eq!(previous.content, previous_core);
}

#[test]
fn structural_hints_split_sections_without_semantic_boundaries() {
	let mut config = default_chunking();

	config.semantic_boundaries = false;

	let forest = chunk_fixture(&config);

	assert_eq!(forest.at_scale(ChunkScale::Section).len(), 2);
}

#[test]
fn punctuation_only_document_is_rejected() {
	let config = default_chunking();
	let counter = TokenCounter::Heuristic;
	let document = document_from("!!! ??? ...");
	let result = Chunker::new(&config, &counter).chunk_document(&document, BoundarySource::Lexical);

	assert!(matches!(result, Err(Error::EmptyDocument { id }) if id == document.id));
}

#[test]
fn indivisible_sentence_is_kept_whole_and_flagged() {
	let config = default_chunking();
	let counter = TokenCounter::Heuristic;
	let document = document_from("word ".repeat(250));
	let forest = Chunker::new(&config, &counter)
		.chunk_document(&document, BoundarySource::Lexical)
		.expect("Repeated words still count as content.");
	let sentences = forest.at_scale(ChunkScale::Sentence);

	assert_eq!(sentences.len(), 1);
	assert!(sentences[0].is_flagged(ChunkFlag::Oversized));
	assert!(sentences[0].token_count > config.scales.sentence.max_tokens);
	assert_eq!(sentences[0].content, document.raw_text);
}

#[test]
fn undersized_fragment_folds_into_its_neighbor() {
	let config = default_chunking();
	let counter = TokenCounter::Heuristic;
	let document = document_from(format!("{FILLER_A}. No. {FILLER_C}."));
	let forest = Chunker::new(&config, &counter)
		.chunk_document(&document, BoundarySource::Lexical)
		.expect("Filler document has content.");
	let sentences = forest.at_scale(ChunkScale::Sentence);

	assert_eq!(sentences.len(), 2);

	for chunk in &sentences {
		assert!(chunk.token_count >= config.scales.sentence.min_tokens);
	}
}

#[test]
fn disabling_remerge_flags_the_fragment_instead() {
	let mut config = default_chunking();

	config.remerge_below_floor = false;

	let counter = TokenCounter::Heuristic;
	let document = document_from(format!("{FILLER_A}. No. {FILLER_C}."));
	let forest = Chunker::new(&config, &counter)
		.chunk_document(&document, BoundarySource::Lexical)
		.expect("Filler document has content.");
	let sentences = forest.at_scale(ChunkScale::Sentence);
	let flagged = sentences
		.iter()
		.filter(|c| c.is_flagged(ChunkFlag::QualityBelowFloor))
		.collect::<Vec<_>>();

	assert_eq!(sentences.len(), 3);
	assert_eq!(flagged.len(), 1);
	assert!(flagged[0].token_count <= 2);
}

#[test]
fn chunk_ids_change_with_the_document_version() {
	let config = default_chunking();
	let counter = TokenCounter::Heuristic;
	let chunker = Chunker::new(&config, &counter);
	let mut document = two_section_document();
	let first = chunker
		.chunk_document(&document, BoundarySource::Lexical)
		.expect("Fixture document has content.");

	document.version += 1;

	let second = chunker
		.chunk_document(&document, BoundarySource::Lexical)
		.expect("Fixture document has content.");
	let first_ids = first.iter().map(|c| c.id).collect::<Vec<Uuid>>();

	assert!(second.iter().all(|c| !first_ids.contains(&c.id)));
}
