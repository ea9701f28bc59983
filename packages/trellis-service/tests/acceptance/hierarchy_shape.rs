use trellis_domain::{Chunk, ChunkScale};

use super::{build_service, test_config};

#[tokio::test]
async fn structured_document_yields_a_validated_multi_scale_forest() {
	let (service, _store) = build_service(test_config());
	let document = trellis_testkit::two_section_document();

	let result = service.process(&document).await.expect("Processing failed.");
	let forest = &result.forest;

	forest.validate().expect("Forest invariants must hold after processing.");
	assert_eq!(result.stats.chunks_generated as usize, forest.len());

	let roots = forest.roots();
	assert_eq!(roots.len(), 1);

	let root = roots[0];
	assert_eq!(root.scale, ChunkScale::Document);
	assert_eq!(root.start_offset, 0);
	assert!(root.end_offset >= document.raw_text.trim_end().len());

	// Both heading hints must become section boundaries.
	let mut sections = forest.children_of(root.id);
	sections.sort_by_key(|section| section.sequence_order);
	assert_eq!(sections.len(), 2);
	assert_eq!(sections[0].start_offset, document.structural_hints[0].offset);
	assert_eq!(sections[1].start_offset, document.structural_hints[1].offset);
	assert!(sections[0].content.contains("Kernel Scheduling"));
	assert!(sections[1].content.contains("Memory Reclaim"));
	assert_eq!(sections[0].sibling_ids, vec![sections[1].id]);

	for section in &sections {
		assert!(section.end_offset <= root.end_offset);

		let paragraphs = forest.children_of(section.id);
		assert!(!paragraphs.is_empty(), "Sections must split into paragraphs.");

		for paragraph in paragraphs {
			assert_eq!(paragraph.parent_id, Some(section.id));
			assert!(!forest.children_of(paragraph.id).is_empty());
		}
	}

	let sentences = forest.at_scale(ChunkScale::Sentence);
	assert!(!sentences.is_empty());
	assert_eq!(sentences[0].hierarchy_path.len(), 4);
	assert_eq!(sentences[0].hierarchy_path[0], root.id);
	assert_eq!(*sentences[0].hierarchy_path.last().unwrap(), sentences[0].id);

	let paragraphs = forest.at_scale(ChunkScale::Paragraph);
	assert!(paragraphs.len() >= 5);
	for pair in paragraphs.windows(2) {
		assert!(pair[0].sequence_order < pair[1].sequence_order);
	}

	for chunk in forest.iter() {
		let expected = Chunk::deterministic_id(
			chunk.document_id,
			chunk.document_version,
			chunk.scale,
			chunk.sequence_order,
		);

		assert_eq!(chunk.id, expected);
		assert!((0.0..=1.0).contains(&chunk.quality_score));
		assert!(chunk.quality_score > 0.);
	}
}
