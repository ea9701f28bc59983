use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Immutable ingestion input. Created by an external loader, consumed once by
/// the chunker, never mutated.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Document {
	pub id: Uuid,
	pub version: u32,
	pub raw_text: String,
	pub structural_hints: Vec<StructuralHint>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct StructuralHint {
	/// Byte offset into `raw_text`.
	pub offset: usize,
	pub kind: HintKind,
	pub title: Option<String>,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HintKind {
	Heading,
	PageBreak,
}

impl Document {
	pub fn new(id: Uuid, version: u32, raw_text: impl Into<String>) -> Self {
		Self { id, version, raw_text: raw_text.into(), structural_hints: Vec::new() }
	}

	pub fn with_hints(mut self, hints: Vec<StructuralHint>) -> Self {
		self.structural_hints = hints;

		self
	}

	/// First heading hint whose offset falls inside `[start, end)`.
	pub fn heading_in_span(&self, start: usize, end: usize) -> Option<&str> {
		self.structural_hints
			.iter()
			.filter(|hint| {
				hint.kind == HintKind::Heading && hint.offset >= start && hint.offset < end
			})
			.find_map(|hint| hint.title.as_deref())
	}
}
