use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Granularity level of a chunk, coarse to fine.
#[derive(
	Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
#[serde(rename_all = "snake_case")]
pub enum ChunkScale {
	Document,
	Section,
	Paragraph,
	Sentence,
}
impl ChunkScale {
	pub const ALL: [Self; 4] = [Self::Document, Self::Section, Self::Paragraph, Self::Sentence];

	pub fn finer(self) -> Option<Self> {
		match self {
			Self::Document => Some(Self::Section),
			Self::Section => Some(Self::Paragraph),
			Self::Paragraph => Some(Self::Sentence),
			Self::Sentence => None,
		}
	}

	pub fn coarser(self) -> Option<Self> {
		match self {
			Self::Document => None,
			Self::Section => Some(Self::Document),
			Self::Paragraph => Some(Self::Section),
			Self::Sentence => Some(Self::Paragraph),
		}
	}

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Document => "document",
			Self::Section => "section",
			Self::Paragraph => "paragraph",
			Self::Sentence => "sentence",
		}
	}

	pub fn parse(value: &str) -> Option<Self> {
		match value.trim().to_ascii_lowercase().as_str() {
			"document" => Some(Self::Document),
			"section" => Some(Self::Section),
			"paragraph" => Some(Self::Paragraph),
			"sentence" => Some(Self::Sentence),
			_ => None,
		}
	}
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChunkFlag {
	/// A single indivisible unit exceeded the scale's token budget and was
	/// kept whole instead of truncated.
	Oversized,
	QualityBelowFloor,
}

/// The core unit. Immutable after construction except quality-score
/// refinement during validation; removed only by re-ingesting its document.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Chunk {
	pub id: Uuid,
	pub document_id: Uuid,
	pub document_version: u32,
	pub scale: ChunkScale,
	pub content: String,
	pub token_count: u32,
	/// Position within this chunk's scale, monotonic across the document.
	pub sequence_order: u32,
	pub parent_id: Option<Uuid>,
	pub child_ids: Vec<Uuid>,
	pub sibling_ids: Vec<Uuid>,
	pub quality_score: f32,
	pub coherence_score: f32,
	/// Ancestor chain, root first, ending with this chunk's own id.
	pub hierarchy_path: Vec<Uuid>,
	pub flags: Vec<ChunkFlag>,
	/// Core span in the source document; leading overlap is excluded.
	pub start_offset: usize,
	pub end_offset: usize,
}

impl Chunk {
	/// Deterministic identity: unchanged content chunked the same way yields
	/// the same id run over run, which keeps re-ingestion idempotent and
	/// embedding cache keys stable.
	pub fn deterministic_id(
		document_id: Uuid,
		version: u32,
		scale: ChunkScale,
		sequence: u32,
	) -> Uuid {
		let name = format!("{document_id}:{version}:{}:{sequence}", scale.as_str());

		Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
	}

	pub fn is_flagged(&self, flag: ChunkFlag) -> bool {
		self.flags.contains(&flag)
	}

	pub fn add_flag(&mut self, flag: ChunkFlag) {
		if !self.flags.contains(&flag) {
			self.flags.push(flag);
		}
	}
}
