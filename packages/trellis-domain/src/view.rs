use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ViewKind {
	/// Raw chunk text, no transformation.
	Content,
	/// Chunk text widened with distance-weighted sibling and parent text.
	Contextual,
	/// Chunk text prefixed with its hierarchy-path titles.
	Hierarchical,
	/// Chunk text enriched with extracted keywords.
	Semantic,
}
impl ViewKind {
	pub const ALL: [Self; 4] = [Self::Content, Self::Contextual, Self::Hierarchical, Self::Semantic];

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Content => "content",
			Self::Contextual => "contextual",
			Self::Hierarchical => "hierarchical",
			Self::Semantic => "semantic",
		}
	}

	pub fn parse(value: &str) -> Option<Self> {
		match value.trim().to_ascii_lowercase().as_str() {
			"content" => Some(Self::Content),
			"contextual" => Some(Self::Contextual),
			"hierarchical" => Some(Self::Hierarchical),
			"semantic" => Some(Self::Semantic),
			_ => None,
		}
	}
}

/// One embedding representation of a chunk. Written once, regenerated
/// wholesale on re-ingestion. A chunk with zero valid views is excluded from
/// retrieval.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct EmbeddingView {
	pub chunk_id: Uuid,
	pub kind: ViewKind,
	pub vector: Vec<f32>,
	pub quality_score: f32,
	pub generated_at: OffsetDateTime,
}
