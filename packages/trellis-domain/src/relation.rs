use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
	/// Adjacent same-scale chunks in reading order.
	Sequential,
	/// An explicit textual reference, e.g. "see section 3".
	CrossReference,
}

/// Non-owning cross-reference between two chunks. Biases expansion and
/// complementarity scoring only; never determines chunk lifecycle.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Relationship {
	pub source_chunk_id: Uuid,
	pub target_chunk_id: Uuid,
	pub kind: RelationKind,
	pub strength: f32,
}
