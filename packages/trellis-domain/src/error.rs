use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Chunk {id} is already present in the forest.")]
	DuplicateChunk { id: Uuid },
	#[error("Chunk {id} is not present in the forest.")]
	UnknownChunk { id: Uuid },
	#[error("Chunk {child} cannot be linked under {parent}: {message}")]
	InvalidLink { parent: Uuid, child: Uuid, message: String },
	#[error("Parent chain starting at chunk {id} contains a cycle.")]
	CycleDetected { id: Uuid },
	#[error("Chunk {id} violates a forest invariant: {message}")]
	BrokenInvariant { id: Uuid, message: String },
}
