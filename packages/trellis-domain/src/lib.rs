pub mod chunk;
pub mod document;
pub mod forest;
pub mod relation;
pub mod similarity;
pub mod terms;
pub mod view;

mod error;

pub use chunk::{Chunk, ChunkFlag, ChunkScale};
pub use document::{Document, HintKind, StructuralHint};
pub use error::Error;
pub use forest::ChunkForest;
pub use relation::{RelationKind, Relationship};
pub use view::{EmbeddingView, ViewKind};

pub type Result<T, E = Error> = std::result::Result<T, E>;
