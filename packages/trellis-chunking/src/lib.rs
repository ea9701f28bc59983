pub mod boundary;
pub mod chunker;
pub mod complexity;
pub mod refs;
pub mod token;

mod error;

pub use boundary::{BoundaryCandidate, BoundaryDetector, BoundarySource, segment_sentences};
pub use chunker::Chunker;
pub use error::Error;
pub use token::TokenCounter;

pub type Result<T, E = Error> = std::result::Result<T, E>;
