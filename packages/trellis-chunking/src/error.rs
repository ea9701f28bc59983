use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Document {id} yields no valid sentences.")]
	EmptyDocument { id: Uuid },
	#[error("Failed to load tokenizer {repo:?}: {message}")]
	Tokenizer { repo: String, message: String },
	#[error(transparent)]
	Forest(#[from] trellis_domain::Error),
}
