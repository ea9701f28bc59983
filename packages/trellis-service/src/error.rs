pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Chunking failed: {message}")]
	Chunking { message: String },
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
	#[error("Qdrant error: {message}")]
	Qdrant { message: String },
}
impl From<trellis_chunking::Error> for Error {
	fn from(err: trellis_chunking::Error) -> Self {
		Self::Chunking { message: err.to_string() }
	}
}

impl From<trellis_providers::Error> for Error {
	fn from(err: trellis_providers::Error) -> Self {
		Self::Provider { message: err.to_string() }
	}
}

impl From<trellis_storage::Error> for Error {
	fn from(err: trellis_storage::Error) -> Self {
		match err {
			trellis_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			trellis_storage::Error::NotFound(message) => Self::Storage { message },
			trellis_storage::Error::Qdrant(inner) => Self::Qdrant { message: inner.to_string() },
		}
	}
}
