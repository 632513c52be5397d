pub type ServiceResult<T> = Result<T, Error>;

#[derive(Debug)]
pub enum Error {
	InvalidRequest { message: String },
	Retrieval { message: String },
	Generation { message: String },
	Storage { message: String },
	Index { message: String },
	BatchIndexing { indexed: u64, message: String },
}

impl std::fmt::Display for Error {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::InvalidRequest { message } => write!(f, "Invalid request: {message}"),
			Self::Retrieval { message } => write!(f, "Retrieval error: {message}"),
			Self::Generation { message } => write!(f, "Generation error: {message}"),
			Self::Storage { message } => write!(f, "Storage error: {message}"),
			Self::Index { message } => write!(f, "Index error: {message}"),
			Self::BatchIndexing { indexed, message } => {
				write!(f, "Batch indexing failed after {indexed} documents: {message}")
			},
		}
	}
}

impl std::error::Error for Error {}

impl From<recall_storage::Error> for Error {
	fn from(err: recall_storage::Error) -> Self {
		match err {
			recall_storage::Error::Qdrant(_) => Self::Index { message: err.to_string() },
			other => Self::Storage { message: other.to_string() },
		}
	}
}
