pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Unauthorized: {message}")]
	Unauthorized { message: String },
	#[error("Forbidden: {message}")]
	Forbidden { message: String },
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Not found: {message}")]
	NotFound { message: String },
	#[error("Conflict: {message}")]
	Conflict { message: String },
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
}
impl From<mnemo_storage::Error> for Error {
	fn from(err: mnemo_storage::Error) -> Self {
		match err {
			mnemo_storage::Error::Sqlx(inner) => Self::Storage { message: inner.to_string() },
			mnemo_storage::Error::InvalidArgument(message) => Self::Storage { message },
			mnemo_storage::Error::NotFound(message) => Self::NotFound { message },
			mnemo_storage::Error::Conflict(message) => Self::Conflict { message },
		}
	}
}

impl From<mnemo_providers::Error> for Error {
	fn from(err: mnemo_providers::Error) -> Self {
		Self::Provider { message: err.to_string() }
	}
}
