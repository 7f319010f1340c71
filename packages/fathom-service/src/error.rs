pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Backend unavailable: {message}")]
	BackendUnavailable { message: String },
	#[error("Provider error: {message}")]
	Provider { message: String },
}
impl From<fathom_providers::Error> for Error {
	fn from(err: fathom_providers::Error) -> Self {
		match err {
			fathom_providers::Error::Unavailable { message } =>
				Self::BackendUnavailable { message },
			fathom_providers::Error::Request { status, message } =>
				Self::InvalidRequest { message: format!("upstream returned {status}: {message}") },
			other => Self::Provider { message: other.to_string() },
		}
	}
}
