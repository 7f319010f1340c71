pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	/// Transport failure, timeout, or 5xx. Feeds circuit breakers.
	#[error("Upstream unavailable: {message}")]
	Unavailable { message: String },
	/// 4xx from upstream. Never feeds circuit breakers.
	#[error("Upstream rejected request with status {status}: {message}")]
	Request { status: u16, message: String },
	#[error(transparent)]
	Reqwest(reqwest::Error),
	#[error(transparent)]
	SerdeJson(#[from] serde_json::Error),
	#[error(transparent)]
	InvalidHeaderName(#[from] reqwest::header::InvalidHeaderName),
	#[error(transparent)]
	InvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),
	#[error("{message}")]
	InvalidConfig { message: String },
	#[error("{message}")]
	InvalidResponse { message: String },
}
impl Error {
	pub fn is_transient(&self) -> bool {
		matches!(self, Self::Unavailable { .. })
	}

	/// Short label for logs and debug payloads.
	pub fn kind(&self) -> &'static str {
		match self {
			Self::Unavailable { .. } => "unavailable",
			Self::Request { .. } => "request_error",
			Self::Reqwest(_) => "client_error",
			Self::SerdeJson(_) | Self::InvalidResponse { .. } => "invalid_response",
			Self::InvalidHeaderName(_) | Self::InvalidHeaderValue(_) | Self::InvalidConfig { .. } =>
				"invalid_config",
		}
	}
}

impl From<reqwest::Error> for Error {
	fn from(err: reqwest::Error) -> Self {
		if let Some(status) = err.status() {
			if status.is_server_error() {
				return Self::Unavailable { message: err.to_string() };
			}
			if status.is_client_error() {
				return Self::Request { status: status.as_u16(), message: err.to_string() };
			}
		}
		if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
			return Self::Unavailable { message: err.to_string() };
		}
		if err.is_decode() {
			return Self::InvalidResponse { message: err.to_string() };
		}

		Self::Reqwest(err)
	}
}
