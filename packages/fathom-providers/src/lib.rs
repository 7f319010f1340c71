pub mod embedding;
pub mod enrichment;
pub mod index;
pub mod rerank;

mod error;
mod types;

pub use error::{Error, Result};
pub use rerank::ScorerProtocol;
pub use types::{
	EnrichItem, EnrichedCandidate, ScorePair, ScoreResponse, ScoredDoc, SourceDoc,
};

use std::time::Duration;

use reqwest::{
	Client,
	header::{AUTHORIZATION, HeaderMap, HeaderName},
};
use serde_json::{Map, Value};

pub fn auth_headers(api_key: &str, default_headers: &Map<String, Value>) -> Result<HeaderMap> {
	let mut headers = HeaderMap::new();

	headers.insert(AUTHORIZATION, format!("Bearer {api_key}").parse()?);

	for (key, value) in default_headers {
		let Some(raw) = value.as_str() else {
			return Err(Error::InvalidConfig {
				message: format!("Default header {key} must be a string."),
			});
		};

		headers.insert(HeaderName::from_bytes(key.as_bytes())?, raw.parse()?);
	}

	Ok(headers)
}

/// POSTs `body` and decodes a JSON reply. 5xx maps to [`Error::Unavailable`], other non-2xx
/// statuses to [`Error::Request`].
pub async fn post_json(
	client: &Client,
	url: String,
	headers: HeaderMap,
	body: &Value,
	timeout: Duration,
) -> Result<Value> {
	if timeout.is_zero() {
		return Err(Error::Unavailable { message: format!("No time left to call {url}.") });
	}

	let res = client.post(&url).headers(headers).timeout(timeout).json(body).send().await?;
	let status = res.status();

	if status.is_server_error() {
		return Err(Error::Unavailable { message: format!("{url} returned {status}.") });
	}
	if !status.is_success() {
		let detail = res.text().await.unwrap_or_default();

		return Err(Error::Request {
			status: status.as_u16(),
			message: format!("{url} returned {status}: {}", detail.trim()),
		});
	}

	Ok(res.json().await?)
}

pub(crate) fn join_url(api_base: &str, path: &str) -> String {
	format!("{api_base}{path}")
}
