use std::time::Duration;

use reqwest::Client;

use crate::{EnrichItem, EnrichedCandidate, Error, Result};
use fathom_config::EnrichmentProviderConfig;

/// Asks the feature service for raw and transformed features per candidate. Candidates the
/// service omits come back without features.
pub async fn enrich(
	client: &Client,
	cfg: &EnrichmentProviderConfig,
	query: &str,
	items: &[EnrichItem],
	timeout: Duration,
) -> Result<Vec<EnrichedCandidate>> {
	if items.is_empty() {
		return Ok(Vec::new());
	}

	let body = serde_json::json!({ "query": query, "candidates": items });
	let json = crate::post_json(
		client,
		crate::join_url(&cfg.api_base, &cfg.path),
		crate::auth_headers(&cfg.api_key, &cfg.default_headers)?,
		&body,
		timeout,
	)
	.await?;
	let candidates = json.get("candidates").cloned().ok_or_else(|| Error::InvalidResponse {
		message: "Enrichment response is missing candidates array.".to_string(),
	})?;

	Ok(serde_json::from_value(candidates)?)
}
