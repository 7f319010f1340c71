use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::{Error, Result, ScorePair, ScoreResponse};
use fathom_config::RerankProviderConfig;

/// Wire format spoken by the remote scorer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScorerProtocol {
	/// `{model, query, documents}` in, `{results: [{index, relevance_score}]}` out.
	Documents,
	/// `{model, query, pairs}` in, `{model, scores, debug}` out.
	Pairs,
}
impl ScorerProtocol {
	pub fn parse(raw: &str) -> Result<Self> {
		match raw.trim().to_ascii_lowercase().as_str() {
			"documents" => Ok(Self::Documents),
			"pairs" => Ok(Self::Pairs),
			other => Err(Error::InvalidConfig {
				message: format!("Unknown rerank protocol {other:?}."),
			}),
		}
	}

	pub fn from_config(cfg: &RerankProviderConfig) -> Result<Self> {
		Self::parse(&cfg.protocol)
	}

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Documents => "documents",
			Self::Pairs => "pairs",
		}
	}
}

/// Scores `pairs` against `query`. The returned scores line up with `pairs` by position.
pub async fn score(
	client: &Client,
	cfg: &RerankProviderConfig,
	protocol: ScorerProtocol,
	query: &str,
	pairs: &[ScorePair],
	timeout: Duration,
	model_override: Option<&str>,
) -> Result<ScoreResponse> {
	let model = model_override.unwrap_or(&cfg.model);
	let body = match protocol {
		ScorerProtocol::Documents => {
			let documents: Vec<&str> = pairs.iter().map(|pair| pair.text.as_str()).collect();

			serde_json::json!({ "model": model, "query": query, "documents": documents })
		},
		ScorerProtocol::Pairs => serde_json::json!({
			"model": model,
			"query": query,
			"pairs": pairs,
			"timeout_ms": timeout.as_millis() as u64,
		}),
	};
	let json = crate::post_json(
		client,
		crate::join_url(&cfg.api_base, &cfg.path),
		crate::auth_headers(&cfg.api_key, &cfg.default_headers)?,
		&body,
		timeout,
	)
	.await?;

	match protocol {
		ScorerProtocol::Documents => Ok(ScoreResponse {
			model: json.get("model").and_then(|v| v.as_str()).unwrap_or(model).to_string(),
			scores: parse_documents_response(&json, pairs.len())?,
			debug: None,
		}),
		ScorerProtocol::Pairs => parse_pairs_response(json, pairs.len()),
	}
}

fn parse_documents_response(json: &Value, doc_count: usize) -> Result<Vec<f32>> {
	let results = json
		.get("results")
		.or_else(|| json.get("data"))
		.and_then(|v| v.as_array())
		.ok_or_else(|| Error::InvalidResponse {
			message: "Rerank response is missing results array.".to_string(),
		})?;
	let mut scores: Vec<Option<f32>> = vec![None; doc_count];

	for item in results {
		let index = item.get("index").and_then(|v| v.as_u64()).ok_or_else(|| {
			Error::InvalidResponse { message: "Rerank result missing index.".to_string() }
		})? as usize;
		let score = item
			.get("relevance_score")
			.or_else(|| item.get("score"))
			.and_then(|v| v.as_f64())
			.ok_or_else(|| Error::InvalidResponse {
				message: "Rerank result missing score.".to_string(),
			})? as f32;

		if let Some(slot) = scores.get_mut(index) {
			*slot = Some(score);
		}
	}

	scores
		.into_iter()
		.enumerate()
		.map(|(index, score)| {
			score.ok_or_else(|| Error::InvalidResponse {
				message: format!("Rerank response has no score for document {index}."),
			})
		})
		.collect()
}

fn parse_pairs_response(json: Value, pair_count: usize) -> Result<ScoreResponse> {
	let parsed: ScoreResponse = serde_json::from_value(json)?;

	if parsed.scores.len() != pair_count {
		return Err(Error::InvalidResponse {
			message: format!(
				"Scorer returned {} scores for {pair_count} pairs.",
				parsed.scores.len()
			),
		});
	}
	if parsed.scores.iter().any(|score| !score.is_finite()) {
		return Err(Error::InvalidResponse {
			message: "Scorer returned a non-finite score.".to_string(),
		});
	}

	Ok(parsed)
}
