use std::time::Duration;

use crate::{RemoteScorer, rerank::RerankCandidate};
use fathom_config::RerankProviderConfig;
use fathom_providers::{ScorePair, ScoreResponse};

/// What came back from one remote scoring call.
#[derive(Debug)]
pub enum Stage2Attempt {
	Scored(ScoreResponse),
	Failed { kind: &'static str, message: String, feeds_breaker: bool },
	TimedOut { timeout_ms: u64 },
}
impl Stage2Attempt {
	pub fn feeds_breaker(&self) -> bool {
		match self {
			Self::Scored(_) => false,
			Self::Failed { feeds_breaker, .. } => *feeds_breaker,
			Self::TimedOut { .. } => true,
		}
	}

	pub fn error_label(&self) -> Option<String> {
		match self {
			Self::Scored(_) => None,
			Self::Failed { kind, message, .. } => Some(format!("{kind}: {message}")),
			Self::TimedOut { timeout_ms } => Some(format!("timeout after {timeout_ms}ms")),
		}
	}
}

pub fn build_pairs(candidates: &[RerankCandidate]) -> Vec<ScorePair> {
	candidates
		.iter()
		.map(|candidate| ScorePair {
			doc_id: candidate.doc_id.clone(),
			text: pair_text(candidate),
			features: if candidate.transformed_features.is_empty() {
				candidate.raw_features.clone()
			} else {
				candidate.transformed_features.clone()
			},
		})
		.collect()
}

fn pair_text(candidate: &RerankCandidate) -> String {
	let parts: Vec<&str> = [candidate.title.as_deref(), candidate.text.as_deref()]
		.into_iter()
		.flatten()
		.map(str::trim)
		.filter(|part| !part.is_empty())
		.collect();

	if parts.is_empty() { candidate.doc_id.clone() } else { parts.join("\n\n") }
}

pub async fn attempt(
	scorer: &dyn RemoteScorer,
	cfg: &RerankProviderConfig,
	query: &str,
	pairs: &[ScorePair],
	timeout: Duration,
	model_override: Option<&str>,
) -> Stage2Attempt {
	let call = scorer.score(cfg, query, pairs, timeout, model_override);
	let timeout_ms = timeout.as_millis() as u64;

	match tokio::time::timeout(timeout, call).await {
		Err(_) => Stage2Attempt::TimedOut { timeout_ms },
		Ok(Err(err)) => Stage2Attempt::Failed {
			kind: err.kind(),
			message: err.to_string(),
			feeds_breaker: !matches!(err, fathom_providers::Error::Request { .. }),
		},
		Ok(Ok(response)) if response.scores.len() != pairs.len() => Stage2Attempt::Failed {
			kind: "invalid_response",
			message: format!(
				"scorer returned {} scores for {} pairs",
				response.scores.len(),
				pairs.len()
			),
			feeds_breaker: true,
		},
		Ok(Ok(response)) if response.scores.iter().any(|score| !score.is_finite()) =>
			Stage2Attempt::Failed {
				kind: "invalid_response",
				message: "scorer returned a non-finite score".to_string(),
				feeds_breaker: true,
			},
		Ok(Ok(response)) => Stage2Attempt::Scored(response),
	}
}
