use serde::Serialize;

use crate::rerank::RerankCandidate;
use fathom_config::RerankGuardrails;

/// Limits applied to one request before any remote call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GuardrailReport {
	pub candidates_in: usize,
	pub candidates_kept: usize,
	pub size: u32,
	/// Pairs eligible for the remote scorer.
	pub stage2_window: usize,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub stage2_skip: Option<&'static str>,
	pub timeout_ms: u64,
}
impl GuardrailReport {
	pub fn truncated(&self) -> bool {
		self.candidates_kept < self.candidates_in
	}
}

pub struct GuardrailInput<'a> {
	pub query: &'a str,
	pub requested_size: u32,
	pub requested_timeout_ms: Option<u64>,
	pub stage2_top_k: u32,
}

/// Truncates `candidates` (already in fused-rank order) and derives the per-request caps.
pub fn apply(
	cfg: &RerankGuardrails,
	input: GuardrailInput<'_>,
	candidates: &mut Vec<RerankCandidate>,
) -> GuardrailReport {
	let candidates_in = candidates.len();

	candidates.truncate(cfg.max_candidates as usize);

	let kept = candidates.len();
	let stage2_window = kept.min(cfg.max_mis_candidates as usize).min(input.stage2_top_k as usize);
	let query_len = input.query.trim().chars().count();
	let stage2_skip = if kept < cfg.min_candidates_for_mis as usize {
		Some("too_few_candidates")
	} else if query_len < cfg.min_query_length_for_mis as usize {
		Some("query_too_short")
	} else if stage2_window == 0 {
		Some("empty_window")
	} else {
		None
	};
	let timeout_ms =
		input.requested_timeout_ms.unwrap_or(cfg.timeout_ms_max).min(cfg.timeout_ms_max);

	GuardrailReport {
		candidates_in,
		candidates_kept: kept,
		size: input.requested_size.min(cfg.max_top_n),
		stage2_window,
		stage2_skip,
		timeout_ms,
	}
}
