//! Two-stage rerank pipeline: guardrails, score cache, remote scorer, local heuristic.

pub mod cache;
pub mod guardrails;
pub mod stage1;
pub mod stage2;

pub use cache::{CacheStats, CachedScores, RerankCache};
pub use guardrails::GuardrailReport;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Error, FathomService, Result, text};
use fathom_domain::{Budget, Dependency};
use guardrails::GuardrailInput;
use stage2::Stage2Attempt;

/// Model id reported when neither stage reorders the fused list.
pub const PASSTHROUGH_MODEL: &str = "fusion-rrf";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
	CacheHit,
	ModelScored,
	Disabled,
	GuardrailSkip,
	BreakerOpen,
	BudgetExhausted,
	TimeoutDegradeToStage1,
}
impl ReasonCode {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::CacheHit => "cache_hit",
			Self::ModelScored => "model_scored",
			Self::Disabled => "disabled",
			Self::GuardrailSkip => "guardrail_skip",
			Self::BreakerOpen => "breaker_open",
			Self::BudgetExhausted => "budget_exhausted",
			Self::TimeoutDegradeToStage1 => "timeout_degrade_to_stage1",
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
	GuardrailCheck,
	CacheLookup,
	Stage2Attempt,
	Stage2Success,
	Stage1Degrade,
	Done,
}

/// A fused candidate plus the source fields and features the stages read.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RerankCandidate {
	pub doc_id: String,
	pub fused_rank: u32,
	pub fused_score: f64,
	#[serde(default)]
	pub title: Option<String>,
	#[serde(default)]
	pub authors: Vec<String>,
	#[serde(default)]
	pub text: Option<String>,
	#[serde(default, with = "time::serde::rfc3339::option")]
	pub published_at: Option<OffsetDateTime>,
	#[serde(default)]
	pub raw_features: Map<String, Value>,
	#[serde(default)]
	pub transformed_features: Map<String, Value>,
}
impl RerankCandidate {
	pub fn new(doc_id: String, fused_rank: u32, fused_score: f64) -> Self {
		Self {
			doc_id,
			fused_rank,
			fused_score,
			title: None,
			authors: Vec::new(),
			text: None,
			published_at: None,
			raw_features: Map::new(),
			transformed_features: Map::new(),
		}
	}
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageOptions {
	pub enabled: Option<bool>,
	pub top_k: Option<u32>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankOptions {
	pub size: Option<u32>,
	pub debug: bool,
	pub timeout_ms: Option<u64>,
	pub model: Option<String>,
	pub stage1: StageOptions,
	pub stage2: StageOptions,
	/// Clock for stage-1 freshness. Copy it from a replay block to reproduce a response.
	#[serde(with = "time::serde::rfc3339::option")]
	pub now: Option<OffsetDateTime>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RerankRequest {
	pub query: String,
	pub candidates: Vec<RerankCandidate>,
	#[serde(default)]
	pub options: RerankOptions,
}

#[derive(Clone, Debug, Serialize)]
pub struct RerankResponse {
	pub trace_id: Uuid,
	pub model: String,
	pub hits: Vec<RerankHit>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub debug: Option<RerankDebug>,
}

#[derive(Clone, Debug, Serialize)]
pub struct RerankHit {
	pub doc_id: String,
	pub score: f32,
	pub rank: u32,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub debug: Option<HitDebug>,
}

#[derive(Clone, Debug, Serialize)]
pub struct HitDebug {
	pub fused_rank: u32,
	pub fused_score: f64,
	pub stage1_score: Option<f32>,
	pub stage2_score: Option<f32>,
	pub raw_features: Map<String, Value>,
	pub transformed_features: Map<String, Value>,
}

#[derive(Clone, Debug, Serialize)]
pub struct RerankDebug {
	#[serde(rename = "stageDetails")]
	pub stage_details: StageDetails,
	pub replay: Replay,
}

#[derive(Clone, Debug, Serialize)]
pub struct StageDetails {
	pub path: Vec<StageState>,
	pub guardrails: GuardrailReport,
	pub cache: CacheDetails,
	pub stage1: Stage1Details,
	pub stage2: Stage2Details,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct CacheDetails {
	pub enabled: bool,
	pub eligible: bool,
	pub hit: bool,
	pub key_prefix: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Stage1Details {
	pub enabled: bool,
	pub top_k: u32,
	pub applied: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct Stage2Details {
	pub enabled: bool,
	pub reason_code: ReasonCode,
	pub model: Option<String>,
	pub pairs: usize,
	pub timeout_ms: u64,
	pub error: Option<String>,
	pub provider_debug: Option<Value>,
}

/// Everything needed to rerun a request and get the same answer.
#[derive(Clone, Debug, Serialize)]
pub struct Replay {
	pub query: String,
	pub candidate_ids: Vec<String>,
	pub options: EffectiveOptions,
	#[serde(with = "time::serde::rfc3339")]
	pub now: OffsetDateTime,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EffectiveOptions {
	pub size: u32,
	pub debug: bool,
	pub timeout_ms: u64,
	pub model: String,
	pub stage1: EffectiveStage,
	pub stage2: EffectiveStage,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct EffectiveStage {
	pub enabled: bool,
	pub top_k: u32,
}

/// One output position. `index` points into the guardrail-filtered candidate list.
#[derive(Clone, Debug, PartialEq)]
pub struct ScoredHit {
	pub index: usize,
	pub score: f32,
	pub stage1_score: Option<f32>,
	pub stage2_score: Option<f32>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum StageDecision {
	Stage1Heuristic { reason: ReasonCode, scored: Vec<ScoredHit> },
	Stage2Model { model: String, scored: Vec<ScoredHit>, provider_debug: Option<Value> },
	Stage2Cached { model: String, scored: Vec<ScoredHit> },
	Passthrough { reason: ReasonCode, scored: Vec<ScoredHit> },
}
impl StageDecision {
	pub fn model(&self) -> &str {
		match self {
			Self::Stage1Heuristic { .. } => stage1::STAGE1_MODEL,
			Self::Stage2Model { model, .. } | Self::Stage2Cached { model, .. } => model,
			Self::Passthrough { .. } => PASSTHROUGH_MODEL,
		}
	}

	pub fn reason_code(&self) -> ReasonCode {
		match self {
			Self::Stage1Heuristic { reason, .. } | Self::Passthrough { reason, .. } => *reason,
			Self::Stage2Model { .. } => ReasonCode::ModelScored,
			Self::Stage2Cached { .. } => ReasonCode::CacheHit,
		}
	}

	pub fn scored(&self) -> &[ScoredHit] {
		match self {
			Self::Stage1Heuristic { scored, .. }
			| Self::Stage2Model { scored, .. }
			| Self::Stage2Cached { scored, .. }
			| Self::Passthrough { scored, .. } => scored,
		}
	}
}

struct Stage2Args<'a> {
	query: &'a str,
	candidates: &'a [RerankCandidate],
	report: &'a GuardrailReport,
	effective: &'a EffectiveOptions,
	model_override: Option<&'a str>,
	budget: &'a Budget,
}

struct StageTrace {
	path: Vec<StageState>,
	cache: CacheDetails,
	stage2: Stage2Details,
}

impl FathomService {
	/// Reranks with a fresh budget of `budget.default_ms`.
	pub async fn rerank(&self, req: RerankRequest) -> Result<RerankResponse> {
		let budget = Budget::from_millis(self.cfg.budget.default_ms);

		self.rerank_with_budget(req, &budget).await
	}

	pub async fn rerank_with_budget(
		&self,
		req: RerankRequest,
		budget: &Budget,
	) -> Result<RerankResponse> {
		let RerankRequest { query, candidates, options } = req;
		let trimmed = query.trim();

		if trimmed.is_empty() {
			return Err(Error::InvalidRequest { message: "query must be non-empty.".to_string() });
		}
		if candidates.is_empty() {
			return Err(Error::InvalidRequest {
				message: "candidates must be non-empty.".to_string(),
			});
		}
		if candidates.iter().any(|candidate| candidate.doc_id.trim().is_empty()) {
			return Err(Error::InvalidRequest {
				message: "candidates[].doc_id must be non-empty.".to_string(),
			});
		}

		let effective = self.effective_options(&options)?;
		let trace_id = Uuid::new_v4();
		let now = options.now.unwrap_or_else(OffsetDateTime::now_utc);
		let candidate_ids: Vec<String> =
			candidates.iter().map(|candidate| candidate.doc_id.clone()).collect();
		let mut candidates = order_candidates(candidates);

		self.metrics.record_rerank_request();

		let report = guardrails::apply(
			&self.cfg.rerank.guardrails,
			GuardrailInput {
				query: trimmed,
				requested_size: effective.size,
				requested_timeout_ms: options.timeout_ms,
				stage2_top_k: effective.stage2.top_k,
			},
			&mut candidates,
		);

		if report.truncated() {
			self.metrics.record_guardrail_truncation();

			tracing::info!(
				trace_id = %trace_id,
				candidates_in = report.candidates_in,
				candidates_kept = report.candidates_kept,
				"Rerank candidates truncated by guardrail."
			);
		}

		let mut trace = StageTrace {
			path: vec![StageState::GuardrailCheck],
			cache: CacheDetails { enabled: self.cache.is_enabled(), ..CacheDetails::default() },
			stage2: Stage2Details {
				enabled: effective.stage2.enabled,
				reason_code: ReasonCode::Disabled,
				model: None,
				pairs: 0,
				timeout_ms: 0,
				error: None,
				provider_debug: None,
			},
		};
		let stage2_args = Stage2Args {
			query: trimmed,
			candidates: &candidates,
			report: &report,
			effective: &effective,
			model_override: options.model.as_deref(),
			budget,
		};
		let decision = match self.run_stage2(stage2_args, &mut trace).await {
			Ok(decision) => decision,
			Err(reason) => {
				trace.path.push(StageState::Stage1Degrade);
				self.metrics.record_degrade(reason);

				if reason == ReasonCode::Disabled {
					tracing::info!(
						trace_id = %trace_id,
						reason_code = reason.as_str(),
						"Stage 2 disabled."
					);
				} else {
					tracing::warn!(
						trace_id = %trace_id,
						reason_code = reason.as_str(),
						stage1_enabled = effective.stage1.enabled,
						"Rerank degraded to local ordering."
					);
				}

				if effective.stage1.enabled {
					StageDecision::Stage1Heuristic {
						reason,
						scored: stage1_hits(&candidates, effective.stage1.top_k as usize, now),
					}
				} else {
					StageDecision::Passthrough { reason, scored: passthrough_hits(&candidates) }
				}
			},
		};

		trace.path.push(StageState::Done);
		trace.stage2.reason_code = decision.reason_code();

		if let StageDecision::Stage2Model { provider_debug, .. } = &decision {
			trace.stage2.provider_debug = provider_debug.clone();
		}

		let hits: Vec<RerankHit> = decision
			.scored()
			.iter()
			.take(report.size as usize)
			.enumerate()
			.map(|(position, scored)| {
				let candidate = &candidates[scored.index];

				RerankHit {
					doc_id: candidate.doc_id.clone(),
					score: scored.score,
					rank: position as u32 + 1,
					debug: effective.debug.then(|| HitDebug {
						fused_rank: candidate.fused_rank,
						fused_score: candidate.fused_score,
						stage1_score: scored.stage1_score,
						stage2_score: scored.stage2_score,
						raw_features: candidate.raw_features.clone(),
						transformed_features: candidate.transformed_features.clone(),
					}),
				}
			})
			.collect();

		tracing::info!(
			trace_id = %trace_id,
			model = decision.model(),
			reason_code = decision.reason_code().as_str(),
			hits = hits.len(),
			elapsed_ms = budget.elapsed().as_millis() as u64,
			"Rerank completed."
		);

		let debug = effective.debug.then(|| RerankDebug {
			stage_details: StageDetails {
				path: trace.path,
				guardrails: report.clone(),
				cache: trace.cache,
				stage1: Stage1Details {
					enabled: effective.stage1.enabled,
					top_k: effective.stage1.top_k,
					applied: matches!(decision, StageDecision::Stage1Heuristic { .. }),
				},
				stage2: trace.stage2,
			},
			replay: Replay {
				query: query.clone(),
				candidate_ids,
				options: EffectiveOptions { timeout_ms: report.timeout_ms, ..effective.clone() },
				now,
			},
		});

		Ok(RerankResponse { trace_id, model: decision.model().to_string(), hits, debug })
	}

	fn effective_options(&self, options: &RerankOptions) -> Result<EffectiveOptions> {
		let cfg = &self.cfg.rerank;
		let size = options.size.unwrap_or(cfg.default_size);
		let stage1_top_k = options.stage1.top_k.unwrap_or(cfg.stage1.top_k);
		let stage2_top_k = options.stage2.top_k.unwrap_or(cfg.stage2.top_k);

		if size == 0 {
			return Err(Error::InvalidRequest {
				message: "options.size must be greater than zero.".to_string(),
			});
		}
		if options.timeout_ms == Some(0) {
			return Err(Error::InvalidRequest {
				message: "options.timeout_ms must be greater than zero.".to_string(),
			});
		}
		if stage1_top_k == 0 || stage2_top_k == 0 {
			return Err(Error::InvalidRequest {
				message: "options.stage*.top_k must be greater than zero.".to_string(),
			});
		}

		Ok(EffectiveOptions {
			size,
			debug: options.debug,
			timeout_ms: options.timeout_ms.unwrap_or(cfg.guardrails.timeout_ms_max),
			model: options.model.clone().unwrap_or_else(|| self.cfg.providers.rerank.model.clone()),
			stage1: EffectiveStage {
				enabled: cfg.stage1.enabled && options.stage1.enabled.unwrap_or(true),
				top_k: stage1_top_k,
			},
			stage2: EffectiveStage {
				enabled: cfg.stage2.enabled && options.stage2.enabled.unwrap_or(true),
				top_k: stage2_top_k,
			},
		})
	}

	/// Returns the stage-2 answer, or the reason stage 2 did not answer.
	async fn run_stage2(
		&self,
		args: Stage2Args<'_>,
		trace: &mut StageTrace,
	) -> std::result::Result<StageDecision, ReasonCode> {
		let Stage2Args { query, candidates, report, effective, model_override, budget } = args;

		if !effective.stage2.enabled {
			return Err(ReasonCode::Disabled);
		}
		if report.stage2_skip.is_some() {
			return Err(ReasonCode::GuardrailSkip);
		}

		let window = &candidates[..report.stage2_window];
		let doc_ids: Vec<String> =
			window.iter().map(|candidate| candidate.doc_id.clone()).collect();

		trace.path.push(StageState::CacheLookup);
		trace.cache.eligible = true;

		let cache_key = if self.cache.is_enabled() {
			match cache::build_rerank_cache_key(
				&text::normalize_query(query),
				&self.cfg.providers.rerank.provider_id,
				&effective.model,
				&doc_ids,
			) {
				Ok(key) => Some(key),
				Err(err) => {
					tracing::warn!(error = %err, cache_kind = "rerank", "Cache key build failed.");

					None
				},
			}
		} else {
			None
		};

		if let Some(key) = cache_key.as_deref() {
			trace.cache.key_prefix = Some(cache::cache_key_prefix(key).to_string());

			if let Some(cached) = self.cache.get(key, &doc_ids) {
				tracing::info!(
					cache_kind = "rerank",
					cache_key_prefix = cache::cache_key_prefix(key),
					hit = true,
					candidates = doc_ids.len(),
					"Cache hit."
				);

				trace.cache.hit = true;
				trace.stage2.model = Some(cached.model.clone());
				trace.stage2.pairs = doc_ids.len();

				return Ok(StageDecision::Stage2Cached {
					scored: stage2_hits(&cached.scores, candidates.len()),
					model: cached.model,
				});
			}

			tracing::info!(
				cache_kind = "rerank",
				cache_key_prefix = cache::cache_key_prefix(key),
				hit = false,
				"Cache miss."
			);
		}

		let breaker = self.breakers.get(Dependency::Rerank);

		if !breaker.allow_request() {
			return Err(ReasonCode::BreakerOpen);
		}
		if budget.is_exhausted() {
			return Err(ReasonCode::BudgetExhausted);
		}

		// The provider's own timeout caps the guardrail value as well as the budget.
		let timeout =
			budget.clamp_ms(report.timeout_ms.min(self.cfg.providers.rerank.timeout_ms));

		if timeout.is_zero() {
			return Err(ReasonCode::BudgetExhausted);
		}

		let pairs = stage2::build_pairs(window);

		trace.path.push(StageState::Stage2Attempt);
		trace.stage2.pairs = pairs.len();
		trace.stage2.timeout_ms = timeout.as_millis() as u64;

		self.metrics.record_stage2_call();

		let attempt = stage2::attempt(
			self.providers.scorer.as_ref(),
			&self.cfg.providers.rerank,
			query,
			&pairs,
			timeout,
			model_override,
		)
		.await;

		match attempt {
			Stage2Attempt::Scored(response) => {
				breaker.record_success();
				trace.path.push(StageState::Stage2Success);
				trace.stage2.model = Some(response.model.clone());

				if let Some(key) = cache_key {
					tracing::info!(
						cache_kind = "rerank",
						cache_key_prefix = cache::cache_key_prefix(&key),
						hit = false,
						ttl_ms = self.cfg.rerank.cache.ttl_ms,
						"Cache stored."
					);

					self.cache.put(key, doc_ids, response.scores.clone(), response.model.clone());
				}

				Ok(StageDecision::Stage2Model {
					scored: stage2_hits(&response.scores, candidates.len()),
					model: response.model,
					provider_debug: response.debug,
				})
			},
			failed => {
				self.metrics.record_stage2_failure();

				let tripped = failed.feeds_breaker() && breaker.record_failure();

				trace.stage2.error = failed.error_label();

				tracing::warn!(
					dependency = Dependency::Rerank.as_str(),
					error = trace.stage2.error.as_deref().unwrap_or_default(),
					timeout_ms = trace.stage2.timeout_ms,
					breaker_tripped = tripped,
					"Remote scorer failed."
				);

				Err(ReasonCode::TimeoutDegradeToStage1)
			},
		}
	}
}

/// Fused-rank order with duplicate ids dropped.
fn order_candidates(mut candidates: Vec<RerankCandidate>) -> Vec<RerankCandidate> {
	candidates.sort_by(|left, right| {
		left.fused_rank.cmp(&right.fused_rank).then_with(|| left.doc_id.cmp(&right.doc_id))
	});

	let mut seen = HashSet::with_capacity(candidates.len());

	candidates.retain(|candidate| seen.insert(candidate.doc_id.clone()));

	candidates
}

/// Scored window first, then the rest of the kept candidates in fused order.
fn stage2_hits(scores: &[f32], total: usize) -> Vec<ScoredHit> {
	let mut order: Vec<usize> = (0..scores.len()).collect();

	order.sort_by(|left, right| {
		stage1::cmp_f32_desc(scores[*left], scores[*right]).then_with(|| left.cmp(right))
	});

	let hits = order
		.into_iter()
		.map(|index| ScoredHit {
			index,
			score: scores[index],
			stage1_score: None,
			stage2_score: Some(scores[index]),
		})
		.collect();

	append_unscored(hits, scores.len(), total)
}

fn stage1_hits(
	candidates: &[RerankCandidate],
	top_k: usize,
	now: OffsetDateTime,
) -> Vec<ScoredHit> {
	let scored = stage1::score(candidates, top_k, now);
	let window = scored.len();
	let hits = scored
		.into_iter()
		.map(|(index, score)| ScoredHit {
			index,
			score,
			stage1_score: Some(score),
			stage2_score: None,
		})
		.collect();

	append_unscored(hits, window, candidates.len())
}

/// Candidates `window..total` follow in fused order, each scored one below the previous so
/// they never overlap the scored window.
fn append_unscored(mut hits: Vec<ScoredHit>, window: usize, total: usize) -> Vec<ScoredHit> {
	let floor = hits.iter().map(|hit| hit.score).fold(f32::INFINITY, f32::min);
	let floor = if floor.is_finite() { floor } else { 0.0 };

	hits.extend((window..total).enumerate().map(|(offset, index)| ScoredHit {
		index,
		score: floor - (offset + 1) as f32,
		stage1_score: None,
		stage2_score: None,
	}));

	hits
}

fn passthrough_hits(candidates: &[RerankCandidate]) -> Vec<ScoredHit> {
	candidates
		.iter()
		.enumerate()
		.map(|(index, candidate)| ScoredHit {
			index,
			score: candidate.fused_score as f32,
			stage1_score: None,
			stage2_score: None,
		})
		.collect()
}
