//! Process-lifetime counters for degrade paths and remote calls.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::rerank::{CacheStats, ReasonCode};

#[derive(Debug, Default)]
pub struct Metrics {
	rerank_requests: AtomicU64,
	stage2_calls: AtomicU64,
	stage2_failures: AtomicU64,
	degrade_disabled: AtomicU64,
	degrade_guardrail_skip: AtomicU64,
	degrade_breaker_open: AtomicU64,
	degrade_budget_exhausted: AtomicU64,
	degrade_timeout: AtomicU64,
	guardrail_truncations: AtomicU64,
	vector_skipped: AtomicU64,
	vector_failures: AtomicU64,
	fallback_queries: AtomicU64,
	fallback_failures: AtomicU64,
	source_fetch_failures: AtomicU64,
	enrichment_failures: AtomicU64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
	pub rerank_requests: u64,
	pub stage2_calls: u64,
	pub stage2_failures: u64,
	pub degrades: DegradeCounts,
	pub guardrail_truncations: u64,
	pub vector_skipped: u64,
	pub vector_failures: u64,
	pub fallback_queries: u64,
	pub fallback_failures: u64,
	pub source_fetch_failures: u64,
	pub enrichment_failures: u64,
	pub cache: CacheStats,
}

/// Stage-1 or passthrough answers, keyed by the reason stage 2 did not answer.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DegradeCounts {
	pub disabled: u64,
	pub guardrail_skip: u64,
	pub breaker_open: u64,
	pub budget_exhausted: u64,
	pub timeout_degrade_to_stage1: u64,
}

impl Metrics {
	pub(crate) fn record_rerank_request(&self) {
		bump(&self.rerank_requests);
	}

	pub(crate) fn record_stage2_call(&self) {
		bump(&self.stage2_calls);
	}

	pub(crate) fn record_stage2_failure(&self) {
		bump(&self.stage2_failures);
	}

	pub(crate) fn record_degrade(&self, reason: ReasonCode) {
		let counter = match reason {
			ReasonCode::Disabled => &self.degrade_disabled,
			ReasonCode::GuardrailSkip => &self.degrade_guardrail_skip,
			ReasonCode::BreakerOpen => &self.degrade_breaker_open,
			ReasonCode::BudgetExhausted => &self.degrade_budget_exhausted,
			ReasonCode::TimeoutDegradeToStage1 => &self.degrade_timeout,
			ReasonCode::CacheHit | ReasonCode::ModelScored => return,
		};

		bump(counter);
	}

	pub(crate) fn record_guardrail_truncation(&self) {
		bump(&self.guardrail_truncations);
	}

	pub(crate) fn record_vector_skipped(&self) {
		bump(&self.vector_skipped);
	}

	pub(crate) fn record_vector_failure(&self) {
		bump(&self.vector_failures);
	}

	pub(crate) fn record_fallback_query(&self) {
		bump(&self.fallback_queries);
	}

	pub(crate) fn record_fallback_failure(&self) {
		bump(&self.fallback_failures);
	}

	pub(crate) fn record_source_fetch_failure(&self) {
		bump(&self.source_fetch_failures);
	}

	pub(crate) fn record_enrichment_failure(&self) {
		bump(&self.enrichment_failures);
	}

	pub fn snapshot(&self, cache: CacheStats) -> MetricsSnapshot {
		MetricsSnapshot {
			rerank_requests: load(&self.rerank_requests),
			stage2_calls: load(&self.stage2_calls),
			stage2_failures: load(&self.stage2_failures),
			degrades: DegradeCounts {
				disabled: load(&self.degrade_disabled),
				guardrail_skip: load(&self.degrade_guardrail_skip),
				breaker_open: load(&self.degrade_breaker_open),
				budget_exhausted: load(&self.degrade_budget_exhausted),
				timeout_degrade_to_stage1: load(&self.degrade_timeout),
			},
			guardrail_truncations: load(&self.guardrail_truncations),
			vector_skipped: load(&self.vector_skipped),
			vector_failures: load(&self.vector_failures),
			fallback_queries: load(&self.fallback_queries),
			fallback_failures: load(&self.fallback_failures),
			source_fetch_failures: load(&self.source_fetch_failures),
			enrichment_failures: load(&self.enrichment_failures),
			cache,
		}
	}
}

fn bump(counter: &AtomicU64) {
	counter.fetch_add(1, Ordering::Relaxed);
}

fn load(counter: &AtomicU64) -> u64 {
	counter.load(Ordering::Relaxed)
}
