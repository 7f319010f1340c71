//! Per-dependency circuit breakers.
//!
//! ```text
//!   Closed ──(failure_threshold failures)──> Open
//!   Open ──(open_duration elapsed)──> Closed
//! ```
//!
//! There is no half-open trial request: once `open_until` passes every caller is admitted again.
//! Tripping resets the failure count, so a reopened dependency needs a full new run of
//! failures before it trips again.

use std::{
	sync::atomic::{AtomicU32, AtomicU64, Ordering},
	time::Instant,
};

use serde::Serialize;

use fathom_config::{BreakerConfig, Resilience};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Dependency {
	Embedding,
	VectorSearch,
	Rerank,
}
impl Dependency {
	pub const ALL: [Self; 3] = [Self::Embedding, Self::VectorSearch, Self::Rerank];

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Embedding => "embedding",
			Self::VectorSearch => "vector_search",
			Self::Rerank => "rerank",
		}
	}
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BreakerSnapshot {
	pub name: &'static str,
	pub open: bool,
	pub failure_count: u32,
	pub open_remaining_ms: u64,
	pub trips: u64,
	pub rejections: u64,
}

/// Lock-free breaker; every field is an atomic so concurrent requests can share one
/// instance.
#[derive(Debug)]
pub struct CircuitBreaker {
	name: &'static str,
	failure_threshold: u32,
	open_duration_ms: u64,
	failure_count: AtomicU32,
	/// Milliseconds since `epoch`. Zero means the breaker never opened.
	open_until_ms: AtomicU64,
	epoch: Instant,
	trips: AtomicU64,
	rejections: AtomicU64,
}
impl CircuitBreaker {
	pub fn new(name: &'static str, failure_threshold: u32, open_duration_ms: u64) -> Self {
		Self {
			name,
			failure_threshold: failure_threshold.max(1),
			open_duration_ms: open_duration_ms.max(1),
			failure_count: AtomicU32::new(0),
			open_until_ms: AtomicU64::new(0),
			epoch: Instant::now(),
			trips: AtomicU64::new(0),
			rejections: AtomicU64::new(0),
		}
	}

	pub fn from_config(name: &'static str, cfg: &BreakerConfig) -> Self {
		Self::new(name, cfg.failure_threshold, cfg.open_duration_ms)
	}

	pub fn name(&self) -> &'static str {
		self.name
	}

	/// Reference instant for the `*_at` variants.
	pub fn epoch(&self) -> Instant {
		self.epoch
	}

	pub fn allow_request(&self) -> bool {
		self.allow_request_at(Instant::now())
	}

	pub fn allow_request_at(&self, now: Instant) -> bool {
		let allowed = !self.is_open_at(now);

		if !allowed {
			self.rejections.fetch_add(1, Ordering::Relaxed);
		}

		allowed
	}

	pub fn record_success(&self) {
		self.failure_count.store(0, Ordering::Release);
	}

	/// Returns `true` when this failure tripped the breaker.
	pub fn record_failure(&self) -> bool {
		self.record_failure_at(Instant::now())
	}

	pub fn record_failure_at(&self, now: Instant) -> bool {
		let count = self.failure_count.fetch_add(1, Ordering::AcqRel).saturating_add(1);

		if count < self.failure_threshold {
			return false;
		}
		// Only the caller whose increment is still current performs the trip.
		if self
			.failure_count
			.compare_exchange(count, 0, Ordering::AcqRel, Ordering::Acquire)
			.is_err()
		{
			return false;
		}

		let open_until = self.millis_since_epoch(now).saturating_add(self.open_duration_ms);

		self.open_until_ms.store(open_until, Ordering::Release);
		self.trips.fetch_add(1, Ordering::Relaxed);

		tracing::warn!(
			dependency = self.name,
			failure_threshold = self.failure_threshold,
			open_duration_ms = self.open_duration_ms,
			"Circuit breaker opened."
		);

		true
	}

	pub fn is_open_at(&self, now: Instant) -> bool {
		self.millis_since_epoch(now) < self.open_until_ms.load(Ordering::Acquire)
	}

	pub fn snapshot(&self) -> BreakerSnapshot {
		self.snapshot_at(Instant::now())
	}

	pub fn snapshot_at(&self, now: Instant) -> BreakerSnapshot {
		let now_ms = self.millis_since_epoch(now);
		let open_until = self.open_until_ms.load(Ordering::Acquire);

		BreakerSnapshot {
			name: self.name,
			open: now_ms < open_until,
			failure_count: self.failure_count.load(Ordering::Acquire),
			open_remaining_ms: open_until.saturating_sub(now_ms),
			trips: self.trips.load(Ordering::Relaxed),
			rejections: self.rejections.load(Ordering::Relaxed),
		}
	}

	fn millis_since_epoch(&self, now: Instant) -> u64 {
		u64::try_from(now.saturating_duration_since(self.epoch).as_millis()).unwrap_or(u64::MAX)
	}
}

/// One breaker per protected dependency, built once per process.
#[derive(Debug)]
pub struct BreakerRegistry {
	embedding: CircuitBreaker,
	vector_search: CircuitBreaker,
	rerank: CircuitBreaker,
}
impl BreakerRegistry {
	pub fn from_config(cfg: &Resilience) -> Self {
		Self {
			embedding: CircuitBreaker::from_config(Dependency::Embedding.as_str(), &cfg.embedding),
			vector_search: CircuitBreaker::from_config(
				Dependency::VectorSearch.as_str(),
				&cfg.vector_search,
			),
			rerank: CircuitBreaker::from_config(Dependency::Rerank.as_str(), &cfg.rerank),
		}
	}

	pub fn get(&self, dependency: Dependency) -> &CircuitBreaker {
		match dependency {
			Dependency::Embedding => &self.embedding,
			Dependency::VectorSearch => &self.vector_search,
			Dependency::Rerank => &self.rerank,
		}
	}

	pub fn by_name(&self, name: &str) -> Option<&CircuitBreaker> {
		Dependency::ALL.into_iter().find(|dep| dep.as_str() == name).map(|dep| self.get(dep))
	}

	pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
		Dependency::ALL.into_iter().map(|dep| self.get(dep).snapshot()).collect()
	}
}
