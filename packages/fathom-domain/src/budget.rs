use std::time::{Duration, Instant};

/// Per-request latency budget. Created once per inbound request and passed by reference to
/// every downstream call so each can size its own timeout.
#[derive(Clone, Copy, Debug)]
pub struct Budget {
	started_at: Instant,
	budget: Duration,
}
impl Budget {
	pub fn new(budget: Duration) -> Self {
		Self::starting_at(Instant::now(), budget)
	}

	pub fn from_millis(budget_ms: u64) -> Self {
		Self::new(Duration::from_millis(budget_ms))
	}

	pub fn starting_at(started_at: Instant, budget: Duration) -> Self {
		Self { started_at, budget }
	}

	pub fn started_at(&self) -> Instant {
		self.started_at
	}

	pub fn budget(&self) -> Duration {
		self.budget
	}

	pub fn deadline(&self) -> Instant {
		self.started_at + self.budget
	}

	/// Never negative; non-increasing because it is measured on the monotonic clock.
	pub fn remaining(&self) -> Duration {
		self.remaining_at(Instant::now())
	}

	pub fn remaining_at(&self, now: Instant) -> Duration {
		self.deadline().saturating_duration_since(now)
	}

	pub fn remaining_ms(&self) -> u64 {
		u64::try_from(self.remaining().as_millis()).unwrap_or(u64::MAX)
	}

	pub fn elapsed(&self) -> Duration {
		self.started_at.elapsed()
	}

	pub fn is_exhausted(&self) -> bool {
		self.remaining().is_zero()
	}

	/// Timeout for a call whose own ceiling is `max`.
	pub fn clamp(&self, max: Duration) -> Duration {
		self.remaining().min(max)
	}

	pub fn clamp_ms(&self, max_ms: u64) -> Duration {
		self.clamp(Duration::from_millis(max_ms))
	}
}
