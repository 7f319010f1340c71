pub mod breaker;
pub mod budget;
pub mod fusion;

pub use breaker::{BreakerRegistry, BreakerSnapshot, CircuitBreaker, Dependency};
pub use budget::Budget;
pub use fusion::{Candidate, FusionWeights};
