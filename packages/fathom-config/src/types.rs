use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub budget: Budget,
	pub providers: Providers,
	pub retrieval: Retrieval,
	#[serde(default)]
	pub resilience: Resilience,
	pub rerank: Rerank,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub log_level: String,
}

/// Per-request latency budget.
#[derive(Debug, Deserialize)]
pub struct Budget {
	/// Used when a request does not carry its own budget.
	pub default_ms: u64,
	/// Upper bound for caller-supplied budgets.
	pub max_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
	pub index: IndexProviderConfig,
	pub rerank: RerankProviderConfig,
	pub enrichment: EnrichmentProviderConfig,
}

#[derive(Debug, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct IndexProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub lexical_path: String,
	pub vector_path: String,
	pub sources_path: String,
	pub author_fallback_path: String,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct RerankProviderConfig {
	pub provider_id: String,
	/// Wire protocol of the scoring endpoint, either "documents" or "pairs".
	#[serde(default = "default_rerank_protocol")]
	pub protocol: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct EnrichmentProviderConfig {
	pub enabled: bool,
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct Retrieval {
	pub lexical_top_k: u32,
	pub vector_top_k: u32,
	/// Fused candidates kept after rank fusion.
	pub candidate_k: u32,
	#[serde(default)]
	pub fusion: RetrievalFusion,
	#[serde(default)]
	pub fallback: RetrievalFallback,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RetrievalFusion {
	pub k: f64,
	pub lexical_weight: f64,
	pub vector_weight: f64,
}
impl Default for RetrievalFusion {
	fn default() -> Self {
		Self { k: 60.0, lexical_weight: 1.0, vector_weight: 1.0 }
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RetrievalFallback {
	pub enabled: bool,
	/// Fused hits inspected for query containment before falling back.
	pub check_top_n: u32,
	pub top_k: u32,
}
impl Default for RetrievalFallback {
	fn default() -> Self {
		Self { enabled: true, check_top_n: 5, top_k: 20 }
	}
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Resilience {
	pub embedding: BreakerConfig,
	pub vector_search: BreakerConfig,
	pub rerank: BreakerConfig,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
	pub failure_threshold: u32,
	pub open_duration_ms: u64,
}
impl Default for BreakerConfig {
	fn default() -> Self {
		Self { failure_threshold: 5, open_duration_ms: 30_000 }
	}
}

#[derive(Debug, Deserialize)]
pub struct Rerank {
	pub default_size: u32,
	pub guardrails: RerankGuardrails,
	pub cache: RerankCache,
	#[serde(default)]
	pub stage1: RerankStage1,
	pub stage2: RerankStage2,
}

#[derive(Debug, Deserialize)]
pub struct RerankGuardrails {
	pub max_candidates: u32,
	pub max_top_n: u32,
	/// Upper bound on pairs sent to the remote scorer.
	pub max_mis_candidates: u32,
	pub min_candidates_for_mis: u32,
	pub min_query_length_for_mis: u32,
	pub timeout_ms_max: u64,
}

#[derive(Debug, Deserialize)]
pub struct RerankCache {
	pub enabled: bool,
	pub ttl_ms: u64,
	pub max_entries: u32,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RerankStage1 {
	pub enabled: bool,
	pub top_k: u32,
}
impl Default for RerankStage1 {
	fn default() -> Self {
		Self { enabled: true, top_k: 100 }
	}
}

#[derive(Debug, Deserialize)]
pub struct RerankStage2 {
	pub enabled: bool,
	pub top_k: u32,
}

fn default_rerank_protocol() -> String {
	"documents".to_string()
}
