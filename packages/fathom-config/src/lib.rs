mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	BreakerConfig, Budget, Config, EmbeddingProviderConfig, EnrichmentProviderConfig,
	IndexProviderConfig, Providers, Rerank, RerankCache, RerankGuardrails, RerankProviderConfig,
	RerankStage1, RerankStage2, Resilience, Retrieval, RetrievalFallback, RetrievalFusion,
	Service,
};

use std::{fs, path::Path};

pub const RERANK_PROTOCOLS: &[&str] = &["documents", "pairs"];

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.budget.default_ms == 0 {
		return Err(Error::Validation {
			message: "budget.default_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.budget.default_ms > cfg.budget.max_ms {
		return Err(Error::Validation {
			message: "budget.default_ms must not exceed budget.max_ms.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}

	for (label, timeout_ms) in [
		("providers.embedding.timeout_ms", cfg.providers.embedding.timeout_ms),
		("providers.index.timeout_ms", cfg.providers.index.timeout_ms),
		("providers.rerank.timeout_ms", cfg.providers.rerank.timeout_ms),
		("providers.enrichment.timeout_ms", cfg.providers.enrichment.timeout_ms),
	] {
		if timeout_ms == 0 {
			return Err(Error::Validation {
				message: format!("{label} must be greater than zero."),
			});
		}
	}

	if !RERANK_PROTOCOLS.contains(&cfg.providers.rerank.protocol.as_str()) {
		return Err(Error::UnknownVariant {
			field: "providers.rerank.protocol",
			value: cfg.providers.rerank.protocol.clone(),
			expected: "documents or pairs",
		});
	}

	for (label, value) in [
		("retrieval.lexical_top_k", cfg.retrieval.lexical_top_k),
		("retrieval.vector_top_k", cfg.retrieval.vector_top_k),
		("retrieval.candidate_k", cfg.retrieval.candidate_k),
	] {
		if value == 0 {
			return Err(Error::Validation {
				message: format!("{label} must be greater than zero."),
			});
		}
	}

	let fusion = &cfg.retrieval.fusion;

	if !fusion.k.is_finite() || fusion.k < 0.0 {
		return Err(Error::Validation {
			message: "retrieval.fusion.k must be a finite number, zero or greater.".to_string(),
		});
	}

	for (label, weight) in [
		("retrieval.fusion.lexical_weight", fusion.lexical_weight),
		("retrieval.fusion.vector_weight", fusion.vector_weight),
	] {
		if !weight.is_finite() {
			return Err(Error::Validation {
				message: format!("{label} must be a finite number."),
			});
		}
		if weight < 0.0 {
			return Err(Error::Validation { message: format!("{label} must be zero or greater.") });
		}
	}

	if cfg.retrieval.fallback.enabled
		&& (cfg.retrieval.fallback.check_top_n == 0 || cfg.retrieval.fallback.top_k == 0)
	{
		return Err(Error::Validation {
			message: "retrieval.fallback.check_top_n and retrieval.fallback.top_k must be greater than zero when enabled."
				.to_string(),
		});
	}

	for (label, breaker) in [
		("resilience.embedding", &cfg.resilience.embedding),
		("resilience.vector_search", &cfg.resilience.vector_search),
		("resilience.rerank", &cfg.resilience.rerank),
	] {
		if breaker.failure_threshold == 0 {
			return Err(Error::Validation {
				message: format!("{label}.failure_threshold must be greater than zero."),
			});
		}
		if breaker.open_duration_ms == 0 {
			return Err(Error::Validation {
				message: format!("{label}.open_duration_ms must be greater than zero."),
			});
		}
	}

	validate_rerank(cfg)?;

	for (label, key) in [
		("embedding", &cfg.providers.embedding.api_key),
		("index", &cfg.providers.index.api_key),
		("rerank", &cfg.providers.rerank.api_key),
		("enrichment", &cfg.providers.enrichment.api_key),
	] {
		if key.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("Provider {label} api_key must be non-empty."),
			});
		}
	}

	Ok(())
}

fn validate_rerank(cfg: &Config) -> Result<()> {
	let rerank = &cfg.rerank;
	let guardrails = &rerank.guardrails;

	for (label, value) in [
		("rerank.guardrails.max_candidates", guardrails.max_candidates),
		("rerank.guardrails.max_top_n", guardrails.max_top_n),
		("rerank.guardrails.max_mis_candidates", guardrails.max_mis_candidates),
		("rerank.default_size", rerank.default_size),
		("rerank.stage1.top_k", rerank.stage1.top_k),
		("rerank.stage2.top_k", rerank.stage2.top_k),
	] {
		if value == 0 {
			return Err(Error::Validation {
				message: format!("{label} must be greater than zero."),
			});
		}
	}

	if guardrails.timeout_ms_max == 0 {
		return Err(Error::Validation {
			message: "rerank.guardrails.timeout_ms_max must be greater than zero.".to_string(),
		});
	}
	if guardrails.max_mis_candidates > guardrails.max_candidates {
		return Err(Error::Validation {
			message: "rerank.guardrails.max_mis_candidates must not exceed rerank.guardrails.max_candidates."
				.to_string(),
		});
	}
	if rerank.cache.enabled {
		if rerank.cache.ttl_ms == 0 {
			return Err(Error::Validation {
				message: "rerank.cache.ttl_ms must be greater than zero.".to_string(),
			});
		}
		if rerank.cache.max_entries == 0 {
			return Err(Error::Validation {
				message: "rerank.cache.max_entries must be greater than zero.".to_string(),
			});
		}
	}

	Ok(())
}

/// Strips trailing slashes from api bases and lowercases the rerank protocol.
pub fn normalize(cfg: &mut Config) {
	for api_base in [
		&mut cfg.providers.embedding.api_base,
		&mut cfg.providers.index.api_base,
		&mut cfg.providers.rerank.api_base,
		&mut cfg.providers.enrichment.api_base,
	] {
		let trimmed = api_base.trim().trim_end_matches('/');

		if trimmed.len() != api_base.len() {
			*api_base = trimmed.to_string();
		}
	}

	cfg.providers.rerank.protocol = cfg.providers.rerank.protocol.trim().to_ascii_lowercase();
}
