pub mod metrics;
pub mod rerank;
pub mod retrieval;
pub mod search;
pub mod text;

mod error;

pub use error::{Error, Result};
pub use metrics::{DegradeCounts, Metrics, MetricsSnapshot};
pub use rerank::{
	HitDebug, PASSTHROUGH_MODEL, ReasonCode, RerankCandidate, RerankDebug, RerankHit,
	RerankOptions, RerankRequest, RerankResponse, StageDecision, StageOptions, StageState,
};
pub use retrieval::{FallbackReport, RetrievalOutcome, SourceReport, SourceStatus};
pub use search::{SearchDebug, SearchHit, SearchRequest, SearchResponse};

use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use reqwest::Client;

use fathom_config::{
	Config, EmbeddingProviderConfig, EnrichmentProviderConfig, IndexProviderConfig,
	RerankProviderConfig,
};
use fathom_domain::{BreakerRegistry, BreakerSnapshot};
use fathom_providers::{
	EnrichItem, EnrichedCandidate, ScorePair, ScoreResponse, ScoredDoc, ScorerProtocol, SourceDoc,
	embedding, enrichment, index, rerank as rerank_provider,
};
use rerank::RerankCache;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
		timeout: Duration,
	) -> BoxFuture<'a, fathom_providers::Result<Vec<Vec<f32>>>>;
}

pub trait IndexBackend
where
	Self: Send + Sync,
{
	fn search_lexical<'a>(
		&'a self,
		cfg: &'a IndexProviderConfig,
		query: &'a str,
		top_k: u32,
		timeout: Duration,
	) -> BoxFuture<'a, fathom_providers::Result<Vec<ScoredDoc>>>;

	fn search_vector<'a>(
		&'a self,
		cfg: &'a IndexProviderConfig,
		vector: &'a [f32],
		top_k: u32,
		timeout: Duration,
	) -> BoxFuture<'a, fathom_providers::Result<Vec<ScoredDoc>>>;

	fn fetch_sources<'a>(
		&'a self,
		cfg: &'a IndexProviderConfig,
		doc_ids: &'a [String],
		timeout: Duration,
	) -> BoxFuture<'a, fathom_providers::Result<Vec<SourceDoc>>>;

	fn search_author_fallback<'a>(
		&'a self,
		cfg: &'a IndexProviderConfig,
		query: &'a str,
		top_k: u32,
		timeout: Duration,
	) -> BoxFuture<'a, fathom_providers::Result<Vec<ScoredDoc>>>;
}

pub trait RemoteScorer
where
	Self: Send + Sync,
{
	fn score<'a>(
		&'a self,
		cfg: &'a RerankProviderConfig,
		query: &'a str,
		pairs: &'a [ScorePair],
		timeout: Duration,
		model_override: Option<&'a str>,
	) -> BoxFuture<'a, fathom_providers::Result<ScoreResponse>>;
}

pub trait FeatureEnricher
where
	Self: Send + Sync,
{
	fn enrich<'a>(
		&'a self,
		cfg: &'a EnrichmentProviderConfig,
		query: &'a str,
		items: &'a [EnrichItem],
		timeout: Duration,
	) -> BoxFuture<'a, fathom_providers::Result<Vec<EnrichedCandidate>>>;
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
	pub index: Arc<dyn IndexBackend>,
	pub scorer: Arc<dyn RemoteScorer>,
	pub enricher: Arc<dyn FeatureEnricher>,
}
impl Providers {
	pub fn new(
		embedding: Arc<dyn EmbeddingProvider>,
		index: Arc<dyn IndexBackend>,
		scorer: Arc<dyn RemoteScorer>,
		enricher: Arc<dyn FeatureEnricher>,
	) -> Self {
		Self { embedding, index, scorer, enricher }
	}

	/// HTTP providers sharing one connection pool.
	pub fn from_config(cfg: &Config) -> fathom_providers::Result<Self> {
		let provider = Arc::new(DefaultProviders {
			client: Client::builder().build()?,
			protocol: ScorerProtocol::from_config(&cfg.providers.rerank)?,
		});

		Ok(Self {
			embedding: provider.clone(),
			index: provider.clone(),
			scorer: provider.clone(),
			enricher: provider,
		})
	}
}

pub struct FathomService {
	pub cfg: Config,
	pub providers: Providers,
	breakers: BreakerRegistry,
	cache: RerankCache,
	metrics: Metrics,
}
impl FathomService {
	pub fn new(cfg: Config) -> Result<Self> {
		let providers = Providers::from_config(&cfg)?;

		Ok(Self::with_providers(cfg, providers))
	}

	pub fn with_providers(cfg: Config, providers: Providers) -> Self {
		let breakers = BreakerRegistry::from_config(&cfg.resilience);
		let cache = RerankCache::from_config(&cfg.rerank.cache);

		Self { cfg, providers, breakers, cache, metrics: Metrics::default() }
	}

	pub fn breakers(&self) -> &BreakerRegistry {
		&self.breakers
	}

	pub fn breaker_snapshots(&self) -> Vec<BreakerSnapshot> {
		self.breakers.snapshots()
	}

	pub fn metrics_snapshot(&self) -> MetricsSnapshot {
		self.metrics.snapshot(self.cache.stats())
	}
}

struct DefaultProviders {
	client: Client,
	protocol: ScorerProtocol,
}

impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
		timeout: Duration,
	) -> BoxFuture<'a, fathom_providers::Result<Vec<Vec<f32>>>> {
		Box::pin(embedding::embed(&self.client, cfg, texts, timeout))
	}
}

impl IndexBackend for DefaultProviders {
	fn search_lexical<'a>(
		&'a self,
		cfg: &'a IndexProviderConfig,
		query: &'a str,
		top_k: u32,
		timeout: Duration,
	) -> BoxFuture<'a, fathom_providers::Result<Vec<ScoredDoc>>> {
		Box::pin(index::search_lexical(&self.client, cfg, query, top_k, timeout))
	}

	fn search_vector<'a>(
		&'a self,
		cfg: &'a IndexProviderConfig,
		vector: &'a [f32],
		top_k: u32,
		timeout: Duration,
	) -> BoxFuture<'a, fathom_providers::Result<Vec<ScoredDoc>>> {
		Box::pin(index::search_vector(&self.client, cfg, vector, top_k, timeout))
	}

	fn fetch_sources<'a>(
		&'a self,
		cfg: &'a IndexProviderConfig,
		doc_ids: &'a [String],
		timeout: Duration,
	) -> BoxFuture<'a, fathom_providers::Result<Vec<SourceDoc>>> {
		Box::pin(index::fetch_sources(&self.client, cfg, doc_ids, timeout))
	}

	fn search_author_fallback<'a>(
		&'a self,
		cfg: &'a IndexProviderConfig,
		query: &'a str,
		top_k: u32,
		timeout: Duration,
	) -> BoxFuture<'a, fathom_providers::Result<Vec<ScoredDoc>>> {
		Box::pin(index::search_author_fallback(&self.client, cfg, query, top_k, timeout))
	}
}

impl RemoteScorer for DefaultProviders {
	fn score<'a>(
		&'a self,
		cfg: &'a RerankProviderConfig,
		query: &'a str,
		pairs: &'a [ScorePair],
		timeout: Duration,
		model_override: Option<&'a str>,
	) -> BoxFuture<'a, fathom_providers::Result<ScoreResponse>> {
		Box::pin(rerank_provider::score(
			&self.client,
			cfg,
			self.protocol,
			query,
			pairs,
			timeout,
			model_override,
		))
	}
}

impl FeatureEnricher for DefaultProviders {
	fn enrich<'a>(
		&'a self,
		cfg: &'a EnrichmentProviderConfig,
		query: &'a str,
		items: &'a [EnrichItem],
		timeout: Duration,
	) -> BoxFuture<'a, fathom_providers::Result<Vec<EnrichedCandidate>>> {
		Box::pin(enrichment::enrich(&self.client, cfg, query, items, timeout))
	}
}

/// Runs `call` under `timeout`, mapping an elapsed deadline to a transient failure.
pub(crate) async fn within<T, F>(timeout: Duration, call: F) -> fathom_providers::Result<T>
where
	F: Future<Output = fathom_providers::Result<T>>,
{
	if timeout.is_zero() {
		return Err(fathom_providers::Error::Unavailable {
			message: "Request budget exhausted.".to_string(),
		});
	}

	match tokio::time::timeout(timeout, call).await {
		Ok(result) => result,
		Err(_) => Err(fathom_providers::Error::Unavailable {
			message: format!("Timed out after {}ms.", timeout.as_millis()),
		}),
	}
}
