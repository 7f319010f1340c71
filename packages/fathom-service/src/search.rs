use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
	Error, FathomService, Result, within,
	rerank::{
		HitDebug, PASSTHROUGH_MODEL, RerankCandidate, RerankDebug, RerankOptions, RerankRequest,
	},
	retrieval::RetrievalOutcome,
};
use fathom_domain::{Budget, Candidate};
use fathom_providers::{EnrichItem, EnrichedCandidate, SourceDoc};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
	pub query: String,
	/// Clamped to `budget.max_ms`. Defaults to `budget.default_ms`.
	#[serde(default)]
	pub budget_ms: Option<u64>,
	#[serde(default)]
	pub options: RerankOptions,
}

#[derive(Clone, Debug, Serialize)]
pub struct SearchResponse {
	pub trace_id: Uuid,
	pub model: String,
	pub hits: Vec<SearchHit>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub debug: Option<SearchDebug>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SearchHit {
	pub doc_id: String,
	pub score: f32,
	pub rank: u32,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub title: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub debug: Option<HitDebug>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SearchDebug {
	pub budget_ms: u64,
	pub retrieval: RetrievalOutcome,
	pub sources_fetched: usize,
	pub enriched: usize,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub rerank: Option<RerankDebug>,
}

impl FathomService {
	/// Retrieve, fuse, hydrate, enrich, then rerank under one request budget.
	pub async fn search(&self, req: SearchRequest) -> Result<SearchResponse> {
		let SearchRequest { query, budget_ms, options } = req;

		if query.trim().is_empty() {
			return Err(Error::InvalidRequest { message: "query must be non-empty.".to_string() });
		}
		if budget_ms == Some(0) {
			return Err(Error::InvalidRequest {
				message: "budget_ms must be greater than zero.".to_string(),
			});
		}

		let budget_ms = budget_ms
			.map(|ms| ms.min(self.cfg.budget.max_ms))
			.unwrap_or(self.cfg.budget.default_ms);
		let budget = Budget::from_millis(budget_ms);
		let outcome = self.retrieve(&query, &budget).await?;

		if outcome.candidates.is_empty() {
			return Ok(SearchResponse {
				trace_id: Uuid::new_v4(),
				model: PASSTHROUGH_MODEL.to_string(),
				hits: Vec::new(),
				debug: options.debug.then(|| SearchDebug {
					budget_ms,
					retrieval: outcome,
					sources_fetched: 0,
					enriched: 0,
					rerank: None,
				}),
			});
		}

		let doc_ids: Vec<String> =
			outcome.candidates.iter().map(|candidate| candidate.doc_id.clone()).collect();
		let mut sources = self.hydrate_sources(&doc_ids, &budget).await;
		let mut features =
			self.enrich_candidates(&query, &outcome.candidates, &sources, &budget).await;
		let sources_fetched = sources.len();
		let enriched = features.len();
		let candidates: Vec<RerankCandidate> = outcome
			.candidates
			.iter()
			.map(|candidate| {
				build_rerank_candidate(
					candidate,
					sources.get(&candidate.doc_id).cloned(),
					features.remove(&candidate.doc_id),
				)
			})
			.collect();
		let debug = options.debug;
		let reranked = self
			.rerank_with_budget(RerankRequest { query, candidates, options }, &budget)
			.await?;
		let hits = reranked
			.hits
			.into_iter()
			.map(|hit| SearchHit {
				title: sources.remove(&hit.doc_id).and_then(|doc| doc.title),
				doc_id: hit.doc_id,
				score: hit.score,
				rank: hit.rank,
				debug: hit.debug,
			})
			.collect();

		Ok(SearchResponse {
			trace_id: reranked.trace_id,
			model: reranked.model,
			hits,
			debug: debug.then(|| SearchDebug {
				budget_ms,
				retrieval: outcome,
				sources_fetched,
				enriched,
				rerank: reranked.debug,
			}),
		})
	}

	/// Missing sources leave candidates with their doc id only.
	async fn hydrate_sources(
		&self,
		doc_ids: &[String],
		budget: &Budget,
	) -> HashMap<String, SourceDoc> {
		let index_cfg = &self.cfg.providers.index;
		let timeout = budget.clamp_ms(index_cfg.timeout_ms);

		match within(timeout, self.providers.index.fetch_sources(index_cfg, doc_ids, timeout)).await
		{
			Ok(docs) => docs.into_iter().map(|doc| (doc.doc_id.clone(), doc)).collect(),
			Err(err) => {
				self.metrics.record_source_fetch_failure();

				tracing::warn!(
					error = %err,
					error_kind = err.kind(),
					candidates = doc_ids.len(),
					"Source fetch failed; reranking on doc ids only."
				);

				HashMap::new()
			},
		}
	}

	async fn enrich_candidates(
		&self,
		query: &str,
		candidates: &[Candidate],
		sources: &HashMap<String, SourceDoc>,
		budget: &Budget,
	) -> HashMap<String, EnrichedCandidate> {
		let enrichment_cfg = &self.cfg.providers.enrichment;

		if !enrichment_cfg.enabled {
			return HashMap::new();
		}

		let items: Vec<EnrichItem> = candidates
			.iter()
			.map(|candidate| {
				let source = sources.get(&candidate.doc_id);

				EnrichItem {
					doc_id: candidate.doc_id.clone(),
					fused_rank: candidate.fused_rank,
					fused_score: candidate.fused_score,
					title: source.and_then(|doc| doc.title.clone()),
					text: source.and_then(|doc| doc.text.clone()),
				}
			})
			.collect();
		let timeout = budget.clamp_ms(enrichment_cfg.timeout_ms);

		match within(
			timeout,
			self.providers.enricher.enrich(enrichment_cfg, query, &items, timeout),
		)
		.await
		{
			Ok(enriched) => enriched.into_iter().map(|item| (item.doc_id.clone(), item)).collect(),
			Err(err) => {
				self.metrics.record_enrichment_failure();

				tracing::warn!(
					error = %err,
					error_kind = err.kind(),
					"Feature enrichment failed; reranking without features."
				);

				HashMap::new()
			},
		}
	}
}

fn build_rerank_candidate(
	candidate: &Candidate,
	source: Option<SourceDoc>,
	features: Option<EnrichedCandidate>,
) -> RerankCandidate {
	let mut out =
		RerankCandidate::new(candidate.doc_id.clone(), candidate.fused_rank, candidate.fused_score);

	if let Some(source) = source {
		out.title = source.title;
		out.authors = source.authors;
		out.text = source.text;
		out.published_at = source.published_at;
	}
	if let Some(features) = features {
		out.raw_features = features.raw_features;
		out.transformed_features = features.transformed_features;
	}

	out
}
