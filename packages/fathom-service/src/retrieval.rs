use serde::Serialize;

use crate::{Error, FathomService, Result, text, within};
use fathom_config::Retrieval;
use fathom_domain::{
	Budget, Candidate, Dependency, FusionWeights,
	fusion::{self, SourceRanks},
};
use fathom_providers::{ScoredDoc, SourceDoc};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
	Ok,
	BreakerOpen,
	/// Transport error, timeout, 5xx, or an unreadable response.
	Failed,
	/// The backend rejected the request (4xx).
	Rejected,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SourceReport {
	pub status: SourceStatus,
	pub hits: usize,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}
impl SourceReport {
	fn ok(hits: usize) -> Self {
		Self { status: SourceStatus::Ok, hits, error: None }
	}

	fn failed(err: &fathom_providers::Error) -> Self {
		let status = if matches!(err, fathom_providers::Error::Request { .. }) {
			SourceStatus::Rejected
		} else {
			SourceStatus::Failed
		};

		Self { status, hits: 0, error: Some(err.to_string()) }
	}
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FallbackReport {
	/// Fallback is enabled and the query is a single token.
	pub eligible: bool,
	pub attempted: bool,
	/// Fallback hits replaced the lexical list.
	pub used: bool,
	pub hits: usize,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub skipped: Option<&'static str>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct RetrievalOutcome {
	pub candidates: Vec<Candidate>,
	pub lexical: SourceReport,
	pub vector: SourceReport,
	pub fallback: FallbackReport,
}

impl FathomService {
	/// Lexical and vector retrieval in parallel, fused and truncated to `candidate_k`.
	pub async fn retrieve(&self, query: &str, budget: &Budget) -> Result<RetrievalOutcome> {
		let query = query.trim();

		if query.is_empty() {
			return Err(Error::InvalidRequest { message: "query must be non-empty.".to_string() });
		}

		let retrieval = &self.cfg.retrieval;
		let index_cfg = &self.cfg.providers.index;
		let lexical_timeout = budget.clamp_ms(index_cfg.timeout_ms);
		let lexical = within(
			lexical_timeout,
			self.providers.index.search_lexical(
				index_cfg,
				query,
				retrieval.lexical_top_k,
				lexical_timeout,
			),
		);
		let (lexical, (vector_hits, vector_report)) =
			tokio::join!(lexical, self.vector_hits(query, budget));
		let lexical_hits = match lexical {
			Ok(hits) => hits,
			Err(err) => {
				tracing::warn!(
					error = %err,
					error_kind = err.kind(),
					timeout_ms = lexical_timeout.as_millis() as u64,
					"Lexical retrieval failed."
				);

				// Only a 4xx is the caller's fault; anything else leaves lexical unusable.
				return Err(match err {
					fathom_providers::Error::Request { .. } => err.into(),
					other => Error::BackendUnavailable { message: other.to_string() },
				});
			},
		};
		let lexical_report = SourceReport::ok(lexical_hits.len());
		let vector_ranks = source_ranks(&vector_hits);
		let mut candidates = fuse_hits(&source_ranks(&lexical_hits), &vector_ranks, retrieval);
		let mut fallback = FallbackReport::default();

		if retrieval.fallback.enabled && text::is_single_token(query) {
			fallback.eligible = true;

			let fallback_hits =
				self.author_fallback(query, &candidates, budget, &mut fallback).await;

			if let Some(hits) = fallback_hits {
				candidates = fuse_hits(&source_ranks(&hits), &vector_ranks, retrieval);
			}
		}

		tracing::info!(
			lexical_hits = lexical_report.hits,
			vector_hits = vector_report.hits,
			vector_status = ?vector_report.status,
			fallback_used = fallback.used,
			candidates = candidates.len(),
			"Retrieval completed."
		);

		Ok(RetrievalOutcome {
			candidates,
			lexical: lexical_report,
			vector: vector_report,
			fallback,
		})
	}

	async fn vector_hits(&self, query: &str, budget: &Budget) -> (Vec<ScoredDoc>, SourceReport) {
		let embedding_breaker = self.breakers.get(Dependency::Embedding);
		let vector_breaker = self.breakers.get(Dependency::VectorSearch);

		let embedding_allowed = embedding_breaker.allow_request();

		if !embedding_allowed || !vector_breaker.allow_request() {
			self.metrics.record_vector_skipped();

			tracing::warn!(
				reason_code = "breaker_open",
				embedding_open = !embedding_allowed,
				"Vector retrieval skipped; serving lexical-only."
			);

			return (
				Vec::new(),
				SourceReport { status: SourceStatus::BreakerOpen, hits: 0, error: None },
			);
		}

		let embedding_cfg = &self.cfg.providers.embedding;
		let texts = vec![query.to_string()];
		let timeout = budget.clamp_ms(embedding_cfg.timeout_ms);
		let vector =
			match within(timeout, self.providers.embedding.embed(embedding_cfg, &texts, timeout))
				.await
			{
				Ok(vectors) => match vectors.into_iter().next() {
					Some(vector) if !vector.is_empty() => {
						embedding_breaker.record_success();

						vector
					},
					_ => {
						let err = fathom_providers::Error::InvalidResponse {
							message: "Embedding provider returned no vector.".to_string(),
						};

						return self.vector_failure(Dependency::Embedding, &err);
					},
				},
				Err(err) => return self.vector_failure(Dependency::Embedding, &err),
			};
		let index_cfg = &self.cfg.providers.index;
		let timeout = budget.clamp_ms(index_cfg.timeout_ms);
		let top_k = self.cfg.retrieval.vector_top_k;

		let search = self.providers.index.search_vector(index_cfg, &vector, top_k, timeout);

		match within(timeout, search).await {
			Ok(hits) => {
				vector_breaker.record_success();

				let report = SourceReport::ok(hits.len());

				(hits, report)
			},
			Err(err) => self.vector_failure(Dependency::VectorSearch, &err),
		}
	}

	fn vector_failure(
		&self,
		dependency: Dependency,
		err: &fathom_providers::Error,
	) -> (Vec<ScoredDoc>, SourceReport) {
		self.metrics.record_vector_failure();

		// 4xx and malformed responses say nothing about availability.
		let tripped = err.is_transient() && self.breakers.get(dependency).record_failure();

		tracing::warn!(
			dependency = dependency.as_str(),
			error = %err,
			error_kind = err.kind(),
			breaker_tripped = tripped,
			"Vector retrieval failed; serving lexical-only."
		);

		(Vec::new(), SourceReport::failed(err))
	}

	/// Returns author-field hits when none of the top fused documents mention the query.
	async fn author_fallback(
		&self,
		query: &str,
		candidates: &[Candidate],
		budget: &Budget,
		report: &mut FallbackReport,
	) -> Option<Vec<ScoredDoc>> {
		let needle = text::query_tokens(query).into_iter().next()?;
		let index_cfg = &self.cfg.providers.index;
		let fallback_cfg = &self.cfg.retrieval.fallback;
		let top_ids: Vec<String> = candidates
			.iter()
			.take(fallback_cfg.check_top_n as usize)
			.map(|candidate| candidate.doc_id.clone())
			.collect();

		if !top_ids.is_empty() {
			let timeout = budget.clamp_ms(index_cfg.timeout_ms);

			match within(timeout, self.providers.index.fetch_sources(index_cfg, &top_ids, timeout))
				.await
			{
				Ok(docs) =>
					if docs.iter().any(|doc| source_mentions(doc, &needle)) {
						report.skipped = Some("query_matched_top_hits");

						return None;
					},
				Err(err) => {
					self.metrics.record_fallback_failure();

					tracing::warn!(
						error = %err,
						error_kind = err.kind(),
						"Fallback containment check failed; keeping primary result."
					);

					report.error = Some(err.to_string());

					return None;
				},
			}
		}

		report.attempted = true;

		self.metrics.record_fallback_query();

		let timeout = budget.clamp_ms(index_cfg.timeout_ms);

		match within(
			timeout,
			self.providers.index.search_author_fallback(
				index_cfg,
				query,
				fallback_cfg.top_k,
				timeout,
			),
		)
		.await
		{
			Ok(hits) if hits.is_empty() => {
				tracing::info!("Author fallback returned no hits; keeping primary result.");

				None
			},
			Ok(hits) => {
				report.used = true;
				report.hits = hits.len();

				tracing::info!(hits = hits.len(), "Author fallback replaced lexical results.");

				Some(hits)
			},
			Err(err) => {
				self.metrics.record_fallback_failure();

				tracing::warn!(
					error = %err,
					error_kind = err.kind(),
					"Author fallback failed; keeping primary result."
				);

				report.error = Some(err.to_string());

				None
			},
		}
	}
}

fn source_ranks(hits: &[ScoredDoc]) -> SourceRanks {
	SourceRanks::from_ordered(hits.iter().map(|hit| (hit.doc_id.as_str(), hit.score)))
}

fn fuse_hits(lexical: &SourceRanks, vector: &SourceRanks, cfg: &Retrieval) -> Vec<Candidate> {
	let mut candidates =
		fusion::fuse(lexical, vector, cfg.fusion.k, FusionWeights::from_config(&cfg.fusion));

	candidates.truncate(cfg.candidate_k as usize);

	candidates
}

fn source_mentions(doc: &SourceDoc, needle: &str) -> bool {
	doc.title.as_deref().is_some_and(|title| text::contains_normalized(title, needle))
		|| doc.authors.iter().any(|author| text::contains_normalized(author, needle))
}
