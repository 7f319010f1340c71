use fathom_service::{Error, RerankOptions, SearchRequest, SearchResponse, SourceStatus};

use super::{Calls, HarnessBuilder, Reply};

fn request(query: &str) -> SearchRequest {
	SearchRequest {
		query: query.to_string(),
		budget_ms: None,
		options: RerankOptions {
			debug: true,
			now: Some(fathom_testkit::fixed_now()),
			..RerankOptions::default()
		},
	}
}

fn ids(response: &SearchResponse) -> Vec<&str> {
	response.hits.iter().map(|hit| hit.doc_id.as_str()).collect()
}

#[tokio::test]
async fn search_runs_the_full_pipeline() {
	let harness = HarnessBuilder::new().build();
	let response = harness.service.search(request("trench sonar")).await.expect("Search failed.");

	assert_eq!(response.model, "scorer-test");
	// Fused order is d2, d1, d5, d3; reverse scoring flips it.
	assert_eq!(ids(&response), vec!["d3", "d5", "d1", "d2"]);
	assert_eq!(response.hits[0].title.as_deref(), Some("Abyssal Plains: A Survey"));
	assert_eq!(Calls::count(&harness.calls.enricher), 1);

	let pairs = harness.scorer.last_pairs.lock().expect("Scorer pairs lock poisoned.").clone();

	assert_eq!(pairs.len(), 4);
	assert!(pairs[0].text.starts_with("Hydrothermal Vents Field Guide\n\n"));
	assert!(pairs.iter().all(|pair| pair.features.contains_key("inverse_rank")));

	let debug = response.debug.expect("Expected debug.");

	assert_eq!(debug.budget_ms, 2_000);
	assert_eq!(debug.sources_fetched, 4);
	assert_eq!(debug.enriched, 4);
	assert_eq!(debug.retrieval.vector.status, SourceStatus::Ok);
	assert!(debug.rerank.is_some());

	let hit_debug = response.hits[0].debug.as_ref().expect("Expected hit debug.");

	assert_eq!(hit_debug.fused_rank, 4);
	assert!(hit_debug.stage2_score.is_some());
	assert!(hit_debug.raw_features.contains_key("fused_rank"));
}

#[tokio::test]
async fn budget_is_clamped_to_the_configured_maximum() {
	let harness = HarnessBuilder::new().build();
	let mut req = request("trench sonar");

	req.budget_ms = Some(60_000);

	let response = harness.service.search(req).await.expect("Search failed.");

	assert_eq!(response.debug.expect("Expected debug.").budget_ms, 5_000);
}

#[tokio::test]
async fn zero_budget_is_rejected() {
	let harness = HarnessBuilder::new().build();
	let mut req = request("trench sonar");

	req.budget_ms = Some(0);

	let err = harness.service.search(req).await.expect_err("Expected rejection.");

	assert!(matches!(err, Error::InvalidRequest { .. }));
	assert_eq!(Calls::count(&harness.calls.lexical), 0);
}

#[tokio::test]
async fn source_outage_reranks_on_doc_ids() {
	let mut builder = HarnessBuilder::new();

	builder.index.sources_fail = true;

	let harness = builder.build();
	let response = harness.service.search(request("trench sonar")).await.expect("Search failed.");

	assert_eq!(response.hits.len(), 4);
	assert!(response.hits.iter().all(|hit| hit.title.is_none()));

	let pairs = harness.scorer.last_pair_ids();
	let texts: Vec<String> = harness
		.scorer
		.last_pairs
		.lock()
		.expect("Scorer pairs lock poisoned.")
		.iter()
		.map(|pair| pair.text.clone())
		.collect();

	assert_eq!(pairs, texts);
	assert_eq!(harness.service.metrics_snapshot().source_fetch_failures, 1);
}

#[tokio::test]
async fn enrichment_outage_reranks_without_features() {
	let mut builder = HarnessBuilder::new();

	builder.enricher_fail = true;

	let harness = builder.build();
	let response = harness.service.search(request("trench sonar")).await.expect("Search failed.");

	assert_eq!(response.model, "scorer-test");
	assert_eq!(response.debug.expect("Expected debug.").enriched, 0);

	let pairs = harness.scorer.last_pairs.lock().expect("Scorer pairs lock poisoned.").clone();

	assert!(pairs.iter().all(|pair| pair.features.is_empty()));
	assert_eq!(harness.service.metrics_snapshot().enrichment_failures, 1);
}

#[tokio::test]
async fn disabled_enrichment_is_never_called() {
	let mut builder = HarnessBuilder::new();

	builder.cfg.providers.enrichment.enabled = false;

	let harness = builder.build();

	harness.service.search(request("trench sonar")).await.expect("Search failed.");

	assert_eq!(Calls::count(&harness.calls.enricher), 0);
}

#[tokio::test]
async fn empty_retrieval_returns_no_hits() {
	let mut builder = HarnessBuilder::new();

	builder.index.lexical = Reply::Hits(Vec::new());
	builder.index.vector = Reply::Hits(Vec::new());

	let harness = builder.build();
	let response = harness.service.search(request("trench sonar")).await.expect("Search failed.");

	assert!(response.hits.is_empty());
	assert_eq!(response.model, fathom_service::PASSTHROUGH_MODEL);
	assert_eq!(Calls::count(&harness.calls.scorer), 0);
	assert_eq!(Calls::count(&harness.calls.sources), 0);
}

#[tokio::test]
async fn author_fallback_surfaces_in_search_results() {
	let mut builder = HarnessBuilder::new();

	builder.index.author = Reply::Hits(fathom_testkit::scored(&["d4"]));

	let harness = builder.build();
	let response = harness.service.search(request("tolkien")).await.expect("Search failed.");

	assert!(ids(&response).contains(&"d4"));
	assert!(!ids(&response).contains(&"d1"));
	assert!(response.debug.expect("Expected debug.").retrieval.fallback.used);
}

#[tokio::test]
async fn lexical_outage_surfaces_as_backend_unavailable() {
	let mut builder = HarnessBuilder::new();

	builder.index.lexical = Reply::Unavailable;

	let harness = builder.build();
	let err = harness.service.search(request("trench sonar")).await.expect_err("Expected failure.");

	assert!(matches!(err, Error::BackendUnavailable { .. }));
	assert_eq!(Calls::count(&harness.calls.scorer), 0);
}

#[tokio::test]
async fn metrics_count_one_scored_search() {
	let harness = HarnessBuilder::new().build();

	harness.service.search(request("trench sonar")).await.expect("Search failed.");

	let snapshot = harness.service.metrics_snapshot();

	assert_eq!(snapshot.rerank_requests, 1);
	assert_eq!(snapshot.stage2_calls, 1);
	assert_eq!(snapshot.stage2_failures, 0);
	assert_eq!(snapshot.cache.stores, 1);
	assert_eq!(snapshot.degrades.timeout_degrade_to_stage1, 0);
}
