use fathom_domain::{Budget, Dependency};
use fathom_service::{Error, RetrievalOutcome, SourceStatus};

use super::{Calls, Harness, HarnessBuilder, Reply};

async fn retrieve(harness: &Harness, query: &str) -> RetrievalOutcome {
	harness
		.service
		.retrieve(query, &Budget::from_millis(2_000))
		.await
		.expect("Retrieval failed.")
}

fn ids(outcome: &RetrievalOutcome) -> Vec<&str> {
	outcome.candidates.iter().map(|candidate| candidate.doc_id.as_str()).collect()
}

#[tokio::test]
async fn fuses_lexical_and_vector_hits() {
	let harness = HarnessBuilder::new().build();
	let outcome = retrieve(&harness, "trench sonar").await;

	assert_eq!(ids(&outcome), vec!["d2", "d1", "d5", "d3"]);
	assert_eq!(outcome.lexical.hits, 3);
	assert_eq!(outcome.vector.status, SourceStatus::Ok);
	assert_eq!(outcome.vector.hits, 2);
	assert!(!outcome.fallback.eligible);

	let ranks: Vec<u32> =
		outcome.candidates.iter().map(|candidate| candidate.fused_rank).collect();

	assert_eq!(ranks, vec![1, 2, 3, 4]);
	assert_eq!(outcome.candidates[0].lex_rank, Some(2));
	assert_eq!(outcome.candidates[0].vec_rank, Some(1));
}

#[tokio::test]
async fn candidate_list_is_truncated_to_candidate_k() {
	let mut builder = HarnessBuilder::new();

	builder.cfg.retrieval.candidate_k = 2;

	let harness = builder.build();
	let outcome = retrieve(&harness, "trench sonar").await;

	assert_eq!(ids(&outcome), vec!["d2", "d1"]);
}

#[tokio::test]
async fn open_vector_breaker_serves_lexical_only() {
	let harness = HarnessBuilder::new().build();
	let breaker = harness.service.breakers().get(Dependency::VectorSearch);

	for _ in 0..3 {
		breaker.record_failure();
	}

	let outcome = retrieve(&harness, "trench sonar").await;

	assert_eq!(ids(&outcome), vec!["d1", "d2", "d3"]);
	assert_eq!(outcome.vector.status, SourceStatus::BreakerOpen);
	assert_eq!(Calls::count(&harness.calls.embedding), 0);
	assert_eq!(Calls::count(&harness.calls.vector), 0);
	assert_eq!(harness.service.metrics_snapshot().vector_skipped, 1);
}

#[tokio::test]
async fn embedding_outages_trip_the_embedding_breaker() {
	let mut builder = HarnessBuilder::new();

	builder.embedding_fail = true;

	let harness = builder.build();

	for _ in 0..3 {
		let outcome = retrieve(&harness, "trench sonar").await;

		assert_eq!(outcome.vector.status, SourceStatus::Failed);
		assert_eq!(ids(&outcome), vec!["d1", "d2", "d3"]);
	}

	let skipped = retrieve(&harness, "trench sonar").await;

	assert_eq!(skipped.vector.status, SourceStatus::BreakerOpen);
	assert_eq!(Calls::count(&harness.calls.embedding), 3);
	assert_eq!(Calls::count(&harness.calls.vector), 0);

	let snapshot = harness.service.metrics_snapshot();

	assert_eq!(snapshot.vector_failures, 3);
	assert_eq!(snapshot.vector_skipped, 1);
}

#[tokio::test]
async fn rejected_vector_queries_leave_the_breaker_closed() {
	let mut builder = HarnessBuilder::new();

	builder.index.vector = Reply::Rejected;

	let harness = builder.build();

	for _ in 0..4 {
		let outcome = retrieve(&harness, "trench sonar").await;

		assert_eq!(outcome.vector.status, SourceStatus::Rejected);
	}

	assert_eq!(Calls::count(&harness.calls.vector), 4);
	assert!(harness.service.breakers().get(Dependency::VectorSearch).allow_request());
}

#[tokio::test]
async fn lexical_outage_fails_the_request() {
	let mut builder = HarnessBuilder::new();

	builder.index.lexical = Reply::Unavailable;

	let harness = builder.build();
	let err = harness
		.service
		.retrieve("trench sonar", &Budget::from_millis(2_000))
		.await
		.expect_err("Expected lexical failure.");

	assert!(matches!(err, Error::BackendUnavailable { .. }), "Unexpected error: {err:?}");
}

#[tokio::test]
async fn unreadable_lexical_response_fails_as_unavailable() {
	let mut builder = HarnessBuilder::new();

	builder.index.lexical = Reply::Malformed;

	let harness = builder.build();
	let err = harness
		.service
		.retrieve("trench sonar", &Budget::from_millis(2_000))
		.await
		.expect_err("Expected lexical failure.");

	assert!(matches!(err, Error::BackendUnavailable { .. }), "Unexpected error: {err:?}");
}

#[tokio::test]
async fn lexical_rejection_is_an_invalid_request() {
	let mut builder = HarnessBuilder::new();

	builder.index.lexical = Reply::Rejected;

	let harness = builder.build();
	let err = harness
		.service
		.retrieve("trench sonar", &Budget::from_millis(2_000))
		.await
		.expect_err("Expected lexical rejection.");

	assert!(matches!(err, Error::InvalidRequest { .. }), "Unexpected error: {err:?}");
}

#[tokio::test]
async fn single_token_miss_prefers_author_fallback() {
	let mut builder = HarnessBuilder::new();

	builder.index.author = Reply::Hits(fathom_testkit::scored(&["d4"]));

	let harness = builder.build();
	let outcome = retrieve(&harness, "Tolkien").await;

	assert_eq!(Calls::count(&harness.calls.author), 1);
	assert!(outcome.fallback.eligible);
	assert!(outcome.fallback.attempted);
	assert!(outcome.fallback.used);
	assert_eq!(outcome.fallback.hits, 1);
	assert_eq!(ids(&outcome), vec!["d2", "d4", "d5"]);
	assert_eq!(harness.service.metrics_snapshot().fallback_queries, 1);
}

#[tokio::test]
async fn contained_query_skips_author_fallback() {
	let mut builder = HarnessBuilder::new();

	builder.index.author = Reply::Hits(fathom_testkit::scored(&["d4"]));

	let harness = builder.build();
	let outcome = retrieve(&harness, "mariana").await;

	assert_eq!(Calls::count(&harness.calls.author), 0);
	assert!(outcome.fallback.eligible);
	assert!(!outcome.fallback.attempted);
	assert_eq!(outcome.fallback.skipped, Some("query_matched_top_hits"));
	assert_eq!(ids(&outcome), vec!["d2", "d1", "d5", "d3"]);
}

#[tokio::test]
async fn multi_token_queries_never_fall_back() {
	let mut builder = HarnessBuilder::new();

	builder.index.author = Reply::Hits(fathom_testkit::scored(&["d4"]));

	let harness = builder.build();
	let outcome = retrieve(&harness, "tolkien hart").await;

	assert_eq!(Calls::count(&harness.calls.author), 0);
	assert_eq!(Calls::count(&harness.calls.sources), 0);
	assert!(!outcome.fallback.eligible);
}

#[tokio::test]
async fn failed_fallback_keeps_the_primary_result() {
	let mut builder = HarnessBuilder::new();

	builder.index.author = Reply::Unavailable;

	let harness = builder.build();
	let outcome = retrieve(&harness, "tolkien").await;

	assert!(outcome.fallback.attempted);
	assert!(!outcome.fallback.used);
	assert!(outcome.fallback.error.is_some());
	assert_eq!(ids(&outcome), vec!["d2", "d1", "d5", "d3"]);
	assert_eq!(harness.service.metrics_snapshot().fallback_failures, 1);
}

#[tokio::test]
async fn empty_fallback_keeps_the_primary_result() {
	let harness = HarnessBuilder::new().build();
	let outcome = retrieve(&harness, "tolkien").await;

	assert_eq!(Calls::count(&harness.calls.author), 1);
	assert!(outcome.fallback.attempted);
	assert!(!outcome.fallback.used);
	assert_eq!(ids(&outcome), vec!["d2", "d1", "d5", "d3"]);
}

#[tokio::test]
async fn unreadable_sources_skip_the_fallback() {
	let mut builder = HarnessBuilder::new();

	builder.index.sources_fail = true;
	builder.index.author = Reply::Hits(fathom_testkit::scored(&["d4"]));

	let harness = builder.build();
	let outcome = retrieve(&harness, "tolkien").await;

	assert_eq!(Calls::count(&harness.calls.author), 0);
	assert!(!outcome.fallback.attempted);
	assert!(outcome.fallback.error.is_some());
	assert_eq!(ids(&outcome), vec!["d2", "d1", "d5", "d3"]);
}

#[tokio::test]
async fn blank_query_is_rejected() {
	let harness = HarnessBuilder::new().build();
	let err = harness
		.service
		.retrieve("  ", &Budget::from_millis(2_000))
		.await
		.expect_err("Expected rejection.");

	assert!(matches!(err, Error::InvalidRequest { .. }));
	assert_eq!(Calls::count(&harness.calls.lexical), 0);
}
