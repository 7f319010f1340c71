use fathom_domain::Dependency;
use fathom_service::{ReasonCode, RerankOptions, RerankRequest};

use super::{Calls, HarnessBuilder, candidates};

fn request(query: &str) -> RerankRequest {
	RerankRequest {
		query: query.to_string(),
		candidates: candidates(6),
		options: RerankOptions {
			debug: true,
			now: Some(fathom_testkit::fixed_now()),
			..RerankOptions::default()
		},
	}
}

#[tokio::test]
async fn identical_requests_call_the_scorer_once() {
	let harness = HarnessBuilder::new().build();
	let first =
		harness.service.rerank(request("trench sonar")).await.expect("First rerank failed.");
	let second =
		harness.service.rerank(request("trench sonar")).await.expect("Second rerank failed.");

	assert_eq!(Calls::count(&harness.calls.scorer), 1);
	assert_eq!(first.model, "scorer-test");
	assert_eq!(first.model, second.model);

	let first_scores: Vec<(String, f32)> =
		first.hits.iter().map(|hit| (hit.doc_id.clone(), hit.score)).collect();
	let second_scores: Vec<(String, f32)> =
		second.hits.iter().map(|hit| (hit.doc_id.clone(), hit.score)).collect();

	assert_eq!(first_scores, second_scores);

	let first_debug = first.debug.expect("Expected debug on first response.");
	let second_debug = second.debug.expect("Expected debug on second response.");

	assert_eq!(first_debug.stage_details.stage2.reason_code, ReasonCode::ModelScored);
	assert!(!first_debug.stage_details.cache.hit);
	assert_eq!(second_debug.stage_details.stage2.reason_code, ReasonCode::CacheHit);
	assert!(second_debug.stage_details.cache.hit);
	assert_eq!(
		first_debug.stage_details.cache.key_prefix,
		second_debug.stage_details.cache.key_prefix
	);
}

#[tokio::test]
async fn query_normalization_shares_a_cache_entry() {
	let harness = HarnessBuilder::new().build();

	harness.service.rerank(request("Trench  Sonar")).await.expect("First rerank failed.");
	harness.service.rerank(request("  trench sonar ")).await.expect("Second rerank failed.");

	assert_eq!(Calls::count(&harness.calls.scorer), 1);
}

#[tokio::test]
async fn different_candidate_sets_miss_the_cache() {
	let harness = HarnessBuilder::new().build();
	let mut narrower = request("trench sonar");

	narrower.candidates.truncate(4);

	harness.service.rerank(request("trench sonar")).await.expect("First rerank failed.");
	harness.service.rerank(narrower).await.expect("Second rerank failed.");

	assert_eq!(Calls::count(&harness.calls.scorer), 2);
}

#[tokio::test]
async fn cached_scores_are_served_while_the_breaker_is_open() {
	let harness = HarnessBuilder::new().build();

	harness.service.rerank(request("trench sonar")).await.expect("First rerank failed.");

	let breaker = harness.service.breakers().get(Dependency::Rerank);

	for _ in 0..3 {
		breaker.record_failure();
	}

	let cached = harness.service.rerank(request("trench sonar")).await.expect("Rerank failed.");
	let fresh = harness.service.rerank(request("abyssal plains")).await.expect("Rerank failed.");

	assert_eq!(Calls::count(&harness.calls.scorer), 1);
	assert_eq!(cached.model, "scorer-test");
	assert_eq!(fresh.model, "stage1-heuristic-v1");
	assert_eq!(
		fresh.debug.expect("Expected debug.").stage_details.stage2.reason_code,
		ReasonCode::BreakerOpen
	);
}

#[tokio::test]
async fn failed_calls_are_not_cached() {
	let mut builder = HarnessBuilder::new();

	builder.scorer = super::ScorerBehavior::Fail;

	let harness = builder.build();

	harness.service.rerank(request("trench sonar")).await.expect("First rerank failed.");
	harness.scorer.set_behavior(super::ScorerBehavior::Reverse);

	let recovered = harness.service.rerank(request("trench sonar")).await.expect("Rerank failed.");

	assert_eq!(Calls::count(&harness.calls.scorer), 2);
	assert_eq!(recovered.model, "scorer-test");

	let stats = harness.service.metrics_snapshot().cache;

	assert_eq!(stats.stores, 1);
	assert_eq!(stats.entries, 1);
}
