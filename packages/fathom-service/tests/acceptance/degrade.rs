use std::time::{Duration, Instant};

use fathom_domain::{Budget, Dependency};
use fathom_service::{
	PASSTHROUGH_MODEL, ReasonCode, RerankOptions, RerankRequest, RerankResponse, StageOptions,
	StageState,
};

use super::{Calls, HarnessBuilder, ScorerBehavior, candidates};

const STAGE1_MODEL: &str = "stage1-heuristic-v1";

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

fn reason(response: &RerankResponse) -> ReasonCode {
	response.debug.as_ref().expect("Expected debug.").stage_details.stage2.reason_code
}

fn ids(response: &RerankResponse) -> Vec<&str> {
	response.hits.iter().map(|hit| hit.doc_id.as_str()).collect()
}

#[tokio::test]
async fn scorer_outage_degrades_to_stage1() {
	let mut builder = HarnessBuilder::new();

	builder.scorer = ScorerBehavior::Fail;

	let harness = builder.build();
	let response = harness.service.rerank(request("trench sonar")).await.expect("Rerank failed.");

	assert_eq!(response.model, STAGE1_MODEL);
	assert_eq!(reason(&response), ReasonCode::TimeoutDegradeToStage1);
	assert_eq!(response.hits.len(), 5);
	assert!(response.hits.iter().all(|hit| hit.debug.is_some()));

	let debug = response.debug.expect("Expected debug.");

	assert!(debug.stage_details.stage1.applied);
	assert!(debug.stage_details.stage2.error.is_some());
	assert_eq!(
		debug.stage_details.path,
		vec![
			StageState::GuardrailCheck,
			StageState::CacheLookup,
			StageState::Stage2Attempt,
			StageState::Stage1Degrade,
			StageState::Done,
		]
	);
}

#[tokio::test]
async fn slow_scorer_is_cut_off_at_the_guardrail_timeout() {
	let mut builder = HarnessBuilder::new();

	builder.scorer = ScorerBehavior::Sleep(Duration::from_secs(2));

	let harness = builder.build();
	let started = Instant::now();
	let response = harness.service.rerank(request("trench sonar")).await.expect("Rerank failed.");

	assert!(started.elapsed() < Duration::from_secs(1));
	assert_eq!(response.model, STAGE1_MODEL);
	assert_eq!(reason(&response), ReasonCode::TimeoutDegradeToStage1);
	assert_eq!(
		response.debug.expect("Expected debug.").stage_details.stage2.timeout_ms,
		200
	);
}

#[tokio::test]
async fn provider_timeout_caps_the_stage2_call() {
	let mut builder = HarnessBuilder::new();

	builder.cfg.providers.rerank.timeout_ms = 50;
	builder.scorer = ScorerBehavior::Sleep(Duration::from_secs(2));

	let harness = builder.build();
	let mut req = request("trench sonar");

	req.options.timeout_ms = Some(150);

	let started = Instant::now();
	let response = harness.service.rerank(req).await.expect("Rerank failed.");

	assert!(started.elapsed() < Duration::from_secs(1));
	assert_eq!(reason(&response), ReasonCode::TimeoutDegradeToStage1);

	let debug = response.debug.expect("Expected debug.");

	assert_eq!(debug.stage_details.stage2.timeout_ms, 50);
	assert_eq!(debug.stage_details.guardrails.timeout_ms, 150);
}

#[tokio::test]
async fn malformed_scores_degrade_and_feed_the_breaker() {
	let mut builder = HarnessBuilder::new();

	builder.scorer = ScorerBehavior::Mismatch;

	let harness = builder.build();

	for query in ["trench sonar", "abyssal plains", "vent fauna"] {
		let response = harness.service.rerank(request(query)).await.expect("Rerank failed.");

		assert_eq!(reason(&response), ReasonCode::TimeoutDegradeToStage1);
	}

	let blocked = harness.service.rerank(request("deep acoustics")).await.expect("Rerank failed.");

	assert_eq!(reason(&blocked), ReasonCode::BreakerOpen);
	assert_eq!(Calls::count(&harness.calls.scorer), 3);

	let snapshot = harness.service.metrics_snapshot();

	assert_eq!(snapshot.stage2_failures, 3);
	assert_eq!(snapshot.degrades.timeout_degrade_to_stage1, 3);
	assert_eq!(snapshot.degrades.breaker_open, 1);
}

#[tokio::test]
async fn rejected_pairs_degrade_without_tripping_the_breaker() {
	let mut builder = HarnessBuilder::new();

	builder.scorer = ScorerBehavior::Reject;

	let harness = builder.build();

	for query in ["trench sonar", "abyssal plains", "vent fauna", "deep acoustics"] {
		let response = harness.service.rerank(request(query)).await.expect("Rerank failed.");

		assert_eq!(reason(&response), ReasonCode::TimeoutDegradeToStage1);
	}

	assert_eq!(Calls::count(&harness.calls.scorer), 4);
	assert!(harness.service.breakers().get(Dependency::Rerank).allow_request());
}

#[tokio::test]
async fn exhausted_budget_skips_the_scorer() {
	let harness = HarnessBuilder::new().build();
	let budget = Budget::from_millis(0);
	let response = harness
		.service
		.rerank_with_budget(request("trench sonar"), &budget)
		.await
		.expect("Rerank failed.");

	assert_eq!(Calls::count(&harness.calls.scorer), 0);
	assert_eq!(response.model, STAGE1_MODEL);
	assert_eq!(reason(&response), ReasonCode::BudgetExhausted);
}

#[tokio::test]
async fn disabled_stage2_uses_stage1() {
	let harness = HarnessBuilder::new().build();
	let mut req = request("trench sonar");

	req.options.stage2 = StageOptions { enabled: Some(false), top_k: None };

	let response = harness.service.rerank(req).await.expect("Rerank failed.");

	assert_eq!(Calls::count(&harness.calls.scorer), 0);
	assert_eq!(response.model, STAGE1_MODEL);
	assert_eq!(reason(&response), ReasonCode::Disabled);
}

#[tokio::test]
async fn both_stages_disabled_keep_fused_order() {
	let mut builder = HarnessBuilder::new();

	builder.cfg.rerank.stage2.enabled = false;

	let harness = builder.build();
	let mut req = request("trench sonar");

	req.options.stage1 = StageOptions { enabled: Some(false), top_k: None };

	let response = harness.service.rerank(req).await.expect("Rerank failed.");

	assert_eq!(response.model, PASSTHROUGH_MODEL);
	assert_eq!(ids(&response), vec!["d1", "d2", "d3", "d4", "d5"]);
	assert_eq!(reason(&response), ReasonCode::Disabled);
}

#[tokio::test]
async fn stage1_prefers_fresh_complete_documents_on_ties() {
	let harness = HarnessBuilder::new().build();
	let mut req = request("trench sonar");

	req.options.stage2.enabled = Some(false);
	req.options.size = Some(7);
	req.candidates = candidates(7);

	let response = harness.service.rerank(req).await.expect("Rerank failed.");
	let ranked = ids(&response);

	// Rank dominates, so the top fused document stays first; the bare d7 stays last.
	assert_eq!(ranked.first().copied(), Some("d1"));
	assert_eq!(ranked.last().copied(), Some("d7"));

	let ranks: Vec<u32> = response.hits.iter().map(|hit| hit.rank).collect();

	assert_eq!(ranks, (1..=7).collect::<Vec<_>>());
}
