//! Local heuristic reranker used when the remote scorer does not answer.

use std::cmp::Ordering;

use time::OffsetDateTime;

use crate::rerank::RerankCandidate;

pub const STAGE1_MODEL: &str = "stage1-heuristic-v1";

const FUSION_WEIGHT: f32 = 0.7;
const FRESHNESS_WEIGHT: f32 = 0.2;
const COMPLETENESS_WEIGHT: f32 = 0.1;
const FRESHNESS_SCALE_DAYS: f32 = 365.0;

/// Scores the first `top_k` candidates and returns `(index, score)` sorted best first.
pub fn score(
	candidates: &[RerankCandidate],
	top_k: usize,
	now: OffsetDateTime,
) -> Vec<(usize, f32)> {
	let window = candidates.len().min(top_k);
	let total = window as u32;
	let mut scored: Vec<(usize, f32)> = candidates[..window]
		.iter()
		.enumerate()
		.map(|(idx, candidate)| (idx, score_one(candidate, idx as u32 + 1, total, now)))
		.collect();

	scored.sort_by(|(left_idx, left), (right_idx, right)| {
		cmp_f32_desc(*left, *right).then_with(|| left_idx.cmp(right_idx))
	});

	scored
}

fn score_one(candidate: &RerankCandidate, position: u32, total: u32, now: OffsetDateTime) -> f32 {
	FUSION_WEIGHT * rank_normalize(position, total)
		+ FRESHNESS_WEIGHT * freshness(candidate.published_at, now)
		+ COMPLETENESS_WEIGHT * completeness(candidate)
}

pub fn rank_normalize(rank: u32, total: u32) -> f32 {
	if total <= 1 {
		return 1.0;
	}
	if rank == 0 {
		return 0.0;
	}

	let denom = (total - 1) as f32;
	let pos = (rank.saturating_sub(1)) as f32;

	(1.0 - pos / denom).clamp(0.0, 1.0)
}

/// `exp(-age_days / 365)`. Undated documents get 0; future dates count as brand new.
pub fn freshness(published_at: Option<OffsetDateTime>, now: OffsetDateTime) -> f32 {
	let Some(published_at) = published_at else { return 0.0 };
	let age_days = ((now - published_at).as_seconds_f32() / 86_400.0).max(0.0);

	(-age_days / FRESHNESS_SCALE_DAYS).exp()
}

/// Share of title, authors, text, and publication date that are present.
pub fn completeness(candidate: &RerankCandidate) -> f32 {
	let present = [
		candidate.title.as_deref().is_some_and(|title| !title.trim().is_empty()),
		!candidate.authors.is_empty(),
		candidate.text.as_deref().is_some_and(|text| !text.trim().is_empty()),
		candidate.published_at.is_some(),
	];

	present.iter().filter(|value| **value).count() as f32 / present.len() as f32
}

pub fn cmp_f32_desc(a: f32, b: f32) -> Ordering {
	match (a.is_nan(), b.is_nan()) {
		(true, true) => Ordering::Equal,
		(true, false) => Ordering::Greater,
		(false, true) => Ordering::Less,
		(false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
	}
}
