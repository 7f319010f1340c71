//! Rank fusion for lexical and vector result lists.
//!
//! Every document that appears in at least one source receives
//! `weight_source / (k + rank_source)` from each source it appears in. The
//! unweighted case (both weights 1.0) is classic reciprocal rank fusion.

use std::collections::HashMap;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use fathom_config::RetrievalFusion;

pub const DEFAULT_RRF_K: f64 = 60.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FusionWeights {
	pub lexical: f64,
	pub vector: f64,
}
impl FusionWeights {
	pub fn from_config(cfg: &RetrievalFusion) -> Self {
		Self { lexical: cfg.lexical_weight, vector: cfg.vector_weight }
	}
}
impl Default for FusionWeights {
	fn default() -> Self {
		Self { lexical: 1.0, vector: 1.0 }
	}
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
	pub doc_id: String,
	pub lex_rank: Option<u32>,
	pub vec_rank: Option<u32>,
	pub lex_score: Option<f32>,
	pub vec_score: Option<f32>,
	pub fused_score: f64,
	/// 1-based position after sorting.
	pub fused_rank: u32,
}

/// Ranks (1-based) and optional raw scores reported by one retrieval source.
#[derive(Clone, Debug, Default)]
pub struct SourceRanks {
	ranks: HashMap<String, u32>,
	scores: HashMap<String, f32>,
}
impl SourceRanks {
	pub fn from_ranks(ranks: HashMap<String, u32>) -> Self {
		Self { ranks, scores: HashMap::new() }
	}

	/// Builds ranks from hits in descending relevance order. Duplicate ids keep their first
	/// (best) position.
	pub fn from_ordered<I, S>(hits: I) -> Self
	where
		I: IntoIterator<Item = (S, Option<f32>)>,
		S: Into<String>,
	{
		let mut out = Self::default();

		for (doc_id, score) in hits {
			let doc_id = doc_id.into();

			if out.ranks.contains_key(&doc_id) {
				continue;
			}

			let rank = out.ranks.len() as u32 + 1;

			if let Some(score) = score {
				out.scores.insert(doc_id.clone(), score);
			}

			out.ranks.insert(doc_id, rank);
		}

		out
	}

	pub fn with_scores(mut self, scores: HashMap<String, f32>) -> Self {
		self.scores = scores;

		self
	}

	pub fn rank(&self, doc_id: &str) -> Option<u32> {
		self.ranks.get(doc_id).copied()
	}

	pub fn len(&self) -> usize {
		self.ranks.len()
	}

	pub fn is_empty(&self) -> bool {
		self.ranks.is_empty()
	}
}

/// 1-based rank map from an ordered id list. First occurrence wins.
pub fn rank_map<I, S>(ids: I) -> HashMap<String, u32>
where
	I: IntoIterator<Item = S>,
	S: Into<String>,
{
	SourceRanks::from_ordered(ids.into_iter().map(|id| (id, None))).ranks
}

/// Plain reciprocal rank fusion over two rank maps.
pub fn rrf(
	lex_ranks: &HashMap<String, u32>,
	vec_ranks: &HashMap<String, u32>,
	k: f64,
) -> Vec<Candidate> {
	fuse(
		&SourceRanks::from_ranks(lex_ranks.clone()),
		&SourceRanks::from_ranks(vec_ranks.clone()),
		k,
		FusionWeights::default(),
	)
}

/// Weighted rank fusion. Returns every document from either source exactly once, sorted by
/// fused score descending with ties broken by `doc_id` ascending. Never truncates.
pub fn fuse(
	lexical: &SourceRanks,
	vector: &SourceRanks,
	k: f64,
	weights: FusionWeights,
) -> Vec<Candidate> {
	let k = sanitize_k(k);
	let mut by_doc: AHashMap<&str, Candidate> =
		AHashMap::with_capacity(lexical.len() + vector.len());

	for doc_id in lexical.ranks.keys().chain(vector.ranks.keys()) {
		if by_doc.contains_key(doc_id.as_str()) {
			continue;
		}

		let lex_rank = lexical.rank(doc_id);
		let vec_rank = vector.rank(doc_id);
		// Fixed source order keeps float accumulation identical across runs.
		let mut fused_score = 0.0_f64;

		if let Some(rank) = lex_rank {
			fused_score += rank_contribution(weights.lexical, k, rank);
		}
		if let Some(rank) = vec_rank {
			fused_score += rank_contribution(weights.vector, k, rank);
		}

		by_doc.insert(
			doc_id.as_str(),
			Candidate {
				doc_id: doc_id.clone(),
				lex_rank,
				vec_rank,
				lex_score: lexical.scores.get(doc_id).copied(),
				vec_score: vector.scores.get(doc_id).copied(),
				fused_score,
				fused_rank: 0,
			},
		);
	}

	let mut out: Vec<Candidate> = by_doc.into_values().collect();

	sort_and_rank(&mut out);

	out
}

/// Sorts by fused score descending, then `doc_id` ascending, and rewrites `fused_rank`.
pub fn sort_and_rank(candidates: &mut [Candidate]) {
	candidates.sort_by(|left, right| {
		right.fused_score.total_cmp(&left.fused_score).then_with(|| left.doc_id.cmp(&right.doc_id))
	});

	for (idx, candidate) in candidates.iter_mut().enumerate() {
		candidate.fused_rank = idx as u32 + 1;
	}
}

fn rank_contribution(weight: f64, k: f64, rank: u32) -> f64 {
	weight / (k + f64::from(rank.max(1)))
}

fn sanitize_k(k: f64) -> f64 {
	if k.is_finite() && k >= 0.0 { k } else { DEFAULT_RRF_K }
}
