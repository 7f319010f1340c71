use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

/// One hit from a lexical, vector, or fallback query, in backend order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoredDoc {
	#[serde(alias = "id")]
	pub doc_id: String,
	#[serde(default)]
	pub score: Option<f32>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceDoc {
	#[serde(alias = "id")]
	pub doc_id: String,
	#[serde(default)]
	pub title: Option<String>,
	#[serde(default)]
	pub authors: Vec<String>,
	#[serde(default)]
	pub text: Option<String>,
	#[serde(default, with = "time::serde::rfc3339::option")]
	pub published_at: Option<OffsetDateTime>,
	#[serde(default)]
	pub metadata: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScorePair {
	pub doc_id: String,
	pub text: String,
	pub features: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoreResponse {
	pub model: String,
	pub scores: Vec<f32>,
	#[serde(default)]
	pub debug: Option<Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EnrichItem {
	pub doc_id: String,
	pub fused_rank: u32,
	pub fused_score: f64,
	pub title: Option<String>,
	pub text: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichedCandidate {
	pub doc_id: String,
	#[serde(default)]
	pub raw_features: Map<String, Value>,
	#[serde(default)]
	pub transformed_features: Map<String, Value>,
}
