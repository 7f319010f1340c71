use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::{Error, Result, ScoredDoc, SourceDoc};
use fathom_config::IndexProviderConfig;

pub async fn search_lexical(
	client: &Client,
	cfg: &IndexProviderConfig,
	query: &str,
	top_k: u32,
	timeout: Duration,
) -> Result<Vec<ScoredDoc>> {
	let body = serde_json::json!({ "query": query, "top_k": top_k });
	let json = call(client, cfg, &cfg.lexical_path, &body, timeout).await?;

	parse_hits(json)
}

pub async fn search_vector(
	client: &Client,
	cfg: &IndexProviderConfig,
	vector: &[f32],
	top_k: u32,
	timeout: Duration,
) -> Result<Vec<ScoredDoc>> {
	let body = serde_json::json!({ "vector": vector, "top_k": top_k });
	let json = call(client, cfg, &cfg.vector_path, &body, timeout).await?;

	parse_hits(json)
}

pub async fn fetch_sources(
	client: &Client,
	cfg: &IndexProviderConfig,
	doc_ids: &[String],
	timeout: Duration,
) -> Result<Vec<SourceDoc>> {
	if doc_ids.is_empty() {
		return Ok(Vec::new());
	}

	let body = serde_json::json!({ "doc_ids": doc_ids });
	let json = call(client, cfg, &cfg.sources_path, &body, timeout).await?;
	let docs = json.get("docs").cloned().ok_or_else(|| Error::InvalidResponse {
		message: "Sources response is missing docs array.".to_string(),
	})?;

	Ok(serde_json::from_value(docs)?)
}

/// Lexical search restricted to the author field.
pub async fn search_author_fallback(
	client: &Client,
	cfg: &IndexProviderConfig,
	query: &str,
	top_k: u32,
	timeout: Duration,
) -> Result<Vec<ScoredDoc>> {
	let body = serde_json::json!({ "query": query, "field": "author", "top_k": top_k });
	let json = call(client, cfg, &cfg.author_fallback_path, &body, timeout).await?;

	parse_hits(json)
}

async fn call(
	client: &Client,
	cfg: &IndexProviderConfig,
	path: &str,
	body: &Value,
	timeout: Duration,
) -> Result<Value> {
	crate::post_json(
		client,
		crate::join_url(&cfg.api_base, path),
		crate::auth_headers(&cfg.api_key, &cfg.default_headers)?,
		body,
		timeout,
	)
	.await
}

fn parse_hits(json: Value) -> Result<Vec<ScoredDoc>> {
	let hits = json.get("hits").or_else(|| json.get("results")).cloned().ok_or_else(|| {
		Error::InvalidResponse { message: "Search response is missing hits array.".to_string() }
	})?;

	Ok(serde_json::from_value(hits)?)
}
