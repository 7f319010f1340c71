//! In-process cache of remote scorer results.

use std::{
	collections::{HashMap, VecDeque},
	sync::atomic::{AtomicU64, Ordering},
	time::{Duration, Instant},
};

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

use fathom_config::RerankCache as RerankCacheConfig;

const RERANK_CACHE_SCHEMA_VERSION: i32 = 1;

#[derive(Clone, Debug, PartialEq)]
pub struct CachedScores {
	pub model: String,
	pub scores: Vec<f32>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
	pub entries: usize,
	pub hits: u64,
	pub misses: u64,
	pub stores: u64,
	pub evictions: u64,
}

#[derive(Debug)]
struct CacheEntry {
	doc_ids: Vec<String>,
	scores: Vec<f32>,
	model: String,
	expires_at: Instant,
	generation: u64,
}

#[derive(Debug, Default)]
struct CacheState {
	entries: HashMap<String, CacheEntry>,
	/// Write order. Stale generations are skipped on eviction.
	order: VecDeque<(String, u64)>,
	next_generation: u64,
}
impl CacheState {
	fn evict_oldest(&mut self) -> bool {
		while let Some((key, generation)) = self.order.pop_front() {
			let live = self.entries.get(&key).is_some_and(|entry| entry.generation == generation);

			if live {
				self.entries.remove(&key);

				return true;
			}
		}

		false
	}

	fn compact_order(&mut self) {
		let entries = &self.entries;

		self.order.retain(|(key, generation)| {
			entries.get(key).is_some_and(|entry| entry.generation == *generation)
		});
	}
}

/// Bounded TTL cache keyed by [`build_rerank_cache_key`]. When full, the entry written longest
/// ago is evicted.
#[derive(Debug)]
pub struct RerankCache {
	enabled: bool,
	ttl: Duration,
	max_entries: usize,
	state: Mutex<CacheState>,
	hits: AtomicU64,
	misses: AtomicU64,
	stores: AtomicU64,
	evictions: AtomicU64,
}
impl RerankCache {
	pub fn new(enabled: bool, ttl: Duration, max_entries: usize) -> Self {
		Self {
			enabled: enabled && max_entries > 0,
			ttl,
			max_entries,
			state: Mutex::new(CacheState::default()),
			hits: AtomicU64::new(0),
			misses: AtomicU64::new(0),
			stores: AtomicU64::new(0),
			evictions: AtomicU64::new(0),
		}
	}

	pub fn from_config(cfg: &RerankCacheConfig) -> Self {
		Self::new(cfg.enabled, Duration::from_millis(cfg.ttl_ms), cfg.max_entries as usize)
	}

	pub fn is_enabled(&self) -> bool {
		self.enabled
	}

	pub fn get(&self, key: &str, doc_ids: &[String]) -> Option<CachedScores> {
		self.get_at(key, doc_ids, Instant::now())
	}

	pub fn get_at(&self, key: &str, doc_ids: &[String], now: Instant) -> Option<CachedScores> {
		if !self.enabled {
			return None;
		}

		let found = {
			let mut state = self.state.lock();
			let expired = state.entries.get(key).is_some_and(|entry| entry.expires_at <= now);

			if expired {
				state.entries.remove(key);
			}

			state
				.entries
				.get(key)
				.filter(|entry| {
					entry.doc_ids.as_slice() == doc_ids && entry.scores.len() == doc_ids.len()
				})
				.map(|entry| CachedScores {
					model: entry.model.clone(),
					scores: entry.scores.clone(),
				})
		};

		match found {
			Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
			None => self.misses.fetch_add(1, Ordering::Relaxed),
		};

		found
	}

	pub fn put(&self, key: String, doc_ids: Vec<String>, scores: Vec<f32>, model: String) {
		self.put_at(key, doc_ids, scores, model, Instant::now());
	}

	pub fn put_at(
		&self,
		key: String,
		doc_ids: Vec<String>,
		scores: Vec<f32>,
		model: String,
		now: Instant,
	) {
		if !self.enabled || doc_ids.len() != scores.len() {
			return;
		}

		let mut evicted = 0_u64;

		{
			let mut state = self.state.lock();
			let generation = state.next_generation;

			state.next_generation += 1;

			let replaced = state
				.entries
				.insert(
					key.clone(),
					CacheEntry { doc_ids, scores, model, expires_at: now + self.ttl, generation },
				)
				.is_some();

			state.order.push_back((key, generation));

			if !replaced {
				while state.entries.len() > self.max_entries && state.evict_oldest() {
					evicted += 1;
				}
			}
			if state.order.len() > self.max_entries.saturating_mul(2) {
				state.compact_order();
			}
		}

		self.stores.fetch_add(1, Ordering::Relaxed);

		if evicted > 0 {
			self.evictions.fetch_add(evicted, Ordering::Relaxed);
		}
	}

	pub fn len(&self) -> usize {
		self.state.lock().entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn stats(&self) -> CacheStats {
		CacheStats {
			entries: self.len(),
			hits: self.hits.load(Ordering::Relaxed),
			misses: self.misses.load(Ordering::Relaxed),
			stores: self.stores.load(Ordering::Relaxed),
			evictions: self.evictions.load(Ordering::Relaxed),
		}
	}
}

pub fn hash_cache_key(payload: &Value) -> serde_json::Result<String> {
	let raw = serde_json::to_vec(payload)?;

	Ok(blake3::hash(&raw).to_hex().to_string())
}

pub fn cache_key_prefix(key: &str) -> &str {
	let len = key.len().min(12);

	&key[..len]
}

/// `query` should already be normalized. Candidate order is part of the key.
pub fn build_rerank_cache_key(
	query: &str,
	provider_id: &str,
	model: &str,
	doc_ids: &[String],
) -> serde_json::Result<String> {
	let payload = serde_json::json!({
		"kind": "rerank",
		"schema_version": RERANK_CACHE_SCHEMA_VERSION,
		"query": query.trim(),
		"provider_id": provider_id,
		"model": model,
		"candidates": doc_ids,
	});

	hash_cache_key(&payload)
}
