use std::{
	sync::Mutex,
	time::{Duration, Instant},
};

use ahash::AHashMap;

use crate::search::SearchHit;

struct CacheEntry {
	results: Vec<SearchHit>,
	expires_at: Instant,
}

/// Time-bounded memoization of ranked results, keyed by a fingerprint of the
/// exact query text. Expired entries are evicted lazily on the next lookup
/// with the same key; there is no background sweep, so memory is bounded
/// only by distinct query traffic within one TTL window.
pub struct ScoreCache {
	ttl: Duration,
	entries: Mutex<AHashMap<String, CacheEntry>>,
}

impl ScoreCache {
	pub fn new(ttl: Duration) -> Self {
		Self { ttl, entries: Mutex::new(AHashMap::new()) }
	}

	pub fn get(&self, query: &str) -> Option<Vec<SearchHit>> {
		let key = fingerprint(query);
		let mut entries = self.entries.lock().expect("cache lock poisoned");
		let entry = entries.get(&key)?;

		if Instant::now() < entry.expires_at {
			return Some(entry.results.clone());
		}

		entries.remove(&key);

		None
	}

	pub fn set(&self, query: &str, results: Vec<SearchHit>) {
		let key = fingerprint(query);
		let entry = CacheEntry { results, expires_at: Instant::now() + self.ttl };

		self.entries.lock().expect("cache lock poisoned").insert(key, entry);
	}

	pub fn clear(&self) {
		self.entries.lock().expect("cache lock poisoned").clear();
	}
}

pub fn fingerprint(query: &str) -> String {
	blake3::hash(query.as_bytes()).to_hex().to_string()
}

#[cfg(test)]
mod tests {
	use super::*;

	fn hit(score: f32) -> SearchHit {
		SearchHit {
			id: uuid::Uuid::new_v4(),
			score,
			metadata: Default::default(),
			ranking: None,
		}
	}

	#[test]
	fn round_trips_within_ttl() {
		let cache = ScoreCache::new(Duration::from_secs(60));
		let results = vec![hit(0.9), hit(0.4)];

		cache.set("q", results.clone());

		let cached = cache.get("q").expect("expected a cache hit");

		assert_eq!(cached.len(), 2);
		assert_eq!(cached[0].id, results[0].id);
		assert_eq!(cached[0].score, results[0].score);
	}

	#[test]
	fn expired_entry_is_absent_and_removed() {
		let cache = ScoreCache::new(Duration::ZERO);

		cache.set("q", vec![hit(0.9)]);

		assert!(cache.get("q").is_none());
		assert!(cache.entries.lock().unwrap().is_empty());
	}

	#[test]
	fn clear_empties_the_cache() {
		let cache = ScoreCache::new(Duration::from_secs(60));

		cache.set("q", vec![hit(0.9)]);
		cache.clear();

		assert!(cache.get("q").is_none());
	}

	#[test]
	fn distinct_queries_do_not_collide() {
		let cache = ScoreCache::new(Duration::from_secs(60));

		cache.set("a", vec![hit(0.1)]);
		cache.set("b", vec![hit(0.2)]);

		assert_eq!(cache.get("a").unwrap()[0].score, 0.1);
		assert_eq!(cache.get("b").unwrap()[0].score, 0.2);
	}
}
