//! Judgment cache.
//!
//! Identical requests (same model, same messages) return the judgment the
//! scoring service gave the first time, so repeated evaluations of the same
//! document in one process are idempotent and free.

use moka::future::Cache;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use crate::providers::ChatMessage;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    model: String,
    messages_hash: u64,
}

impl CacheKey {
    pub fn new(model: &str, messages: &[ChatMessage]) -> Self {
        let mut hasher = DefaultHasher::new();
        messages.hash(&mut hasher);
        Self {
            model: model.to_string(),
            messages_hash: hasher.finish(),
        }
    }
}

/// Raw judgment text keyed by request.
pub struct JudgmentCache {
    cache: Cache<CacheKey, String>,
}

impl JudgmentCache {
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();

        Self { cache }
    }

    pub async fn get(&self, key: &CacheKey) -> Option<String> {
        self.cache.get(key).await
    }

    pub async fn insert(&self, key: CacheKey, judgment: String) {
        self.cache.insert(key, judgment).await;
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    /// Approximate; moka updates counts lazily.
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

impl Default for JudgmentCache {
    fn default() -> Self {
        Self::new(10_000, Duration::from_secs(3600))
    }
}
