//! Thinking-signature cache.
//!
//! Clients routinely strip the opaque `thoughtSignature` tokens from tool-use
//! blocks between turns, but the upstream requires them to continue a
//! reasoning chain. This cache captures signatures as they stream by and
//! hands them back during request translation.
//!
//! Two independent namespaces: tool-use id (exact recovery) and model family
//! (last-resort fallback). Created at startup and passed to the translator
//! and the streaming pipeline as an explicit collaborator.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Signatures below this length are truncation artifacts, not real tokens.
pub const MIN_SIGNATURE_LEN: usize = 8;

const SIGNATURE_TTL: Duration = Duration::from_secs(2 * 60 * 60);
const MAX_ENTRIES: usize = 1024;

struct Entry {
    value: String,
    inserted_at: Instant,
}

#[derive(Default)]
struct Shard {
    entries: HashMap<String, Entry>,
    // Insertion order; oldest evicted first on overflow.
    order: VecDeque<String>,
}

impl Shard {
    fn put(&mut self, key: &str, value: String) {
        if self.entries.contains_key(key) {
            self.order.retain(|k| k != key);
        }
        self.order.push_back(key.to_string());
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                inserted_at: Instant::now(),
            },
        );

        while self.entries.len() > MAX_ENTRIES {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }
    }

    fn get(&mut self, key: &str) -> Option<String> {
        let expired = match self.entries.get(key) {
            Some(entry) if entry.inserted_at.elapsed() <= SIGNATURE_TTL => {
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(key);
            self.order.retain(|k| k != key);
        }
        None
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

pub struct SignatureCache {
    by_tool_id: Mutex<Shard>,
    by_model_family: Mutex<Shard>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl SignatureCache {
    pub fn new() -> Self {
        Self {
            by_tool_id: Mutex::new(Shard::default()),
            by_model_family: Mutex::new(Shard::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Store a signature under the tool-use id that produced it.
    pub fn put_tool(&self, tool_use_id: &str, signature: &str) {
        if signature.len() < MIN_SIGNATURE_LEN {
            tracing::debug!(
                len = signature.len(),
                "rejecting short tool signature at put"
            );
            return;
        }
        if let Ok(mut shard) = self.by_tool_id.lock() {
            shard.put(tool_use_id, signature.to_string());
        }
    }

    pub fn get_tool(&self, tool_use_id: &str) -> Option<String> {
        let found = self
            .by_tool_id
            .lock()
            .ok()
            .and_then(|mut shard| shard.get(tool_use_id));
        self.count(found.is_some());
        found
    }

    /// Store the latest thinking signature for a model family.
    pub fn put_family(&self, family: &str, signature: &str) {
        if signature.len() < MIN_SIGNATURE_LEN {
            tracing::debug!(
                len = signature.len(),
                "rejecting short family signature at put"
            );
            return;
        }
        if let Ok(mut shard) = self.by_model_family.lock() {
            shard.put(family, signature.to_string());
        }
    }

    pub fn get_family(&self, family: &str) -> Option<String> {
        let found = self
            .by_model_family
            .lock()
            .ok()
            .and_then(|mut shard| shard.get(family));
        self.count(found.is_some());
        found
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    fn count(&self, hit: bool) {
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl Default for SignatureCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(fill: char, len: usize) -> String {
        std::iter::repeat(fill).take(len).collect()
    }

    #[test]
    fn test_tool_signature_roundtrip() {
        let cache = SignatureCache::new();
        let s = sig('x', 64);

        cache.put_tool("toolu_1", &s);
        assert_eq!(cache.get_tool("toolu_1"), Some(s));
        assert_eq!(cache.get_tool("toolu_2"), None);
    }

    #[test]
    fn test_min_length_rejected_at_put() {
        let cache = SignatureCache::new();
        cache.put_tool("toolu_short", "abc");
        assert_eq!(cache.get_tool("toolu_short"), None);

        // Exactly MIN_SIGNATURE_LEN is accepted
        let s = sig('y', MIN_SIGNATURE_LEN);
        cache.put_tool("toolu_min", &s);
        assert_eq!(cache.get_tool("toolu_min"), Some(s));
    }

    #[test]
    fn test_family_namespace_is_independent() {
        let cache = SignatureCache::new();
        let s = sig('z', 32);

        cache.put_family("gemini-3", &s);
        assert_eq!(cache.get_family("gemini-3"), Some(s));
        assert_eq!(cache.get_tool("gemini-3"), None);
    }

    #[test]
    fn test_overflow_evicts_oldest_insert() {
        let cache = SignatureCache::new();
        let s = sig('a', 16);

        for i in 0..(MAX_ENTRIES + 1) {
            cache.put_tool(&format!("toolu_{i}"), &s);
        }

        assert_eq!(cache.get_tool("toolu_0"), None);
        assert_eq!(cache.get_tool(&format!("toolu_{MAX_ENTRIES}")), Some(s));
    }

    #[test]
    fn test_reinsert_refreshes_eviction_order() {
        let cache = SignatureCache::new();
        let s = sig('b', 16);

        cache.put_tool("toolu_keep", &s);
        for i in 0..MAX_ENTRIES - 1 {
            cache.put_tool(&format!("toolu_{i}"), &s);
        }
        // Re-insert bumps it to the back of the queue, so the next overflow
        // evicts toolu_0 instead.
        cache.put_tool("toolu_keep", &s);
        cache.put_tool("toolu_overflow", &s);

        assert_eq!(cache.get_tool("toolu_keep"), Some(s));
        assert_eq!(cache.get_tool("toolu_0"), None);
    }

    #[test]
    fn test_hit_miss_counters() {
        let cache = SignatureCache::new();
        let s = sig('c', 16);
        cache.put_tool("toolu_1", &s);

        cache.get_tool("toolu_1");
        cache.get_tool("toolu_missing");
        cache.get_family("no-family");

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
    }
}
