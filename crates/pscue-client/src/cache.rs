//! Completion cache.
//!
//! Short-TTL memoization of completion lists keyed by command context, so a
//! burst of keystrokes within one word reuses a single generated list. A
//! successful execution can bump the matching cached item's score in place.

use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::settings::Settings;
use crate::suggestion::Suggestion;

struct CacheEntry {
    items: Vec<Suggestion>,
    created: Instant,
    last_access: Instant,
    hit_count: u64,
}

#[derive(Clone, Copy, Debug)]
pub struct CacheStats {
    pub entries: usize,
    pub total_hits: u64,
}

/// One row of the debug dump.
#[derive(Clone, Debug)]
pub struct CacheEntrySummary {
    pub key: String,
    pub items: usize,
    pub hits: u64,
    pub age_seconds: u64,
}

/// Concurrent TTL cache of completion lists.
pub struct CompletionCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
}

impl CompletionCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(Duration::from_secs(settings.cache_ttl_seconds))
    }

    /// Cached items for `key`, bumping the hit count. Expired entries are
    /// deleted on access.
    pub fn try_get(&self, key: &str) -> Option<Vec<Suggestion>> {
        let expired = {
            let mut entry = self.entries.get_mut(key)?;
            if entry.created.elapsed() >= self.ttl {
                true
            } else {
                entry.hit_count += 1;
                entry.last_access = Instant::now();
                return Some(entry.items.clone());
            }
        };

        if expired {
            self.entries.remove(key);
        }
        None
    }

    pub fn set(&self, key: &str, items: Vec<Suggestion>) {
        let now = Instant::now();
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                items,
                created: now,
                last_access: now,
                hit_count: 0,
            },
        );
    }

    /// Positive feedback: the shell reports `text` was executed successfully,
    /// so bump its score in the cached list and resort in place.
    pub fn increment_usage(&self, key: &str, text: &str) {
        let Some(mut entry) = self.entries.get_mut(key) else {
            return;
        };
        let Some(item) = entry
            .items
            .iter_mut()
            .find(|item| item.text.eq_ignore_ascii_case(text))
        else {
            return;
        };
        item.score = (item.score + 0.1).min(1.0);
        entry.items.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    }

    /// Drop entries older than `age`, returning how many were removed.
    pub fn remove_expired(&self, age: Duration) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.created.elapsed() < age);
        before - self.entries.len()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            total_hits: self.entries.iter().map(|entry| entry.hit_count).sum(),
        }
    }

    pub fn entries_summary(&self) -> Vec<CacheEntrySummary> {
        self.entries
            .iter()
            .map(|entry| CacheEntrySummary {
                key: entry.key().clone(),
                items: entry.items.len(),
                hits: entry.hit_count,
                age_seconds: entry.created.elapsed().as_secs(),
            })
            .collect()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suggestion::SuggestionSource;
    use pretty_assertions::assert_eq;

    fn items(pairs: &[(&str, f64)]) -> Vec<Suggestion> {
        pairs
            .iter()
            .map(|(text, score)| Suggestion::new(*text, "", *score, SuggestionSource::Known))
            .collect()
    }

    #[test]
    fn hit_within_ttl_bumps_count_once() {
        let cache = CompletionCache::new(Duration::from_secs(60));
        cache.set("git|status", items(&[("-v", 0.9)]));

        let hit = cache.try_get("git|status").unwrap();
        assert_eq!(hit.len(), 1);
        assert_eq!(cache.stats().total_hits, 1);

        cache.try_get("git|status").unwrap();
        assert_eq!(cache.stats().total_hits, 2);
    }

    #[test]
    fn expired_entries_are_deleted_on_access() {
        let cache = CompletionCache::new(Duration::from_millis(10));
        cache.set("k", items(&[("a", 0.5)]));
        std::thread::sleep(Duration::from_millis(20));

        assert!(cache.try_get("k").is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn increment_usage_resorts_in_place() {
        let cache = CompletionCache::new(Duration::from_secs(60));
        cache.set("k", items(&[("first", 0.9), ("second", 0.85)]));

        // two bumps push `second` past `first`
        cache.increment_usage("k", "SECOND");
        cache.increment_usage("k", "second");

        let got = cache.try_get("k").unwrap();
        assert_eq!(got[0].text, "second");
        assert_eq!(got[0].score, 1.0);
    }

    #[test]
    fn remove_expired_reports_count() {
        let cache = CompletionCache::new(Duration::from_secs(60));
        cache.set("a", items(&[("x", 0.1)]));
        cache.set("b", items(&[("y", 0.2)]));
        std::thread::sleep(Duration::from_millis(5));

        assert_eq!(cache.remove_expired(Duration::from_millis(1)), 2);
        assert!(cache.is_empty());
    }
}
