//! TTL cache for hot read paths
//!
//! Short-TTL memoization keyed by `(operation, arguments)`, used by the
//! hierarchy reads and role lookups. The cache is never a source of truth:
//! writers invalidate it after committing, and safety-critical validation
//! re-reads live data regardless of what is cached.
//!
//! Invalidation is hybrid:
//! - time-based: entries expire after their per-operation TTL
//! - explicit: any committed write drops every entry whose arguments
//!   mention the touched tenant ids

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    op: &'static str,
    args: String,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: serde_json::Value,
    inserted_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_fresh(&self) -> bool {
        self.inserted_at.elapsed() < self.ttl
    }
}

/// Explicitly owned, explicitly invalidated TTL cache. Passed by `Arc` to
/// the services that need it; there is no ambient/global lookup.
pub struct CacheManager {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    hierarchy_ttl: Duration,
    role_ttl: Duration,
}

impl CacheManager {
    pub fn new(hierarchy_ttl_secs: u64, role_ttl_secs: u64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            hierarchy_ttl: Duration::from_secs(hierarchy_ttl_secs),
            role_ttl: Duration::from_secs(role_ttl_secs),
        }
    }

    pub fn hierarchy_ttl(&self) -> Duration {
        self.hierarchy_ttl
    }

    pub fn role_ttl(&self) -> Duration {
        self.role_ttl
    }

    pub async fn get(&self, op: &'static str, args: &str) -> Option<serde_json::Value> {
        let entries = self.entries.read().await;
        let entry = entries.get(&CacheKey { op, args: args.to_string() })?;
        if entry.is_fresh() {
            Some(entry.value.clone())
        } else {
            None
        }
    }

    pub async fn put(&self, op: &'static str, args: &str, value: serde_json::Value, ttl: Duration) {
        let mut entries = self.entries.write().await;
        entries.insert(
            CacheKey { op, args: args.to_string() },
            CacheEntry { value, inserted_at: Instant::now(), ttl },
        );
    }

    /// Drop every entry for one operation.
    pub async fn invalidate_op(&self, op: &'static str) {
        let mut entries = self.entries.write().await;
        entries.retain(|k, _| k.op != op);
    }

    /// Drop every entry whose arguments mention `needle` (typically a
    /// tenant id). Coarse by design: a structural write under a root can
    /// affect any read keyed on a node in that subtree.
    pub async fn invalidate_containing(&self, needle: &str) {
        let mut entries = self.entries.write().await;
        entries.retain(|k, _| !k.args.contains(needle));
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_hit_and_miss() {
        let cache = CacheManager::new(120, 60);
        assert!(cache.get("ancestors", "abc").await.is_none());

        cache.put("ancestors", "abc", json!([1, 2]), cache.hierarchy_ttl()).await;
        assert_eq!(cache.get("ancestors", "abc").await, Some(json!([1, 2])));
        assert!(cache.get("ancestors", "other").await.is_none());
        assert!(cache.get("children", "abc").await.is_none());
    }

    #[tokio::test]
    async fn test_expiry() {
        let cache = CacheManager::new(120, 60);
        cache.put("role", "u:t", json!("admin"), Duration::from_millis(10)).await;
        assert!(cache.get("role", "u:t").await.is_some());

        tokio::time::sleep(Duration::from_millis(25)).await;
        assert!(cache.get("role", "u:t").await.is_none());
    }

    #[tokio::test]
    async fn test_invalidate_containing() {
        let cache = CacheManager::new(120, 60);
        cache.put("ancestors", "t1", json!(1), cache.hierarchy_ttl()).await;
        cache.put("children", "t1:all", json!(2), cache.hierarchy_ttl()).await;
        cache.put("children", "t2", json!(3), cache.hierarchy_ttl()).await;

        cache.invalidate_containing("t1").await;
        assert!(cache.get("ancestors", "t1").await.is_none());
        assert!(cache.get("children", "t1:all").await.is_none());
        assert_eq!(cache.get("children", "t2").await, Some(json!(3)));
        assert_eq!(cache.len().await, 1);
    }
}
