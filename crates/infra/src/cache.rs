//! TTL read cache with explicit, scoped invalidation.
//!
//! Entries are rendered JSON grouped by [`CacheScope`]. Balance mutations
//! invalidate the scopes they affect through [`BalanceChangeHook`], so a
//! cached read never outlives the data it was built from by more than the
//! TTL, and usually not at all.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::debug;

use stockyard_core::{ItemId, WarehouseId};

/// Groups of cached reads that are invalidated together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheScope {
    Warehouses,
    WarehouseInventory(WarehouseId),
    ItemSearch,
}

/// Called after a committed change to one or more balances.
pub trait BalanceChangeHook: Send + Sync {
    fn balances_changed(&self, item_id: ItemId, warehouse_ids: &[WarehouseId]);
}

#[derive(Debug, Clone)]
struct Entry {
    value: JsonValue,
    stored_at: Instant,
}

#[derive(Debug, Default)]
struct Scopes {
    entries: HashMap<CacheScope, HashMap<String, Entry>>,
    /// Bumped on every invalidation of a scope.
    generations: HashMap<CacheScope, u64>,
    /// Bumped by `clear`; applies to every scope.
    epoch: u64,
}

impl Scopes {
    fn generation(&self, scope: CacheScope) -> (u64, u64) {
        (self.epoch, self.generations.get(&scope).copied().unwrap_or(0))
    }
}

#[derive(Debug)]
pub struct ReadCache {
    ttl: Duration,
    scopes: RwLock<Scopes>,
}

impl ReadCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            scopes: RwLock::new(Scopes::default()),
        }
    }

    /// Stable key for a set of query parameters.
    pub fn fingerprint<T: Serialize>(params: &T) -> String {
        serde_json::to_string(params).unwrap_or_default()
    }

    pub fn get(&self, scope: CacheScope, key: &str) -> Option<JsonValue> {
        let scopes = self.scopes.read().ok()?;
        let entry = scopes.entries.get(&scope)?.get(key)?;
        if entry.stored_at.elapsed() >= self.ttl {
            return None;
        }
        Some(entry.value.clone())
    }

    pub fn put(&self, scope: CacheScope, key: String, value: JsonValue) {
        if let Ok(mut scopes) = self.scopes.write() {
            self.store(&mut scopes, scope, key, value);
        }
    }

    fn store(&self, scopes: &mut Scopes, scope: CacheScope, key: String, value: JsonValue) {
        let entries = scopes.entries.entry(scope).or_default();
        entries.retain(|_, e| e.stored_at.elapsed() < self.ttl);
        entries.insert(
            key,
            Entry {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    fn generation(&self, scope: CacheScope) -> Option<(u64, u64)> {
        self.scopes.read().ok().map(|s| s.generation(scope))
    }

    /// Return the cached value or compute, store and return a fresh one.
    ///
    /// A value computed while its scope was invalidated is returned to the
    /// caller but not stored.
    pub async fn get_or_try_insert<E, F, Fut>(
        &self,
        scope: CacheScope,
        key: String,
        compute: F,
    ) -> Result<JsonValue, E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<JsonValue, E>>,
    {
        if let Some(hit) = self.get(scope, &key) {
            debug!(?scope, "read cache hit");
            return Ok(hit);
        }
        let started = self.generation(scope);
        let value = compute().await?;
        if let Ok(mut scopes) = self.scopes.write() {
            if started == Some(scopes.generation(scope)) {
                self.store(&mut scopes, scope, key, value.clone());
            } else {
                debug!(?scope, "read cache scope invalidated during compute; not stored");
            }
        }
        Ok(value)
    }

    pub fn invalidate(&self, scope: CacheScope) {
        if let Ok(mut scopes) = self.scopes.write() {
            *scopes.generations.entry(scope).or_default() += 1;
            if scopes.entries.remove(&scope).is_some() {
                debug!(?scope, "read cache invalidated");
            }
        }
    }

    pub fn clear(&self) {
        if let Ok(mut scopes) = self.scopes.write() {
            scopes.epoch += 1;
            scopes.entries.clear();
        }
    }
}

impl BalanceChangeHook for ReadCache {
    fn balances_changed(&self, _item_id: ItemId, warehouse_ids: &[WarehouseId]) {
        for warehouse_id in warehouse_ids {
            self.invalidate(CacheScope::WarehouseInventory(*warehouse_id));
        }
        // Listings carry quantities and stock-status filters.
        self.invalidate(CacheScope::ItemSearch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hit_until_invalidated() {
        let cache = ReadCache::new(Duration::from_secs(60));
        let wh = WarehouseId::new();
        cache.put(CacheScope::WarehouseInventory(wh), "p1".to_string(), json!([1]));
        assert_eq!(
            cache.get(CacheScope::WarehouseInventory(wh), "p1"),
            Some(json!([1]))
        );

        cache.balances_changed(ItemId::new(), &[wh]);
        assert_eq!(cache.get(CacheScope::WarehouseInventory(wh), "p1"), None);
    }

    #[test]
    fn invalidation_is_scoped() {
        let cache = ReadCache::new(Duration::from_secs(60));
        let touched = WarehouseId::new();
        let untouched = WarehouseId::new();
        cache.put(CacheScope::WarehouseInventory(untouched), "k".to_string(), json!(1));
        cache.put(CacheScope::Warehouses, "k".to_string(), json!(2));

        cache.balances_changed(ItemId::new(), &[touched]);
        assert!(cache.get(CacheScope::WarehouseInventory(untouched), "k").is_some());
        assert!(cache.get(CacheScope::Warehouses, "k").is_some());
    }

    #[test]
    fn entries_expire_after_ttl() {
        let cache = ReadCache::new(Duration::ZERO);
        cache.put(CacheScope::ItemSearch, "k".to_string(), json!(1));
        assert_eq!(cache.get(CacheScope::ItemSearch, "k"), None);
    }

    #[tokio::test]
    async fn get_or_try_insert_computes_once() {
        let cache = ReadCache::new(Duration::from_secs(60));
        let first: Result<_, ()> = cache
            .get_or_try_insert(CacheScope::Warehouses, "all".to_string(), || async {
                Ok(json!("fresh"))
            })
            .await;
        let second: Result<_, ()> = cache
            .get_or_try_insert(CacheScope::Warehouses, "all".to_string(), || async {
                Ok(json!("recomputed"))
            })
            .await;
        assert_eq!(first, Ok(json!("fresh")));
        assert_eq!(second, Ok(json!("fresh")));
    }

    #[tokio::test]
    async fn snapshot_invalidated_during_compute_is_not_stored() {
        let cache = ReadCache::new(Duration::from_secs(60));
        let wh = WarehouseId::new();
        let scope = CacheScope::WarehouseInventory(wh);
        let hook = &cache;

        let served: Result<_, ()> = cache
            .get_or_try_insert(scope, "q".to_string(), move || async move {
                let snapshot = json!({"quantity": 50});
                // A transfer commits after the snapshot was read.
                hook.balances_changed(ItemId::new(), &[wh]);
                Ok(snapshot)
            })
            .await;

        assert_eq!(served, Ok(json!({"quantity": 50})));
        assert_eq!(cache.get(scope, "q"), None);

        let next: Result<_, ()> = cache
            .get_or_try_insert(scope, "q".to_string(), || async { Ok(json!({"quantity": 5})) })
            .await;
        assert_eq!(next, Ok(json!({"quantity": 5})));
        assert_eq!(cache.get(scope, "q"), Some(json!({"quantity": 5})));
    }

    #[tokio::test]
    async fn clear_during_compute_discards_the_value() {
        let cache = ReadCache::new(Duration::from_secs(60));
        let shared = &cache;
        let _: Result<_, ()> = cache
            .get_or_try_insert(CacheScope::Warehouses, "all".to_string(), move || async move {
                shared.clear();
                Ok(json!("stale"))
            })
            .await;
        assert_eq!(cache.get(CacheScope::Warehouses, "all"), None);
    }
}
