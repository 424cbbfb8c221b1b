//! Per-balance row locks for the in-memory store.
//!
//! Mirrors `SELECT ... FOR UPDATE` on the balances table: one async mutex per
//! (item, warehouse) pair, acquired with a bounded wait.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::time::Instant;

use stockyard_core::{ItemId, WarehouseId};

use super::r#trait::StoreError;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct BalanceKey {
    pub item_id: ItemId,
    pub warehouse_id: WarehouseId,
}

impl BalanceKey {
    pub fn new(item_id: ItemId, warehouse_id: WarehouseId) -> Self {
        Self {
            item_id,
            warehouse_id,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct RowLocks {
    rows: Mutex<HashMap<BalanceKey, Arc<AsyncMutex<()>>>>,
}

impl RowLocks {
    /// Wait for the pair's lock, giving up after `lock_timeout` or at
    /// `deadline`, whichever comes first.
    pub async fn acquire(
        &self,
        key: BalanceKey,
        lock_timeout: Duration,
        deadline: Instant,
    ) -> Result<OwnedMutexGuard<()>, StoreError> {
        let row = {
            let mut rows = self
                .rows
                .lock()
                .map_err(|_| StoreError::Backend("lock table poisoned".to_string()))?;
            Arc::clone(rows.entry(key).or_default())
        };

        let lock_deadline = (Instant::now() + lock_timeout).min(deadline);
        match tokio::time::timeout_at(lock_deadline, row.lock_owned()).await {
            Ok(guard) => Ok(guard),
            Err(_) if lock_deadline >= deadline => Err(StoreError::DeadlineExceeded),
            Err(_) => Err(StoreError::LockTimeout(format!(
                "balance ({}, {}) is locked",
                key.item_id, key.warehouse_id
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_acquire_times_out_while_held() {
        let locks = RowLocks::default();
        let key = BalanceKey::new(ItemId::new(), WarehouseId::new());
        let far = Instant::now() + Duration::from_secs(5);

        let held = locks.acquire(key, Duration::from_millis(10), far).await.unwrap();
        let err = locks
            .acquire(key, Duration::from_millis(10), far)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::LockTimeout(_)));

        drop(held);
        assert!(locks.acquire(key, Duration::from_millis(10), far).await.is_ok());
    }

    #[tokio::test]
    async fn deadline_wins_over_lock_timeout() {
        let locks = RowLocks::default();
        let key = BalanceKey::new(ItemId::new(), WarehouseId::new());
        let _held = locks
            .acquire(key, Duration::from_secs(1), Instant::now() + Duration::from_secs(5))
            .await
            .unwrap();

        let err = locks
            .acquire(key, Duration::from_secs(5), Instant::now() + Duration::from_millis(10))
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::DeadlineExceeded);
    }

    #[tokio::test]
    async fn distinct_pairs_do_not_contend() {
        let locks = RowLocks::default();
        let item = ItemId::new();
        let far = Instant::now() + Duration::from_secs(5);
        let _a = locks
            .acquire(BalanceKey::new(item, WarehouseId::new()), Duration::from_millis(10), far)
            .await
            .unwrap();
        assert!(
            locks
                .acquire(BalanceKey::new(item, WarehouseId::new()), Duration::from_millis(10), far)
                .await
                .is_ok()
        );
    }
}
