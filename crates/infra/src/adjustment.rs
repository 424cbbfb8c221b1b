//! Signed stock corrections: goods received, shrinkage, count corrections.
//!
//! Shares the transfer path's row locking, retry budget, deadline and
//! post-commit low-stock evaluation.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{info, instrument};

use stockyard_core::{FieldErrors, ItemId, WarehouseId};
use stockyard_inventory::{Balance, Item, LowStockSignal, MAX_NOTES_LEN, MAX_TRANSFER_QUANTITY, Warehouse};

use crate::cache::BalanceChangeHook;
use crate::error::StockError;
use crate::notify::{LowStockMonitor, LowStockSink};
use crate::retry::{RetryError, with_retry};
use crate::store::{CatalogStore, StockAdjustment, StockStore, StoreError};
use crate::transfer_engine::{ITEM_UNAVAILABLE, TransferEngineConfig};

/// Request field names used in adjustment errors.
pub mod fields {
    pub const ITEM: &str = "inventory_item_id";
    pub const WAREHOUSE: &str = "warehouse_id";
    pub const DELTA: &str = "delta";
    pub const REASON: &str = "reason";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustStockCommand {
    pub item_id: ItemId,
    pub warehouse_id: WarehouseId,
    /// Positive to add stock, negative to remove it.
    pub delta: i64,
    pub reason: Option<String>,
}

impl AdjustStockCommand {
    fn shape_errors(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        if self.delta == 0 {
            errors.add(fields::DELTA, "Adjustment cannot be zero.");
        } else if self.delta.unsigned_abs() > MAX_TRANSFER_QUANTITY.unsigned_abs() {
            errors.add(fields::DELTA, "Adjustment cannot exceed 999,999 units.");
        }
        if self
            .reason
            .as_ref()
            .is_some_and(|r| r.chars().count() > MAX_NOTES_LEN)
        {
            errors.add(fields::REASON, "Reason cannot exceed 1000 characters.");
        }
        errors
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedAdjustment {
    pub balance: Balance,
    pub item: Item,
    pub warehouse: Warehouse,
    pub low_stock_signal: Option<LowStockSignal>,
}

pub struct StockAdjuster {
    catalog: Arc<dyn CatalogStore>,
    stock: Arc<dyn StockStore>,
    monitor: LowStockMonitor,
    hooks: Vec<Arc<dyn BalanceChangeHook>>,
    config: TransferEngineConfig,
}

impl StockAdjuster {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        stock: Arc<dyn StockStore>,
        sink: Arc<dyn LowStockSink>,
        config: TransferEngineConfig,
    ) -> Self {
        Self {
            catalog,
            stock,
            monitor: LowStockMonitor::new(sink),
            hooks: Vec::new(),
            config,
        }
    }

    pub fn with_hook(mut self, hook: Arc<dyn BalanceChangeHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    #[instrument(
        skip(self, command),
        fields(
            item_id = %command.item_id,
            warehouse_id = %command.warehouse_id,
            delta = command.delta
        ),
        err
    )]
    pub async fn adjust(&self, command: AdjustStockCommand) -> Result<CompletedAdjustment, StockError> {
        let deadline = Instant::now() + self.config.deadline;

        let (item, warehouse) = tokio::time::timeout_at(deadline, self.validate(&command))
            .await
            .map_err(|_| StockError::DeadlineExceeded)??;

        let adjustment = StockAdjustment {
            item_id: command.item_id,
            warehouse_id: command.warehouse_id,
            delta: command.delta,
            reason: command.reason.clone(),
        };
        let stock = &self.stock;
        let adjustment = &adjustment;
        let balance = with_retry(self.config.retry, deadline, "adjust", move || {
            stock.apply_adjustment(adjustment, deadline)
        })
        .await
        .map_err(commit_error)?;

        info!(
            quantity = balance.quantity,
            reason = command.reason.as_deref().unwrap_or(""),
            "stock adjusted"
        );

        let low_stock_signal = self.monitor.check(&balance, &item, &warehouse);
        for hook in &self.hooks {
            hook.balances_changed(item.id, &[warehouse.id]);
        }

        Ok(CompletedAdjustment {
            balance,
            item,
            warehouse,
            low_stock_signal,
        })
    }

    async fn validate(&self, command: &AdjustStockCommand) -> Result<(Item, Warehouse), StockError> {
        let mut errors = command.shape_errors();

        let item = self
            .catalog
            .get_item(command.item_id)
            .await
            .map_err(read_error)?
            .filter(|i| i.is_active);
        if item.is_none() {
            errors.add(fields::ITEM, ITEM_UNAVAILABLE);
        }

        let warehouse = self
            .catalog
            .get_warehouse(command.warehouse_id)
            .await
            .map_err(read_error)?
            .filter(|w| w.is_active);
        if warehouse.is_none() {
            errors.add(fields::WAREHOUSE, "The warehouse does not exist or is inactive.");
        }

        match (item, warehouse, errors.is_empty()) {
            (Some(item), Some(warehouse), true) => Ok((item, warehouse)),
            _ => Err(StockError::Validation(errors)),
        }
    }
}

fn read_error(err: StoreError) -> StockError {
    StockError::Persistence(err.to_string())
}

fn commit_error(err: RetryError) -> StockError {
    match err {
        RetryError::Exhausted { attempts } => StockError::Contention { attempts },
        RetryError::DeadlineExceeded => StockError::DeadlineExceeded,
        RetryError::Failed(StoreError::InsufficientStock { available }) => StockError::field(
            fields::DELTA,
            format!("Insufficient stock. Only {available} units available in this warehouse."),
        ),
        RetryError::Failed(StoreError::Rejected(reason)) => StockError::field(fields::DELTA, reason),
        RetryError::Failed(other) => StockError::Persistence(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::RecordingLowStockSink;
    use crate::store::InMemoryInventoryStore;
    use chrono::Utc;
    use stockyard_inventory::{ItemDraft, WarehouseDraft};

    async fn setup(minimum: i64) -> (Arc<InMemoryInventoryStore>, Arc<RecordingLowStockSink>, StockAdjuster, Item, Warehouse) {
        let store = Arc::new(InMemoryInventoryStore::new());
        let now = Utc::now();
        let item = store
            .insert_item(
                Item::create(
                    ItemDraft {
                        sku: "ADJ-1".to_string(),
                        name: "Adjusted".to_string(),
                        description: None,
                        category: None,
                        brand: None,
                        unit_of_measure: "box".to_string(),
                        minimum_stock_level: minimum,
                        maximum_stock_level: None,
                        is_active: None,
                    },
                    now,
                )
                .unwrap(),
            )
            .await
            .unwrap();
        let warehouse = store
            .insert_warehouse(
                Warehouse::create(
                    WarehouseDraft {
                        name: "Dock".to_string(),
                        location: None,
                        address: None,
                        contact_person: None,
                        phone: None,
                        email: None,
                        is_active: None,
                    },
                    now,
                )
                .unwrap(),
            )
            .await
            .unwrap();
        let sink = Arc::new(RecordingLowStockSink::new());
        let adjuster = StockAdjuster::new(
            store.clone(),
            store.clone(),
            sink.clone(),
            TransferEngineConfig::default(),
        );
        (store, sink, adjuster, item, warehouse)
    }

    fn cmd(item: &Item, warehouse: &Warehouse, delta: i64) -> AdjustStockCommand {
        AdjustStockCommand {
            item_id: item.id,
            warehouse_id: warehouse.id,
            delta,
            reason: Some("cycle count".to_string()),
        }
    }

    #[tokio::test]
    async fn receiving_creates_the_balance() {
        let (store, sink, adjuster, item, wh) = setup(5).await;
        let done = adjuster.adjust(cmd(&item, &wh, 12)).await.unwrap();
        assert_eq!(done.balance.quantity, 12);
        assert!(done.low_stock_signal.is_none());
        assert!(sink.signals().is_empty());
        assert_eq!(store.get_balance(item.id, wh.id).await.unwrap().unwrap().quantity, 12);
    }

    #[tokio::test]
    async fn shrinkage_below_minimum_signals() {
        let (_, sink, adjuster, item, wh) = setup(5).await;
        adjuster.adjust(cmd(&item, &wh, 6)).await.unwrap();
        let done = adjuster.adjust(cmd(&item, &wh, -2)).await.unwrap();
        assert_eq!(done.balance.quantity, 4);
        assert_eq!(done.low_stock_signal.map(|s| s.shortage()), Some(1));
        assert_eq!(sink.signals().len(), 1);
    }

    #[tokio::test]
    async fn cannot_remove_more_than_on_hand() {
        let (store, _, adjuster, item, wh) = setup(0).await;
        adjuster.adjust(cmd(&item, &wh, 3)).await.unwrap();
        let err = adjuster.adjust(cmd(&item, &wh, -4)).await.unwrap_err();
        let StockError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert!(errors.contains(fields::DELTA));
        assert_eq!(store.get_balance(item.id, wh.id).await.unwrap().unwrap().quantity, 3);
    }

    #[tokio::test]
    async fn zero_delta_and_unknown_item_are_reported_together() {
        let (_, _, adjuster, item, wh) = setup(0).await;
        let mut command = cmd(&item, &wh, 0);
        command.item_id = ItemId::new();
        let StockError::Validation(errors) = adjuster.adjust(command).await.unwrap_err() else {
            panic!("expected validation error");
        };
        assert!(errors.contains(fields::DELTA));
        assert!(errors.contains(fields::ITEM));
    }
}
