//! The Transfer Engine: moves stock of one item between two warehouses.
//!
//! A transfer runs in three phases:
//!
//! 1. **Validate** (read-only): request shape, referenced item and
//!    warehouses (must exist and be active), then an advisory stock check.
//!    All field failures are collected and reported together.
//! 2. **Commit** (atomic): delegated to [`StockStore::apply_transfer`], which
//!    re-checks stock under the source row lock. Transient failures are
//!    retried with exponential backoff within the request deadline.
//! 3. **Signal** (post-commit, best effort): the shared low-stock predicate
//!    is evaluated for source then destination, signals go to the sink, and
//!    balance-change hooks (cache invalidation) run. Nothing in this phase
//!    can fail the transfer.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, instrument};

use stockyard_core::FieldErrors;
use stockyard_inventory::transfer::fields;
use stockyard_inventory::{Balance, Item, LowStockSignal, TransferRecord, TransferRequest, Warehouse};

use crate::cache::BalanceChangeHook;
use crate::error::StockError;
use crate::notify::{LowStockMonitor, LowStockSink};
use crate::retry::{RetryError, RetryPolicy, with_retry};
use crate::store::{AppliedTransfer, CatalogStore, StockStore, StoreError};

pub type TransferCommand = TransferRequest;
pub type TransferError = StockError;

pub(crate) const ITEM_UNAVAILABLE: &str = "The selected inventory item does not exist or is inactive.";
const SOURCE_UNAVAILABLE: &str = "The source warehouse does not exist or is inactive.";
const DESTINATION_UNAVAILABLE: &str = "The destination warehouse does not exist or is inactive.";
const NO_SOURCE_STOCK: &str = "No stock found for this item in the source warehouse.";

fn insufficient_stock(available: i64) -> String {
    format!("Insufficient stock. Only {available} units available in source warehouse.")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferEngineConfig {
    pub retry: RetryPolicy,
    /// Upper bound on one transfer, from validation to commit.
    pub deadline: Duration,
}

impl Default for TransferEngineConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            deadline: Duration::from_secs(5),
        }
    }
}

/// A committed transfer and everything observed at commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedTransfer {
    pub record: TransferRecord,
    pub source: Balance,
    pub destination: Balance,
    pub item: Item,
    pub from_warehouse: Warehouse,
    pub to_warehouse: Warehouse,
    /// Signals emitted after commit, source first.
    pub low_stock_signals: Vec<LowStockSignal>,
}

struct Participants {
    item: Item,
    from: Warehouse,
    to: Warehouse,
}

pub struct TransferEngine {
    catalog: Arc<dyn CatalogStore>,
    stock: Arc<dyn StockStore>,
    monitor: LowStockMonitor,
    hooks: Vec<Arc<dyn BalanceChangeHook>>,
    config: TransferEngineConfig,
}

impl TransferEngine {
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

    /// Register a hook run after every committed transfer.
    pub fn with_hook(mut self, hook: Arc<dyn BalanceChangeHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn config(&self) -> &TransferEngineConfig {
        &self.config
    }

    #[instrument(
        skip(self, command),
        fields(
            item_id = %command.item_id,
            from_warehouse_id = %command.from_warehouse_id,
            to_warehouse_id = %command.to_warehouse_id,
            quantity = command.quantity
        ),
        err
    )]
    pub async fn transfer(&self, command: TransferCommand) -> Result<CompletedTransfer, TransferError> {
        let deadline = Instant::now() + self.config.deadline;

        let participants = tokio::time::timeout_at(deadline, self.validate(&command))
            .await
            .map_err(|_| TransferError::DeadlineExceeded)??;

        let stock = &self.stock;
        let request = &command;
        let applied = with_retry(self.config.retry, deadline, "transfer", move || {
            stock.apply_transfer(request, deadline)
        })
        .await
        .map_err(commit_error)?;

        info!(
            transfer_id = %applied.record.id,
            source_quantity = applied.source.quantity,
            destination_quantity = applied.destination.quantity,
            "stock transfer committed"
        );

        Ok(self.after_commit(applied, participants))
    }

    async fn validate(&self, command: &TransferCommand) -> Result<Participants, TransferError> {
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

        let from = self.active_warehouse(command.from_warehouse_id).await?;
        if from.is_none() {
            errors.add(fields::FROM_WAREHOUSE, SOURCE_UNAVAILABLE);
        }

        let to = self.active_warehouse(command.to_warehouse_id).await?;
        if to.is_none() {
            errors.add(fields::TO_WAREHOUSE, DESTINATION_UNAVAILABLE);
        }

        let (Some(item), Some(from), Some(to), true) = (item, from, to, errors.is_empty()) else {
            return Err(TransferError::Validation(errors));
        };

        // Advisory only; the store re-checks under the row lock. Available
        // equals on-hand quantity while nothing reserves stock.
        let balance = self
            .stock
            .get_balance(command.item_id, command.from_warehouse_id)
            .await
            .map_err(read_error)?;
        match balance {
            None => return Err(TransferError::field(fields::FROM_WAREHOUSE, NO_SOURCE_STOCK)),
            Some(b) if b.available_quantity() < command.quantity => {
                return Err(TransferError::field(
                    fields::QUANTITY,
                    insufficient_stock(b.available_quantity()),
                ));
            }
            Some(_) => {}
        }

        Ok(Participants { item, from, to })
    }

    async fn active_warehouse(
        &self,
        id: stockyard_core::WarehouseId,
    ) -> Result<Option<Warehouse>, TransferError> {
        Ok(self
            .catalog
            .get_warehouse(id)
            .await
            .map_err(read_error)?
            .filter(|w| w.is_active))
    }

    fn after_commit(&self, applied: AppliedTransfer, participants: Participants) -> CompletedTransfer {
        let Participants { item, from, to } = participants;

        let low_stock_signals: Vec<LowStockSignal> = [(&applied.source, &from), (&applied.destination, &to)]
            .into_iter()
            .filter_map(|(balance, warehouse)| self.monitor.check(balance, &item, warehouse))
            .collect();

        for hook in &self.hooks {
            hook.balances_changed(item.id, &[from.id, to.id]);
        }

        CompletedTransfer {
            record: applied.record,
            source: applied.source,
            destination: applied.destination,
            item,
            from_warehouse: from,
            to_warehouse: to,
            low_stock_signals,
        }
    }
}

fn read_error(err: StoreError) -> TransferError {
    TransferError::Persistence(err.to_string())
}

fn commit_error(err: RetryError) -> TransferError {
    match err {
        RetryError::Exhausted { attempts } => TransferError::Contention { attempts },
        RetryError::DeadlineExceeded => TransferError::DeadlineExceeded,
        RetryError::Failed(StoreError::SourceBalanceMissing) => {
            TransferError::field(fields::FROM_WAREHOUSE, NO_SOURCE_STOCK)
        }
        RetryError::Failed(StoreError::InsufficientStock { available }) => {
            TransferError::field(fields::QUANTITY, insufficient_stock(available))
        }
        RetryError::Failed(StoreError::Rejected(reason)) => {
            TransferError::Validation(FieldErrors::single(fields::QUANTITY, reason))
        }
        RetryError::Failed(other) => TransferError::Persistence(other.to_string()),
    }
}
