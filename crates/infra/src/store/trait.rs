use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;

use stockyard_core::{ItemId, WarehouseId};
use stockyard_inventory::{
    Balance, BalanceError, Item, TransferRecord, TransferRequest, Warehouse,
};

use super::query::{BalanceQuery, FilterOptions, ItemQuery, Page, TransferQuery};

/// Storage failure.
///
/// `LockTimeout` and `Serialization` are transient: the same request may
/// succeed if retried. Everything else is final for this attempt.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// The source pair has never held stock.
    #[error("no balance exists for the source pair")]
    SourceBalanceMissing,

    #[error("insufficient stock: {available} available")]
    InsufficientStock { available: i64 },

    /// A balance rule rejected the change (overflow, below reserved).
    #[error("balance rule violated: {0}")]
    Rejected(String),

    #[error("lock wait timed out: {0}")]
    LockTimeout(String),

    #[error("serialization failure: {0}")]
    Serialization(String),

    /// The caller's deadline passed before commit. Nothing was written.
    #[error("deadline exceeded before commit")]
    DeadlineExceeded,

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::LockTimeout(_) | StoreError::Serialization(_))
    }
}

impl From<BalanceError> for StoreError {
    fn from(err: BalanceError) -> Self {
        match err {
            BalanceError::InsufficientStock { available } => {
                StoreError::InsufficientStock { available }
            }
            other => StoreError::Rejected(other.to_string()),
        }
    }
}

/// A balance joined with the item and warehouse it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceView {
    pub balance: Balance,
    pub item: Item,
    pub warehouse: Warehouse,
}

/// One warehouse's holding of a given item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseStock {
    pub warehouse: Warehouse,
    pub balance: Balance,
}

/// An item with its balances across warehouses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStock {
    pub item: Item,
    pub stocks: Vec<WarehouseStock>,
}

impl ItemStock {
    pub fn total_quantity(&self) -> i64 {
        self.stocks.iter().map(|s| s.balance.quantity).sum()
    }

    pub fn total_available(&self) -> i64 {
        self.stocks.iter().map(|s| s.balance.available_quantity()).sum()
    }
}

/// A ledger entry joined with display data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferView {
    pub record: TransferRecord,
    pub item: Item,
    pub from_warehouse: Warehouse,
    pub to_warehouse: Warehouse,
}

/// Result of a committed transfer: the ledger entry plus both balances as
/// they stood at commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedTransfer {
    pub record: TransferRecord,
    pub source: Balance,
    pub destination: Balance,
}

/// A signed correction to one balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjustment {
    pub item_id: ItemId,
    pub warehouse_id: WarehouseId,
    pub delta: i64,
    pub reason: Option<String>,
}

/// Items and warehouses.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Insert a new item. Duplicate SKUs yield `Conflict`.
    async fn insert_item(&self, item: Item) -> Result<Item, StoreError>;

    async fn update_item(&self, item: Item) -> Result<Item, StoreError>;

    /// Remove an item. Items with balances or ledger entries yield `Conflict`.
    async fn delete_item(&self, id: ItemId) -> Result<(), StoreError>;

    async fn get_item(&self, id: ItemId) -> Result<Option<Item>, StoreError>;

    async fn get_item_stock(&self, id: ItemId) -> Result<Option<ItemStock>, StoreError>;

    async fn search_items(&self, query: &ItemQuery) -> Result<Page<ItemStock>, StoreError>;

    /// Distinct categories and brands of active items.
    async fn item_filter_options(&self) -> Result<FilterOptions, StoreError>;

    async fn insert_warehouse(&self, warehouse: Warehouse) -> Result<Warehouse, StoreError>;

    async fn get_warehouse(&self, id: WarehouseId) -> Result<Option<Warehouse>, StoreError>;

    async fn list_warehouses(&self) -> Result<Vec<Warehouse>, StoreError>;
}

/// Balances and the transfer ledger.
///
/// Mutations take a `deadline`: if it passes before commit the store
/// abandons the attempt and nothing is written.
#[async_trait]
pub trait StockStore: Send + Sync {
    async fn get_balance(
        &self,
        item_id: ItemId,
        warehouse_id: WarehouseId,
    ) -> Result<Option<Balance>, StoreError>;

    async fn list_balances(&self, query: &BalanceQuery) -> Result<Page<BalanceView>, StoreError>;

    /// Move stock in one atomic step.
    ///
    /// Locks the source pair, re-checks available stock under the lock,
    /// debits the source, credits (creating if absent) the destination and
    /// appends the ledger entry. Either all of it commits or none of it does.
    async fn apply_transfer(
        &self,
        request: &TransferRequest,
        deadline: Instant,
    ) -> Result<AppliedTransfer, StoreError>;

    /// Apply a signed correction under the pair's lock. A missing balance is
    /// created when `delta` is positive.
    async fn apply_adjustment(
        &self,
        adjustment: &StockAdjustment,
        deadline: Instant,
    ) -> Result<Balance, StoreError>;

    async fn list_transfers(&self, query: &TransferQuery) -> Result<Page<TransferView>, StoreError>;
}
