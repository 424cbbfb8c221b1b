//! Inventory storage boundary.
//!
//! Two traits split the catalog (items, warehouses) from stock (balances and
//! the transfer ledger). The in-memory store backs tests and dev; the
//! Postgres store is the persistent one.

use std::time::Duration;

pub mod in_memory;
mod locks;
pub mod postgres;
pub mod query;
pub mod r#trait;

pub use in_memory::InMemoryInventoryStore;
pub use postgres::PostgresInventoryStore;
pub use query::{
    BalanceQuery, FilterOptions, ItemQuery, ItemSortField, ItemStatus, Page, PageRequest,
    SortOrder, StockStatus, TransferQuery,
};
pub use r#trait::{
    AppliedTransfer, BalanceView, CatalogStore, ItemStock, StockAdjustment, StockStore,
    StoreError, TransferView, WarehouseStock,
};

/// How long a writer waits for a balance row lock unless configured otherwise.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(2);
