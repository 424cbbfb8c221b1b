//! Inventory domain module.
//!
//! This crate contains business rules for items, warehouses, per-warehouse
//! balances and transfers, implemented purely as deterministic domain logic
//! (no IO, no HTTP, no storage).

pub mod balance;
pub mod item;
pub mod low_stock;
pub mod search;
pub mod transfer;
pub mod warehouse;

pub use balance::{Balance, BalanceError, move_stock};
pub use item::{Item, ItemDraft};
pub use low_stock::{LowStockSignal, is_below_minimum};
pub use search::{ItemSearch, soundex};
pub use transfer::{
    MAX_NOTES_LEN, MAX_TRANSFER_QUANTITY, TransferRecord, TransferRequest, TransferStatus,
};
pub use warehouse::{Warehouse, WarehouseDraft};
