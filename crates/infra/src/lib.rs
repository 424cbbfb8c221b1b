//! Infrastructure layer: storage, the Transfer Engine, notification sinks,
//! read caching and configuration.

pub mod adjustment;
pub mod cache;
pub mod config;
pub mod error;
pub mod notify;
pub mod retry;
pub mod store;
pub mod transfer_engine;

pub use adjustment::{AdjustStockCommand, CompletedAdjustment, StockAdjuster};
pub use cache::{BalanceChangeHook, CacheScope, ReadCache};
pub use config::{ConfigError, Settings};
pub use error::StockError;
pub use notify::{
    BroadcastLowStockSink, FanoutLowStockSink, LowStockMonitor, LowStockSink, NotifyError,
    RecordingLowStockSink, TracingLowStockSink,
};
pub use retry::RetryPolicy;
pub use store::{CatalogStore, InMemoryInventoryStore, PostgresInventoryStore, StockStore, StoreError};
pub use transfer_engine::{
    CompletedTransfer, TransferCommand, TransferEngine, TransferEngineConfig, TransferError,
};
