//! Low-stock notification sinks.
//!
//! Signals are delivered after commit and fire-and-forget: a sink failure is
//! logged and never unwinds or fails the operation that produced it.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{error, warn};

use stockyard_inventory::{Balance, Item, LowStockSignal, Warehouse};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NotifyError {
    #[error("notification sink unavailable: {0}")]
    Unavailable(String),
}

/// Receives low-stock signals for out-of-band delivery.
///
/// Implementations must not block; hand slow work off to a queue.
pub trait LowStockSink: Send + Sync {
    fn notify(&self, signal: &LowStockSignal) -> Result<(), NotifyError>;
}

impl<S> LowStockSink for Arc<S>
where
    S: LowStockSink + ?Sized,
{
    fn notify(&self, signal: &LowStockSignal) -> Result<(), NotifyError> {
        (**self).notify(signal)
    }
}

/// Writes each signal to the log at `warn`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLowStockSink;

impl LowStockSink for TracingLowStockSink {
    fn notify(&self, signal: &LowStockSignal) -> Result<(), NotifyError> {
        warn!(
            item_id = %signal.item.id,
            sku = %signal.item.sku,
            item_name = %signal.item.name,
            warehouse_id = %signal.warehouse.id,
            warehouse_name = %signal.warehouse.name,
            current_quantity = signal.balance.quantity,
            minimum_stock_level = signal.item.minimum_stock_level,
            shortage = signal.shortage(),
            "low stock detected"
        );
        Ok(())
    }
}

/// Fans signals out to live subscribers (the alert stream).
///
/// Having no subscribers is not an error; the signal is simply dropped.
#[derive(Debug, Clone)]
pub struct BroadcastLowStockSink {
    sender: broadcast::Sender<LowStockSignal>,
}

impl BroadcastLowStockSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LowStockSignal> {
        self.sender.subscribe()
    }
}

impl LowStockSink for BroadcastLowStockSink {
    fn notify(&self, signal: &LowStockSignal) -> Result<(), NotifyError> {
        // `send` only fails when nobody is listening.
        let _ = self.sender.send(signal.clone());
        Ok(())
    }
}

/// Delivers to every inner sink, even when an earlier one fails.
#[derive(Clone, Default)]
pub struct FanoutLowStockSink {
    sinks: Vec<Arc<dyn LowStockSink>>,
}

impl FanoutLowStockSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn LowStockSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl LowStockSink for FanoutLowStockSink {
    fn notify(&self, signal: &LowStockSignal) -> Result<(), NotifyError> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(err) = sink.notify(signal) {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

/// Keeps every signal in memory. For tests and local inspection.
#[derive(Debug, Default)]
pub struct RecordingLowStockSink {
    signals: std::sync::Mutex<Vec<LowStockSignal>>,
}

impl RecordingLowStockSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signals(&self) -> Vec<LowStockSignal> {
        self.signals.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl LowStockSink for RecordingLowStockSink {
    fn notify(&self, signal: &LowStockSignal) -> Result<(), NotifyError> {
        self.signals
            .lock()
            .map_err(|_| NotifyError::Unavailable("recording sink poisoned".to_string()))?
            .push(signal.clone());
        Ok(())
    }
}

/// Applies the shared low-stock predicate to freshly committed balances and
/// hands any signals to the sink.
#[derive(Clone)]
pub struct LowStockMonitor {
    sink: Arc<dyn LowStockSink>,
}

impl LowStockMonitor {
    pub fn new(sink: Arc<dyn LowStockSink>) -> Self {
        Self { sink }
    }

    /// Evaluate one committed balance. Returns the signal if one fired.
    pub fn check(&self, balance: &Balance, item: &Item, warehouse: &Warehouse) -> Option<LowStockSignal> {
        let signal = LowStockSignal::evaluate(balance, item, warehouse, Utc::now())?;
        if let Err(err) = self.sink.notify(&signal) {
            error!(
                item_id = %item.id,
                warehouse_id = %warehouse.id,
                error = %err,
                "failed to deliver low-stock notification"
            );
        }
        Some(signal)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use stockyard_inventory::{ItemDraft, WarehouseDraft};

    /// Always fails; proves delivery errors stay contained.
    pub(crate) struct FailingSink;

    impl LowStockSink for FailingSink {
        fn notify(&self, _signal: &LowStockSignal) -> Result<(), NotifyError> {
            Err(NotifyError::Unavailable("mail relay down".to_string()))
        }
    }

    fn fixtures(quantity: i64) -> (Balance, Item, Warehouse) {
        let now = Utc::now();
        let item = Item::create(
            ItemDraft {
                sku: "CBL-2M".to_string(),
                name: "Cable 2m".to_string(),
                description: None,
                category: None,
                brand: None,
                unit_of_measure: "pcs".to_string(),
                minimum_stock_level: 10,
                maximum_stock_level: None,
                is_active: None,
            },
            now,
        )
        .unwrap();
        let warehouse = Warehouse::create(
            WarehouseDraft {
                name: "North".to_string(),
                location: None,
                address: None,
                contact_person: None,
                phone: None,
                email: None,
                is_active: None,
            },
            now,
        )
        .unwrap();
        let mut balance = Balance::empty(item.id, warehouse.id, now);
        balance.quantity = quantity;
        (balance, item, warehouse)
    }

    #[test]
    fn monitor_fires_only_below_minimum() {
        let sink = Arc::new(RecordingLowStockSink::new());
        let monitor = LowStockMonitor::new(sink.clone());

        let (at_min, item, wh) = fixtures(10);
        assert!(monitor.check(&at_min, &item, &wh).is_none());

        let (below, item, wh) = fixtures(9);
        let signal = monitor.check(&below, &item, &wh).unwrap();
        assert_eq!(signal.shortage(), 1);
        assert_eq!(sink.signals().len(), 1);
    }

    #[test]
    fn sink_failure_is_contained() {
        let monitor = LowStockMonitor::new(Arc::new(FailingSink));
        let (below, item, wh) = fixtures(0);
        assert!(monitor.check(&below, &item, &wh).is_some());
    }

    #[test]
    fn fanout_reaches_every_sink_despite_failures() {
        let recorder = Arc::new(RecordingLowStockSink::new());
        let fanout = FanoutLowStockSink::new()
            .with(Arc::new(FailingSink))
            .with(recorder.clone());
        let (below, item, wh) = fixtures(3);
        let signal = LowStockSignal::evaluate(&below, &item, &wh, Utc::now()).unwrap();

        assert!(fanout.notify(&signal).is_err());
        assert_eq!(recorder.signals().len(), 1);
    }

    #[tokio::test]
    async fn broadcast_reaches_subscribers() {
        let sink = BroadcastLowStockSink::new(8);
        let (below, item, wh) = fixtures(1);
        let signal = LowStockSignal::evaluate(&below, &item, &wh, Utc::now()).unwrap();

        sink.notify(&signal).unwrap();

        let mut rx = sink.subscribe();
        sink.notify(&signal).unwrap();
        assert_eq!(rx.recv().await.unwrap(), signal);
    }
}
