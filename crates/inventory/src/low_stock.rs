//! Low-stock predicate and signal.
//!
//! Every balance-mutating operation evaluates [`is_below_minimum`] after it
//! commits; nothing else decides whether a signal fires.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Balance, Item, Warehouse};

/// Fires strictly below the minimum. A balance equal to the minimum is fine.
pub fn is_below_minimum(quantity: i64, minimum_stock_level: i64) -> bool {
    quantity < minimum_stock_level
}

/// Ephemeral notification payload. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowStockSignal {
    pub balance: Balance,
    pub item: Item,
    pub warehouse: Warehouse,
    pub detected_at: DateTime<Utc>,
}

impl LowStockSignal {
    /// Returns a signal when `balance` sits below `item`'s minimum.
    pub fn evaluate(
        balance: &Balance,
        item: &Item,
        warehouse: &Warehouse,
        now: DateTime<Utc>,
    ) -> Option<Self> {
        debug_assert_eq!(balance.item_id, item.id);
        debug_assert_eq!(balance.warehouse_id, warehouse.id);

        is_below_minimum(balance.quantity, item.minimum_stock_level).then(|| Self {
            balance: balance.clone(),
            item: item.clone(),
            warehouse: warehouse.clone(),
            detected_at: now,
        })
    }

    /// Units needed to get back to the minimum.
    pub fn shortage(&self) -> i64 {
        self.item.minimum_stock_level - self.balance.quantity
    }
}
