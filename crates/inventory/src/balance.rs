//! Per item × warehouse stock balance.
//!
//! Absence of a balance means zero stock. Every mutation bumps
//! `last_updated_at`, and no mutation may leave `quantity` negative or below
//! `reserved_quantity`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use stockyard_core::{BalanceId, Entity, ItemId, WarehouseId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub id: BalanceId,
    pub item_id: ItemId,
    pub warehouse_id: WarehouseId,
    pub quantity: i64,
    pub reserved_quantity: i64,
    pub last_updated_at: DateTime<Utc>,
}

impl Entity for Balance {
    type Id = BalanceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BalanceError {
    #[error("insufficient stock: {available} available")]
    InsufficientStock { available: i64 },

    #[error("amount must be positive (got {0})")]
    NonPositiveAmount(i64),

    #[error("resulting quantity {resulting} would fall below reserved {reserved}")]
    BelowReserved { reserved: i64, resulting: i64 },

    #[error("quantity overflow")]
    Overflow,
}

impl Balance {
    /// A zero balance for a pair that has never held stock.
    pub fn empty(item_id: ItemId, warehouse_id: WarehouseId, now: DateTime<Utc>) -> Self {
        Self {
            id: BalanceId::new(),
            item_id,
            warehouse_id,
            quantity: 0,
            reserved_quantity: 0,
            last_updated_at: now,
        }
    }

    /// Quantity that is on hand and not reserved.
    pub fn available_quantity(&self) -> i64 {
        self.quantity - self.reserved_quantity
    }

    /// Remove `amount` units. Reserved units cannot be moved out.
    ///
    /// No operation reserves stock yet, so `reserved_quantity` stays 0 and
    /// this is the plain on-hand `quantity` check.
    pub fn debit(&mut self, amount: i64, now: DateTime<Utc>) -> Result<(), BalanceError> {
        if amount <= 0 {
            return Err(BalanceError::NonPositiveAmount(amount));
        }
        let available = self.available_quantity();
        if available < amount {
            return Err(BalanceError::InsufficientStock { available });
        }
        self.quantity -= amount;
        self.last_updated_at = now;
        Ok(())
    }

    /// Add `amount` units.
    pub fn credit(&mut self, amount: i64, now: DateTime<Utc>) -> Result<(), BalanceError> {
        if amount <= 0 {
            return Err(BalanceError::NonPositiveAmount(amount));
        }
        self.quantity = self.quantity.checked_add(amount).ok_or(BalanceError::Overflow)?;
        self.last_updated_at = now;
        Ok(())
    }

    /// Apply a signed correction (receiving, shrinkage, stock count).
    pub fn adjust(&mut self, delta: i64, now: DateTime<Utc>) -> Result<(), BalanceError> {
        if delta == 0 {
            return Err(BalanceError::NonPositiveAmount(0));
        }
        let resulting = self.quantity.checked_add(delta).ok_or(BalanceError::Overflow)?;
        if resulting < 0 {
            return Err(BalanceError::InsufficientStock {
                available: self.available_quantity(),
            });
        }
        if resulting < self.reserved_quantity {
            return Err(BalanceError::BelowReserved {
                reserved: self.reserved_quantity,
                resulting,
            });
        }
        self.quantity = resulting;
        self.last_updated_at = now;
        Ok(())
    }
}

/// Move `amount` from `source` to `destination` as one step.
///
/// Either both balances change or neither does.
pub fn move_stock(
    source: &mut Balance,
    destination: &mut Balance,
    amount: i64,
    now: DateTime<Utc>,
) -> Result<(), BalanceError> {
    let source_before = source.clone();
    source.debit(amount, now)?;
    if let Err(e) = destination.credit(amount, now) {
        *source = source_before;
        return Err(e);
    }
    Ok(())
}
