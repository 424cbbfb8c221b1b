//! Stock transfer ledger entries and request shape rules.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockyard_core::{DomainError, Entity, FieldErrors, ItemId, TransferId, UserId, WarehouseId};

/// Upper bound on a single transfer, guarding against input errors.
pub const MAX_TRANSFER_QUANTITY: i64 = 999_999;

/// Upper bound on free-text notes.
pub const MAX_NOTES_LEN: usize = 1000;

/// Request field names used in field-level errors.
pub mod fields {
    pub const ITEM: &str = "inventory_item_id";
    pub const FROM_WAREHOUSE: &str = "from_warehouse_id";
    pub const TO_WAREHOUSE: &str = "to_warehouse_id";
    pub const QUANTITY: &str = "quantity";
    pub const NOTES: &str = "notes";
}

/// Ledger status.
///
/// Only `Completed` is produced today; the other states are stored for an
/// approval workflow that has no transition logic.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Pending,
    Approved,
    Completed,
    Cancelled,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "pending",
            TransferStatus::Approved => "approved",
            TransferStatus::Completed => "completed",
            TransferStatus::Cancelled => "cancelled",
        }
    }
}

impl core::fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransferStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransferStatus::Pending),
            "approved" => Ok(TransferStatus::Approved),
            "completed" => Ok(TransferStatus::Completed),
            "cancelled" => Ok(TransferStatus::Cancelled),
            other => Err(DomainError::validation(format!("unknown transfer status '{other}'"))),
        }
    }
}

/// A caller's request to move stock of one item between two warehouses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub item_id: ItemId,
    pub from_warehouse_id: WarehouseId,
    pub to_warehouse_id: WarehouseId,
    pub quantity: i64,
    pub notes: Option<String>,
    pub initiated_by: Option<UserId>,
}

impl TransferRequest {
    /// Rules that need no storage lookups: distinct warehouses, quantity
    /// bounds and notes length.
    pub fn shape_errors(&self) -> FieldErrors {
        Self::partial_shape_errors(
            Some(self.from_warehouse_id),
            Some(self.to_warehouse_id),
            Some(self.quantity),
            self.notes.as_deref(),
        )
    }

    /// [`shape_errors`](Self::shape_errors) over a request that may be
    /// missing fields. A rule only runs when every field it reads is present.
    pub fn partial_shape_errors(
        from_warehouse_id: Option<WarehouseId>,
        to_warehouse_id: Option<WarehouseId>,
        quantity: Option<i64>,
        notes: Option<&str>,
    ) -> FieldErrors {
        let mut errors = FieldErrors::new();

        if let (Some(from), Some(to)) = (from_warehouse_id, to_warehouse_id) {
            if from == to {
                let msg = "Source and destination warehouses must be different.";
                errors.add(fields::FROM_WAREHOUSE, msg);
                errors.add(fields::TO_WAREHOUSE, msg);
            }
        }

        match quantity {
            Some(q) if q < 1 => {
                errors.add(fields::QUANTITY, "Transfer quantity must be at least 1.");
            }
            Some(q) if q > MAX_TRANSFER_QUANTITY => {
                errors.add(fields::QUANTITY, "Transfer quantity cannot exceed 999,999.");
            }
            _ => {}
        }

        if notes.is_some_and(|n| n.chars().count() > MAX_NOTES_LEN) {
            errors.add(fields::NOTES, "Notes cannot exceed 1000 characters.");
        }

        errors
    }
}

/// Append-only ledger entry for a committed movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub id: TransferId,
    pub item_id: ItemId,
    pub from_warehouse_id: WarehouseId,
    pub to_warehouse_id: WarehouseId,
    pub quantity: i64,
    pub transferred_at: DateTime<Utc>,
    pub status: TransferStatus,
    pub notes: Option<String>,
    pub transferred_by: Option<UserId>,
    pub approved_by: Option<UserId>,
    pub approved_at: Option<DateTime<Utc>>,
}

impl Entity for TransferRecord {
    type Id = TransferId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl TransferRecord {
    /// Ledger entry for a transfer that commits at `now`.
    pub fn completed(request: &TransferRequest, now: DateTime<Utc>) -> Self {
        Self {
            id: TransferId::new(),
            item_id: request.item_id,
            from_warehouse_id: request.from_warehouse_id,
            to_warehouse_id: request.to_warehouse_id,
            quantity: request.quantity,
            transferred_at: now,
            status: TransferStatus::Completed,
            notes: request
                .notes
                .as_ref()
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
            transferred_by: request.initiated_by,
            approved_by: None,
            approved_at: None,
        }
    }

    /// Whether this entry moved stock into or out of `warehouse_id`.
    pub fn touches(&self, warehouse_id: WarehouseId) -> bool {
        self.from_warehouse_id == warehouse_id || self.to_warehouse_id == warehouse_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(quantity: i64) -> TransferRequest {
        TransferRequest {
            item_id: ItemId::new(),
            from_warehouse_id: WarehouseId::new(),
            to_warehouse_id: WarehouseId::new(),
            quantity,
            notes: None,
            initiated_by: None,
        }
    }

    #[test]
    fn same_warehouse_flags_both_fields() {
        let mut req = request(5);
        req.to_warehouse_id = req.from_warehouse_id;
        let errors = req.shape_errors();
        assert!(errors.contains(fields::FROM_WAREHOUSE));
        assert!(errors.contains(fields::TO_WAREHOUSE));
    }

    #[test]
    fn quantity_bounds() {
        assert!(request(0).shape_errors().contains(fields::QUANTITY));
        assert!(request(-3).shape_errors().contains(fields::QUANTITY));
        assert!(request(1).shape_errors().is_empty());
        assert!(request(MAX_TRANSFER_QUANTITY).shape_errors().is_empty());
        assert!(request(MAX_TRANSFER_QUANTITY + 1).shape_errors().contains(fields::QUANTITY));
    }

    #[test]
    fn missing_warehouses_never_compare_equal() {
        let errors = TransferRequest::partial_shape_errors(None, None, Some(5), None);
        assert!(errors.is_empty());

        let wh = WarehouseId::new();
        let errors = TransferRequest::partial_shape_errors(Some(wh), None, None, None);
        assert!(errors.is_empty());
    }

    #[test]
    fn partial_checks_still_run_on_present_fields() {
        let wh = WarehouseId::new();
        let errors =
            TransferRequest::partial_shape_errors(Some(wh), Some(wh), Some(0), Some(""));
        assert!(errors.contains(fields::FROM_WAREHOUSE));
        assert!(errors.contains(fields::QUANTITY));
        assert!(!errors.contains(fields::NOTES));
    }

    #[test]
    fn long_notes_are_rejected() {
        let mut req = request(1);
        req.notes = Some("n".repeat(MAX_NOTES_LEN + 1));
        assert!(req.shape_errors().contains(fields::NOTES));
    }

    #[test]
    fn completed_record_copies_request() {
        let mut req = request(6);
        req.notes = Some("  restock north  ".to_string());
        let rec = TransferRecord::completed(&req, Utc::now());
        assert_eq!(rec.status, TransferStatus::Completed);
        assert_eq!(rec.quantity, 6);
        assert_eq!(rec.notes.as_deref(), Some("restock north"));
        assert!(rec.approved_by.is_none());
        assert!(rec.touches(req.to_warehouse_id));
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_value(TransferStatus::Completed).unwrap();
        assert_eq!(json, "completed");
        assert_eq!("cancelled".parse::<TransferStatus>().unwrap(), TransferStatus::Cancelled);
    }
}
