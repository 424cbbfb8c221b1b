//! Request/response DTOs and JSON mapping helpers.
//!
//! Request bodies use optional fields so a missing value becomes a field
//! error in the 422 payload instead of an opaque deserialization failure.

use axum::response::Response;
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};

use stockyard_core::{FieldErrors, ItemId, UserId, WarehouseId};
use stockyard_infra::store::{
    BalanceQuery, BalanceView, ItemQuery, ItemSortField, ItemStatus, ItemStock, Page, PageRequest,
    SortOrder, StockStatus, TransferQuery, TransferView,
};
use stockyard_infra::{AdjustStockCommand, CompletedAdjustment, CompletedTransfer, TransferCommand};
use stockyard_inventory::transfer::fields;
use stockyard_inventory::{
    Balance, Item, ItemDraft, LowStockSignal, Warehouse, WarehouseDraft, is_below_minimum,
};

use crate::app::errors::parse_id;

pub const DEFAULT_SEARCH_LIMIT: u32 = 10;
pub const MAX_SEARCH_LIMIT: u32 = 50;

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct CreateTransferRequest {
    pub inventory_item_id: Option<String>,
    pub from_warehouse_id: Option<String>,
    pub to_warehouse_id: Option<String>,
    pub quantity: Option<i64>,
    pub notes: Option<String>,
}

impl CreateTransferRequest {
    /// Parse into a command. On failure the errors also include the quantity
    /// and notes rules, so the caller sees every problem at once.
    pub fn into_command(self, initiated_by: UserId) -> Result<TransferCommand, FieldErrors> {
        let mut errors = FieldErrors::new();
        let item_id = required_id::<ItemId>(
            self.inventory_item_id,
            fields::ITEM,
            "The inventory item",
            &mut errors,
        );
        let from = required_id::<WarehouseId>(
            self.from_warehouse_id,
            fields::FROM_WAREHOUSE,
            "The source warehouse",
            &mut errors,
        );
        let to = required_id::<WarehouseId>(
            self.to_warehouse_id,
            fields::TO_WAREHOUSE,
            "The destination warehouse",
            &mut errors,
        );
        if self.quantity.is_none() {
            errors.add(fields::QUANTITY, "Transfer quantity is required.");
        }

        let notes = blank_to_none(self.notes);

        match (item_id, from, to, self.quantity) {
            (Some(item_id), Some(from_warehouse_id), Some(to_warehouse_id), Some(quantity))
                if errors.is_empty() =>
            {
                Ok(TransferCommand {
                    item_id,
                    from_warehouse_id,
                    to_warehouse_id,
                    quantity,
                    notes,
                    initiated_by: Some(initiated_by),
                })
            }
            _ => {
                errors.merge(TransferCommand::partial_shape_errors(
                    from,
                    to,
                    self.quantity,
                    notes.as_deref(),
                ));
                Err(errors)
            }
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AdjustStockRequest {
    pub inventory_item_id: Option<String>,
    pub warehouse_id: Option<String>,
    pub delta: Option<i64>,
    pub reason: Option<String>,
}

impl AdjustStockRequest {
    pub fn into_command(self) -> Result<AdjustStockCommand, FieldErrors> {
        let mut errors = FieldErrors::new();
        let item_id = required_id::<ItemId>(
            self.inventory_item_id,
            stockyard_infra::adjustment::fields::ITEM,
            "The inventory item",
            &mut errors,
        );
        let warehouse_id = required_id::<WarehouseId>(
            self.warehouse_id,
            stockyard_infra::adjustment::fields::WAREHOUSE,
            "The warehouse",
            &mut errors,
        );
        if self.delta.is_none() {
            errors.add(stockyard_infra::adjustment::fields::DELTA, "Adjustment is required.");
        }

        match (item_id, warehouse_id, self.delta) {
            (Some(item_id), Some(warehouse_id), Some(delta)) if errors.is_empty() => {
                Ok(AdjustStockCommand {
                    item_id,
                    warehouse_id,
                    delta,
                    reason: blank_to_none(self.reason),
                })
            }
            _ => Err(errors),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ItemPayload {
    pub sku: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub brand: Option<String>,
    pub unit_of_measure: Option<String>,
    pub minimum_stock_level: Option<i64>,
    pub maximum_stock_level: Option<i64>,
    pub is_active: Option<bool>,
}

impl ItemPayload {
    /// Draft for a new item plus the errors only the wire format can detect.
    pub fn into_create_draft(self) -> (ItemDraft, FieldErrors) {
        let mut errors = FieldErrors::new();
        if self.minimum_stock_level.is_none() {
            errors.add("minimum_stock_level", "Minimum stock level is required.");
        }
        let draft = ItemDraft {
            sku: self.sku.unwrap_or_default(),
            name: self.name.unwrap_or_default(),
            description: self.description,
            category: self.category,
            brand: self.brand,
            unit_of_measure: self.unit_of_measure.unwrap_or_default(),
            minimum_stock_level: self.minimum_stock_level.unwrap_or(0),
            maximum_stock_level: self.maximum_stock_level,
            is_active: self.is_active,
        };
        (draft, errors)
    }

    /// Absent fields keep the item's current values.
    pub fn into_update_draft(self, existing: &Item) -> ItemDraft {
        ItemDraft {
            sku: self.sku.unwrap_or_else(|| existing.sku.clone()),
            name: self.name.unwrap_or_else(|| existing.name.clone()),
            description: self.description.or_else(|| existing.description.clone()),
            category: self.category.or_else(|| existing.category.clone()),
            brand: self.brand.or_else(|| existing.brand.clone()),
            unit_of_measure: self
                .unit_of_measure
                .unwrap_or_else(|| existing.unit_of_measure.clone()),
            minimum_stock_level: self
                .minimum_stock_level
                .unwrap_or(existing.minimum_stock_level),
            maximum_stock_level: self.maximum_stock_level.or(existing.maximum_stock_level),
            is_active: self.is_active,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct WarehousePayload {
    pub name: Option<String>,
    pub location: Option<String>,
    pub address: Option<String>,
    pub contact_person: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub is_active: Option<bool>,
}

impl From<WarehousePayload> for WarehouseDraft {
    fn from(p: WarehousePayload) -> Self {
        WarehouseDraft {
            name: p.name.unwrap_or_default(),
            location: p.location,
            address: p.address,
            contact_person: p.contact_person,
            phone: p.phone,
            email: p.email,
            is_active: p.is_active,
        }
    }
}

fn required_id<T: std::str::FromStr>(
    raw: Option<String>,
    field: &'static str,
    label: &str,
    errors: &mut FieldErrors,
) -> Option<T> {
    match raw.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        None => {
            errors.add(field, format!("{label} is required."));
            None
        }
        Some(s) => match s.parse::<T>() {
            Ok(id) => Some(id),
            Err(_) => {
                errors.add(field, format!("{label} must be a valid identifier."));
                None
            }
        },
    }
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

// ---------------------------------------------------------------------------
// Query strings
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct BalanceListParams {
    pub item_id: Option<String>,
    pub warehouse_id: Option<String>,
    pub search: Option<String>,
    pub min_quantity: Option<i64>,
    pub max_quantity: Option<i64>,
    pub low_stock: Option<bool>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl BalanceListParams {
    pub fn into_query(self) -> Result<BalanceQuery, Response> {
        Ok(BalanceQuery {
            item_id: optional_id(self.item_id, "item_id")?,
            warehouse_id: optional_id(self.warehouse_id, "warehouse_id")?,
            search: blank_to_none(self.search),
            min_quantity: self.min_quantity,
            max_quantity: self.max_quantity,
            low_stock_only: self.low_stock.unwrap_or(false),
            page: PageRequest::new(self.page, self.per_page),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct WarehouseInventoryParams {
    pub search: Option<String>,
    pub min_quantity: Option<i64>,
    pub max_quantity: Option<i64>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl WarehouseInventoryParams {
    pub fn into_query(self, warehouse_id: WarehouseId) -> BalanceQuery {
        BalanceQuery {
            item_id: None,
            warehouse_id: Some(warehouse_id),
            search: blank_to_none(self.search),
            min_quantity: self.min_quantity,
            max_quantity: self.max_quantity,
            low_stock_only: false,
            page: PageRequest::new(self.page, self.per_page),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ItemListParams {
    pub search: Option<String>,
    pub category: Option<String>,
    pub brand: Option<String>,
    pub status: Option<ItemStatus>,
    pub stock_status: Option<StockStatus>,
    pub min_stock: Option<i64>,
    pub max_stock: Option<i64>,
    pub sort_by: Option<ItemSortField>,
    pub sort_order: Option<SortOrder>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl From<ItemListParams> for ItemQuery {
    fn from(p: ItemListParams) -> Self {
        ItemQuery {
            search: blank_to_none(p.search),
            category: blank_to_none(p.category),
            brand: blank_to_none(p.brand),
            status: p.status,
            stock_status: p.stock_status,
            min_stock: p.min_stock,
            max_stock: p.max_stock,
            sort_by: p.sort_by.unwrap_or_default(),
            sort_order: p.sort_order.unwrap_or_default(),
            page: PageRequest::new(p.page, p.per_page),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    pub limit: Option<u32>,
}

impl SearchParams {
    /// `None` when there is nothing to search for.
    pub fn into_query(self) -> Option<ItemQuery> {
        let q = blank_to_none(self.q)?;
        let limit = self
            .limit
            .unwrap_or(DEFAULT_SEARCH_LIMIT)
            .clamp(1, MAX_SEARCH_LIMIT);
        Some(ItemQuery {
            search: Some(q),
            status: Some(ItemStatus::Active),
            page: PageRequest::new(Some(1), Some(limit)),
            ..ItemQuery::default()
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl PageParams {
    pub fn page(&self) -> PageRequest {
        PageRequest::new(self.page, self.per_page)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct TransferListParams {
    pub item_id: Option<String>,
    pub warehouse_id: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl TransferListParams {
    pub fn into_query(self) -> Result<TransferQuery, Response> {
        Ok(TransferQuery {
            item_id: optional_id(self.item_id, "item_id")?,
            warehouse_id: optional_id(self.warehouse_id, "warehouse_id")?,
            page: PageRequest::new(self.page, self.per_page),
        })
    }
}

fn optional_id<T: std::str::FromStr>(
    raw: Option<String>,
    what: &'static str,
) -> Result<Option<T>, Response> {
    match blank_to_none(raw) {
        None => Ok(None),
        Some(s) => parse_id(s.trim(), what).map(Some),
    }
}

// ---------------------------------------------------------------------------
// Response mapping
// ---------------------------------------------------------------------------

pub fn paginated(page: Page<JsonValue>) -> JsonValue {
    json!({
        "data": page.data,
        "pagination": {
            "current_page": page.current_page,
            "last_page": page.last_page,
            "per_page": page.per_page,
            "total": page.total,
            "from": page.from,
            "to": page.to,
        },
    })
}

pub fn item_json(item: &Item) -> JsonValue {
    json!(item)
}

pub fn warehouse_json(warehouse: &Warehouse) -> JsonValue {
    json!(warehouse)
}

pub fn balance_json(balance: &Balance) -> JsonValue {
    json!({
        "id": balance.id,
        "inventory_item_id": balance.item_id,
        "warehouse_id": balance.warehouse_id,
        "quantity": balance.quantity,
        "reserved_quantity": balance.reserved_quantity,
        "available_quantity": balance.available_quantity(),
        "last_updated_at": balance.last_updated_at,
    })
}

pub fn balance_view_json(view: &BalanceView) -> JsonValue {
    let mut value = balance_json(&view.balance);
    if let Some(obj) = value.as_object_mut() {
        obj.insert(
            "is_low_stock".to_string(),
            json!(is_below_minimum(view.balance.quantity, view.item.minimum_stock_level)),
        );
        obj.insert("inventory_item".to_string(), item_json(&view.item));
        obj.insert("warehouse".to_string(), warehouse_json(&view.warehouse));
    }
    value
}

pub fn item_stock_json(stock: &ItemStock) -> JsonValue {
    let mut value = item_json(&stock.item);
    let stocks: Vec<JsonValue> = stock
        .stocks
        .iter()
        .map(|s| {
            let mut entry = balance_json(&s.balance);
            if let Some(obj) = entry.as_object_mut() {
                obj.insert(
                    "is_low_stock".to_string(),
                    json!(is_below_minimum(s.balance.quantity, stock.item.minimum_stock_level)),
                );
                obj.insert("warehouse".to_string(), warehouse_json(&s.warehouse));
            }
            entry
        })
        .collect();
    if let Some(obj) = value.as_object_mut() {
        obj.insert("total_quantity".to_string(), json!(stock.total_quantity()));
        obj.insert("available_quantity".to_string(), json!(stock.total_available()));
        obj.insert("stocks".to_string(), JsonValue::Array(stocks));
    }
    value
}

/// Compact shape for autocomplete results.
pub fn item_suggestion_json(stock: &ItemStock) -> JsonValue {
    json!({
        "id": stock.item.id,
        "sku": stock.item.sku,
        "name": stock.item.name,
        "category": stock.item.category,
        "brand": stock.item.brand,
        "unit_of_measure": stock.item.unit_of_measure,
        "total_quantity": stock.total_quantity(),
    })
}

pub fn transfer_view_json(view: &TransferView) -> JsonValue {
    let mut value = json!(view.record);
    if let Some(obj) = value.as_object_mut() {
        obj.insert("inventory_item".to_string(), item_json(&view.item));
        obj.insert("from_warehouse".to_string(), warehouse_json(&view.from_warehouse));
        obj.insert("to_warehouse".to_string(), warehouse_json(&view.to_warehouse));
    }
    value
}

pub fn completed_transfer_json(done: &CompletedTransfer) -> JsonValue {
    let mut value = json!(done.record);
    if let Some(obj) = value.as_object_mut() {
        obj.insert("inventory_item".to_string(), item_json(&done.item));
        obj.insert("from_warehouse".to_string(), warehouse_json(&done.from_warehouse));
        obj.insert("to_warehouse".to_string(), warehouse_json(&done.to_warehouse));
        obj.insert("source_balance".to_string(), balance_json(&done.source));
        obj.insert("destination_balance".to_string(), balance_json(&done.destination));
        obj.insert(
            "low_stock_alerts".to_string(),
            JsonValue::Array(done.low_stock_signals.iter().map(low_stock_json).collect()),
        );
    }
    value
}

pub fn adjustment_json(done: &CompletedAdjustment) -> JsonValue {
    let mut value = balance_json(&done.balance);
    if let Some(obj) = value.as_object_mut() {
        obj.insert("inventory_item".to_string(), item_json(&done.item));
        obj.insert("warehouse".to_string(), warehouse_json(&done.warehouse));
        obj.insert(
            "low_stock_alert".to_string(),
            done.low_stock_signal.as_ref().map_or(JsonValue::Null, low_stock_json),
        );
    }
    value
}

pub fn low_stock_json(signal: &LowStockSignal) -> JsonValue {
    json!({
        "inventory_item_id": signal.item.id,
        "sku": signal.item.sku,
        "item_name": signal.item.name,
        "warehouse_id": signal.warehouse.id,
        "warehouse_name": signal.warehouse.name,
        "current_quantity": signal.balance.quantity,
        "minimum_stock_level": signal.item.minimum_stock_level,
        "shortage": signal.shortage(),
        "detected_at": signal.detected_at,
    })
}
