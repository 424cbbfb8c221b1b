use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::time::Instant;

use stockyard_core::{Entity, ItemId, WarehouseId};
use stockyard_inventory::{
    Balance, Item, ItemSearch, TransferRecord, TransferRequest, Warehouse, is_below_minimum,
    move_stock, search::contains_text,
};

use super::DEFAULT_LOCK_TIMEOUT;
use super::locks::{BalanceKey, RowLocks};
use super::query::{
    BalanceQuery, FilterOptions, ItemQuery, ItemSortField, ItemStatus, Page, SortOrder,
    StockStatus, TransferQuery,
};
use super::r#trait::{
    AppliedTransfer, BalanceView, CatalogStore, ItemStock, StockAdjustment, StockStore,
    StoreError, TransferView, WarehouseStock,
};

#[derive(Debug, Default)]
struct Tables {
    items: HashMap<ItemId, Item>,
    warehouses: HashMap<WarehouseId, Warehouse>,
    balances: HashMap<BalanceKey, Balance>,
    transfers: Vec<TransferRecord>,
}

/// In-memory inventory store.
///
/// Intended for tests/dev. All tables sit behind one `RwLock`, which makes
/// every commit a single critical section; per-pair [`RowLocks`] provide the
/// blocking and lock-timeout behaviour of row locks in Postgres.
#[derive(Debug)]
pub struct InMemoryInventoryStore {
    tables: RwLock<Tables>,
    locks: RowLocks,
    lock_timeout: Duration,
}

impl Default for InMemoryInventoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryInventoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            locks: RowLocks::default(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    /// Hold a pair's row lock, as a concurrent writer would.
    #[cfg(test)]
    pub(crate) async fn hold_row(
        &self,
        item_id: ItemId,
        warehouse_id: WarehouseId,
    ) -> tokio::sync::OwnedMutexGuard<()> {
        self.locks
            .acquire(
                BalanceKey::new(item_id, warehouse_id),
                Duration::from_secs(60),
                Instant::now() + Duration::from_secs(60),
            )
            .await
            .expect("row lock")
    }
}

impl Tables {
    fn item_stock(&self, item: &Item) -> ItemStock {
        let mut stocks: Vec<WarehouseStock> = self
            .balances
            .values()
            .filter(|b| b.item_id == item.id)
            .filter_map(|b| {
                self.warehouses.get(&b.warehouse_id).map(|w| WarehouseStock {
                    warehouse: w.clone(),
                    balance: b.clone(),
                })
            })
            .collect();
        stocks.sort_by(|a, b| {
            a.warehouse
                .name
                .cmp(&b.warehouse.name)
                .then(a.warehouse.id.cmp(&b.warehouse.id))
        });
        ItemStock {
            item: item.clone(),
            stocks,
        }
    }

    fn balance_view(&self, balance: &Balance) -> Option<BalanceView> {
        Some(BalanceView {
            balance: balance.clone(),
            item: self.items.get(&balance.item_id)?.clone(),
            warehouse: self.warehouses.get(&balance.warehouse_id)?.clone(),
        })
    }

    fn transfer_view(&self, record: &TransferRecord) -> Option<TransferView> {
        Some(TransferView {
            record: record.clone(),
            item: self.items.get(&record.item_id)?.clone(),
            from_warehouse: self.warehouses.get(&record.from_warehouse_id)?.clone(),
            to_warehouse: self.warehouses.get(&record.to_warehouse_id)?.clone(),
        })
    }

    fn ensure_pair_exists(&self, item_id: ItemId, warehouse_id: WarehouseId) -> Result<(), StoreError> {
        if !self.items.contains_key(&item_id) {
            return Err(StoreError::NotFound(format!("item {item_id}")));
        }
        if !self.warehouses.contains_key(&warehouse_id) {
            return Err(StoreError::NotFound(format!("warehouse {warehouse_id}")));
        }
        Ok(())
    }
}

fn item_matches(query: &ItemQuery, search: Option<&ItemSearch>, stock: &ItemStock) -> bool {
    let item = &stock.item;

    if search.is_some_and(|s| !s.matches(item)) {
        return false;
    }
    if query
        .category
        .as_deref()
        .is_some_and(|c| item.category.as_deref() != Some(c))
    {
        return false;
    }
    if query
        .brand
        .as_deref()
        .is_some_and(|b| item.brand.as_deref() != Some(b))
    {
        return false;
    }
    match query.status {
        Some(ItemStatus::Active) if !item.is_active => return false,
        Some(ItemStatus::Inactive) if item.is_active => return false,
        _ => {}
    }
    match query.stock_status {
        Some(StockStatus::LowStock)
            if !stock
                .stocks
                .iter()
                .any(|s| is_below_minimum(s.balance.quantity, item.minimum_stock_level)) =>
        {
            return false;
        }
        Some(StockStatus::OutOfStock) if stock.stocks.iter().any(|s| s.balance.quantity > 0) => {
            return false;
        }
        _ => {}
    }
    if query.min_stock.is_some() || query.max_stock.is_some() {
        let in_range = stock.stocks.iter().any(|s| {
            query.min_stock.is_none_or(|min| s.balance.quantity >= min)
                && query.max_stock.is_none_or(|max| s.balance.quantity <= max)
        });
        if !in_range {
            return false;
        }
    }
    true
}

fn compare_items(a: &ItemStock, b: &ItemStock, field: ItemSortField) -> Ordering {
    let ordering = match field {
        ItemSortField::Name => a.item.name.to_lowercase().cmp(&b.item.name.to_lowercase()),
        ItemSortField::Sku => a.item.sku.cmp(&b.item.sku),
        ItemSortField::Category => a.item.category.cmp(&b.item.category),
        ItemSortField::Brand => a.item.brand.cmp(&b.item.brand),
        ItemSortField::CreatedAt => a.item.created_at.cmp(&b.item.created_at),
        ItemSortField::TotalQuantity => a.total_quantity().cmp(&b.total_quantity()),
    };
    ordering.then(a.item.id.cmp(&b.item.id))
}

fn balance_matches(query: &BalanceQuery, view: &BalanceView) -> bool {
    if query.item_id.is_some_and(|id| view.item.id != id) {
        return false;
    }
    if query.warehouse_id.is_some_and(|id| view.warehouse.id != id) {
        return false;
    }
    if let Some(needle) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        if !contains_text(&view.item, needle) {
            return false;
        }
    }
    let quantity = view.balance.quantity;
    if query.min_quantity.is_some_and(|min| quantity < min)
        || query.max_quantity.is_some_and(|max| quantity > max)
    {
        return false;
    }
    if query.low_stock_only && !is_below_minimum(quantity, view.item.minimum_stock_level) {
        return false;
    }
    true
}

#[async_trait]
impl CatalogStore for InMemoryInventoryStore {
    async fn insert_item(&self, item: Item) -> Result<Item, StoreError> {
        let mut tables = self.write()?;
        if tables.items.values().any(|i| i.sku == item.sku) {
            return Err(StoreError::Conflict(format!("sku '{}' already exists", item.sku)));
        }
        tables.items.insert(*item.id(), item.clone());
        Ok(item)
    }

    async fn update_item(&self, item: Item) -> Result<Item, StoreError> {
        let mut tables = self.write()?;
        match tables.items.get_mut(&item.id) {
            Some(existing) => {
                *existing = item.clone();
                Ok(item)
            }
            None => Err(StoreError::NotFound(format!("item {}", item.id))),
        }
    }

    async fn delete_item(&self, id: ItemId) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        if !tables.items.contains_key(&id) {
            return Err(StoreError::NotFound(format!("item {id}")));
        }
        let referenced = tables.balances.keys().any(|k| k.item_id == id)
            || tables.transfers.iter().any(|t| t.item_id == id);
        if referenced {
            return Err(StoreError::Conflict(format!(
                "item {id} has stock balances or transfer history"
            )));
        }
        tables.items.remove(&id);
        Ok(())
    }

    async fn get_item(&self, id: ItemId) -> Result<Option<Item>, StoreError> {
        Ok(self.read()?.items.get(&id).cloned())
    }

    async fn get_item_stock(&self, id: ItemId) -> Result<Option<ItemStock>, StoreError> {
        let tables = self.read()?;
        Ok(tables.items.get(&id).map(|item| tables.item_stock(item)))
    }

    async fn search_items(&self, query: &ItemQuery) -> Result<Page<ItemStock>, StoreError> {
        let search = query.search.as_deref().and_then(ItemSearch::parse);
        let tables = self.read()?;
        let mut matched: Vec<ItemStock> = tables
            .items
            .values()
            .map(|item| tables.item_stock(item))
            .filter(|stock| item_matches(query, search.as_ref(), stock))
            .collect();

        matched.sort_by(|a, b| {
            let ordering = compare_items(a, b, query.sort_by);
            match query.sort_order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });
        Ok(query.page.paginate(matched))
    }

    async fn item_filter_options(&self) -> Result<FilterOptions, StoreError> {
        let tables = self.read()?;
        let active = || tables.items.values().filter(|i| i.is_active);
        let categories: BTreeSet<String> = active().filter_map(|i| i.category.clone()).collect();
        let brands: BTreeSet<String> = active().filter_map(|i| i.brand.clone()).collect();
        Ok(FilterOptions {
            categories: categories.into_iter().collect(),
            brands: brands.into_iter().collect(),
        })
    }

    async fn insert_warehouse(&self, warehouse: Warehouse) -> Result<Warehouse, StoreError> {
        self.write()?.warehouses.insert(*warehouse.id(), warehouse.clone());
        Ok(warehouse)
    }

    async fn get_warehouse(&self, id: WarehouseId) -> Result<Option<Warehouse>, StoreError> {
        Ok(self.read()?.warehouses.get(&id).cloned())
    }

    async fn list_warehouses(&self) -> Result<Vec<Warehouse>, StoreError> {
        let mut warehouses: Vec<Warehouse> = self.read()?.warehouses.values().cloned().collect();
        warehouses.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(warehouses)
    }
}

#[async_trait]
impl StockStore for InMemoryInventoryStore {
    async fn get_balance(
        &self,
        item_id: ItemId,
        warehouse_id: WarehouseId,
    ) -> Result<Option<Balance>, StoreError> {
        Ok(self
            .read()?
            .balances
            .get(&BalanceKey::new(item_id, warehouse_id))
            .cloned())
    }

    async fn list_balances(&self, query: &BalanceQuery) -> Result<Page<BalanceView>, StoreError> {
        let tables = self.read()?;
        let mut matched: Vec<BalanceView> = tables
            .balances
            .values()
            .filter_map(|b| tables.balance_view(b))
            .filter(|v| balance_matches(query, v))
            .collect();
        matched.sort_by(|a, b| {
            a.warehouse
                .name
                .cmp(&b.warehouse.name)
                .then_with(|| a.item.name.cmp(&b.item.name))
                .then(a.balance.id.cmp(&b.balance.id))
        });
        Ok(query.page.paginate(matched))
    }

    async fn apply_transfer(
        &self,
        request: &TransferRequest,
        deadline: Instant,
    ) -> Result<AppliedTransfer, StoreError> {
        let source_key = BalanceKey::new(request.item_id, request.from_warehouse_id);
        let destination_key = BalanceKey::new(request.item_id, request.to_warehouse_id);

        let _row = self.locks.acquire(source_key, self.lock_timeout, deadline).await?;
        if Instant::now() >= deadline {
            return Err(StoreError::DeadlineExceeded);
        }

        let mut tables = self.write()?;
        tables.ensure_pair_exists(request.item_id, request.to_warehouse_id)?;

        // Re-read under the lock; the caller's advisory check may be stale.
        let mut source = tables
            .balances
            .get(&source_key)
            .cloned()
            .ok_or(StoreError::SourceBalanceMissing)?;
        let now = Utc::now();
        let mut destination = tables
            .balances
            .get(&destination_key)
            .cloned()
            .unwrap_or_else(|| Balance::empty(request.item_id, request.to_warehouse_id, now));

        move_stock(&mut source, &mut destination, request.quantity, now)?;
        let record = TransferRecord::completed(request, now);

        tables.balances.insert(source_key, source.clone());
        tables.balances.insert(destination_key, destination.clone());
        tables.transfers.push(record.clone());

        Ok(AppliedTransfer {
            record,
            source,
            destination,
        })
    }

    async fn apply_adjustment(
        &self,
        adjustment: &StockAdjustment,
        deadline: Instant,
    ) -> Result<Balance, StoreError> {
        let key = BalanceKey::new(adjustment.item_id, adjustment.warehouse_id);
        let _row = self.locks.acquire(key, self.lock_timeout, deadline).await?;
        if Instant::now() >= deadline {
            return Err(StoreError::DeadlineExceeded);
        }

        let mut tables = self.write()?;
        tables.ensure_pair_exists(adjustment.item_id, adjustment.warehouse_id)?;

        let now = Utc::now();
        let mut balance = tables
            .balances
            .get(&key)
            .cloned()
            .unwrap_or_else(|| Balance::empty(adjustment.item_id, adjustment.warehouse_id, now));
        balance.adjust(adjustment.delta, now)?;
        tables.balances.insert(key, balance.clone());
        Ok(balance)
    }

    async fn list_transfers(&self, query: &TransferQuery) -> Result<Page<TransferView>, StoreError> {
        let tables = self.read()?;
        let mut matched: Vec<TransferView> = tables
            .transfers
            .iter()
            .filter(|t| query.item_id.is_none_or(|id| t.item_id == id))
            .filter(|t| query.warehouse_id.is_none_or(|id| t.touches(id)))
            .filter_map(|t| tables.transfer_view(t))
            .collect();
        matched.sort_by(|a, b| {
            b.record
                .transferred_at
                .cmp(&a.record.transferred_at)
                .then(b.record.id.cmp(&a.record.id))
        });
        Ok(query.page.paginate(matched))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::query::PageRequest;
    use stockyard_inventory::{ItemDraft, WarehouseDraft};

    fn far() -> Instant {
        Instant::now() + Duration::from_secs(5)
    }

    fn item(sku: &str, name: &str, minimum: i64) -> Item {
        Item::create(
            ItemDraft {
                sku: sku.to_string(),
                name: name.to_string(),
                description: None,
                category: Some("Hardware".to_string()),
                brand: None,
                unit_of_measure: "pcs".to_string(),
                minimum_stock_level: minimum,
                maximum_stock_level: None,
                is_active: None,
            },
            Utc::now(),
        )
        .unwrap()
    }

    fn warehouse(name: &str) -> Warehouse {
        Warehouse::create(
            WarehouseDraft {
                name: name.to_string(),
                location: None,
                address: None,
                contact_person: None,
                phone: None,
                email: None,
                is_active: None,
            },
            Utc::now(),
        )
        .unwrap()
    }

    async fn seeded() -> (InMemoryInventoryStore, Item, Warehouse, Warehouse) {
        let store = InMemoryInventoryStore::new();
        let item = store.insert_item(item("BOLT-10", "Hex bolt", 10)).await.unwrap();
        let a = store.insert_warehouse(warehouse("Alpha")).await.unwrap();
        let b = store.insert_warehouse(warehouse("Bravo")).await.unwrap();
        store
            .apply_adjustment(
                &StockAdjustment {
                    item_id: item.id,
                    warehouse_id: a.id,
                    delta: 50,
                    reason: None,
                },
                far(),
            )
            .await
            .unwrap();
        (store, item, a, b)
    }

    fn request(item: &Item, from: &Warehouse, to: &Warehouse, quantity: i64) -> TransferRequest {
        TransferRequest {
            item_id: item.id,
            from_warehouse_id: from.id,
            to_warehouse_id: to.id,
            quantity,
            notes: None,
            initiated_by: None,
        }
    }

    #[tokio::test]
    async fn transfer_creates_destination_and_appends_ledger() {
        let (store, item, a, b) = seeded().await;
        let applied = store
            .apply_transfer(&request(&item, &a, &b, 20), far())
            .await
            .unwrap();

        assert_eq!(applied.source.quantity, 30);
        assert_eq!(applied.destination.quantity, 20);
        assert_eq!(store.get_balance(item.id, b.id).await.unwrap().unwrap().quantity, 20);

        let ledger = store.list_transfers(&TransferQuery::default()).await.unwrap();
        assert_eq!(ledger.total, 1);
        assert_eq!(ledger.data[0].record.quantity, 20);
    }

    #[tokio::test]
    async fn missing_source_balance_is_reported() {
        let (store, item, a, b) = seeded().await;
        let err = store
            .apply_transfer(&request(&item, &b, &a, 1), far())
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::SourceBalanceMissing);
    }

    #[tokio::test]
    async fn insufficient_stock_writes_nothing() {
        let (store, item, a, b) = seeded().await;
        let err = store
            .apply_transfer(&request(&item, &a, &b, 51), far())
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::InsufficientStock { available: 50 });
        assert_eq!(store.get_balance(item.id, a.id).await.unwrap().unwrap().quantity, 50);
        assert!(store.get_balance(item.id, b.id).await.unwrap().is_none());
        assert_eq!(store.list_transfers(&TransferQuery::default()).await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn held_source_row_times_out() {
        let (store, item, a, b) = seeded().await;
        let store = store.with_lock_timeout(Duration::from_millis(20));
        let _held = store.hold_row(item.id, a.id).await;
        let err = store
            .apply_transfer(&request(&item, &a, &b, 1), far())
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn referenced_items_cannot_be_deleted() {
        let (store, item, _, _) = seeded().await;
        assert!(matches!(
            store.delete_item(item.id).await,
            Err(StoreError::Conflict(_))
        ));

        let unused = store.insert_item(super::tests::item("NUT-5", "Nut", 0)).await.unwrap();
        store.delete_item(unused.id).await.unwrap();
        assert!(store.get_item(unused.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_sku_conflicts() {
        let (store, _, _, _) = seeded().await;
        let err = store
            .insert_item(item("BOLT-10", "Other bolt", 0))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn item_query_filters_by_stock_status() {
        let (store, bolt, a, _) = seeded().await;
        let washer = store.insert_item(item("WSH-1", "Washer", 5)).await.unwrap();
        store
            .apply_adjustment(
                &StockAdjustment {
                    item_id: washer.id,
                    warehouse_id: a.id,
                    delta: 3,
                    reason: None,
                },
                far(),
            )
            .await
            .unwrap();
        let gasket = store.insert_item(item("GSK-1", "Gasket", 0)).await.unwrap();

        let low = store
            .search_items(&ItemQuery {
                stock_status: Some(StockStatus::LowStock),
                ..ItemQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(low.data.len(), 1);
        assert_eq!(low.data[0].item.id, washer.id);

        let out = store
            .search_items(&ItemQuery {
                stock_status: Some(StockStatus::OutOfStock),
                ..ItemQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(out.data.len(), 1);
        assert_eq!(out.data[0].item.id, gasket.id);

        let by_quantity = store
            .search_items(&ItemQuery {
                sort_by: ItemSortField::TotalQuantity,
                sort_order: SortOrder::Desc,
                page: PageRequest::new(Some(1), Some(2)),
                ..ItemQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(by_quantity.total, 3);
        assert_eq!(by_quantity.last_page, 2);
        assert_eq!(by_quantity.data[0].item.id, bolt.id);
    }

    #[tokio::test]
    async fn balance_listing_filters_low_stock() {
        let (store, item, a, b) = seeded().await;
        store
            .apply_transfer(&request(&item, &a, &b, 45), far())
            .await
            .unwrap();

        let low = store
            .list_balances(&BalanceQuery {
                low_stock_only: true,
                ..BalanceQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(low.total, 1);
        assert_eq!(low.data[0].warehouse.id, a.id);
        assert_eq!(low.data[0].balance.quantity, 5);
    }
}
