//! Postgres-backed inventory store.
//!
//! ## Transfer transaction
//!
//! `apply_transfer` runs one transaction:
//!
//! 1. `SET LOCAL lock_timeout` / `statement_timeout` from the lock timeout and
//!    the caller's remaining deadline
//! 2. `SELECT ... FOR UPDATE` on the source balance
//! 3. re-check available stock, then `UPDATE` the source
//! 4. `INSERT ... ON CONFLICT (item_id, warehouse_id) DO UPDATE` the
//!    destination, so concurrent first transfers into a pair converge on one row
//! 5. `INSERT` the ledger entry
//! 6. `COMMIT`
//!
//! Any early return drops the transaction, which rolls it back.
//!
//! ## Error Mapping
//!
//! | PostgreSQL Error Code | StoreError | Scenario |
//! |-----------------------|------------|----------|
//! | `55P03` | `LockTimeout` | Row lock not granted within `lock_timeout` |
//! | `40P01` | `LockTimeout` | Deadlock between opposite transfers |
//! | `40001` | `Serialization` | Serialization failure |
//! | `57014` | `DeadlineExceeded` | `statement_timeout` fired |
//! | `23505` | `Conflict` | Duplicate SKU or balance pair |
//! | `23503` | `Conflict` | Row still referenced (item delete) |
//! | `23514` | `Rejected` | Check constraint (negative quantity etc.) |
//! | other / pool errors | `Backend` | |

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder, Row, Transaction};
use tokio::time::Instant;
use tracing::instrument;
use uuid::Uuid;

use stockyard_core::{BalanceId, ItemId, TransferId, UserId, WarehouseId};
use stockyard_inventory::{
    Balance, Item, ItemSearch, TransferRecord, TransferRequest, TransferStatus, Warehouse,
};

use super::DEFAULT_LOCK_TIMEOUT;
use super::query::{
    BalanceQuery, FilterOptions, ItemQuery, ItemSortField, ItemStatus, Page, SortOrder,
    StockStatus, TransferQuery,
};
use super::r#trait::{
    AppliedTransfer, BalanceView, CatalogStore, ItemStock, StockAdjustment, StockStore,
    StoreError, TransferView, WarehouseStock,
};

const SCHEMA: &str = include_str!("../../migrations/0001_inventory.sql");

/// Select list for a balance row aliased `b`; matches `balance_columns("b")`.
macro_rules! balance_select {
    () => {
        "b.id AS b_id, b.item_id AS b_item_id, b.warehouse_id AS b_warehouse_id, \
         b.quantity AS b_quantity, b.reserved_quantity AS b_reserved_quantity, \
         b.last_updated_at AS b_last_updated_at"
    };
}

const BOUND_TIMEOUTS_SQL: &str =
    "SELECT set_config('lock_timeout', $1, true), set_config('statement_timeout', $2, true)";

const LOCK_BALANCE_SQL: &str = concat!(
    "SELECT ",
    balance_select!(),
    " FROM stock_balances b WHERE b.item_id = $1 AND b.warehouse_id = $2 FOR UPDATE"
);

const UPDATE_BALANCE_SQL: &str =
    "UPDATE stock_balances SET quantity = $1, last_updated_at = $2 WHERE id = $3";

const UPSERT_DESTINATION_SQL: &str = concat!(
    "INSERT INTO stock_balances AS b \
         (id, item_id, warehouse_id, quantity, reserved_quantity, last_updated_at) \
     VALUES ($1, $2, $3, $4, 0, $5) \
     ON CONFLICT (item_id, warehouse_id) DO UPDATE SET \
         quantity = b.quantity + EXCLUDED.quantity, \
         last_updated_at = EXCLUDED.last_updated_at \
     RETURNING ",
    balance_select!()
);

const INSERT_BALANCE_SQL: &str = "INSERT INTO stock_balances \
     (id, item_id, warehouse_id, quantity, reserved_quantity, last_updated_at) \
     VALUES ($1, $2, $3, $4, 0, $5)";

const INSERT_TRANSFER_SQL: &str = "INSERT INTO stock_transfers ( \
     id, item_id, from_warehouse_id, to_warehouse_id, quantity, transferred_at, \
     status, notes, transferred_by, approved_by, approved_at) \
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)";

/// Postgres-backed catalog, balances and transfer ledger.
///
/// `Send + Sync`; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct PostgresInventoryStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PostgresInventoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Open a pool against `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Apply the schema. Idempotent.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Begin a transaction whose lock waits and statements respect both the
    /// configured lock timeout and the caller's deadline.
    async fn begin_bounded(
        &self,
        operation: &'static str,
        deadline: Instant,
    ) -> Result<Transaction<'static, Postgres>, StoreError> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(StoreError::DeadlineExceeded);
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;

        let lock_ms = self.lock_timeout.min(remaining).as_millis().max(1);
        let statement_ms = remaining.as_millis().max(1);
        let conn: &mut PgConnection = &mut tx;
        // set_config(.., true) is SET LOCAL: both reset at commit or rollback.
        sqlx::query(BOUND_TIMEOUTS_SQL)
            .bind(format!("{lock_ms}ms"))
            .bind(format!("{statement_ms}ms"))
            .execute(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        Ok(tx)
    }

    async fn stocks_for_items(
        &self,
        item_ids: &[ItemId],
    ) -> Result<HashMap<ItemId, Vec<WarehouseStock>>, StoreError> {
        let mut grouped: HashMap<ItemId, Vec<WarehouseStock>> = HashMap::new();
        if item_ids.is_empty() {
            return Ok(grouped);
        }

        let ids: Vec<Uuid> = item_ids.iter().map(|id| Uuid::from(*id)).collect();
        let sql = format!(
            "SELECT {}, {} FROM stock_balances b JOIN warehouses w ON w.id = b.warehouse_id \
             WHERE b.item_id = ANY($1) ORDER BY w.name, w.id",
            balance_columns("b"),
            warehouse_columns("w"),
        );
        let rows = sqlx::query(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("stocks_for_items", e))?;

        for row in rows {
            let balance = balance_from_row(&row, "b").map_err(|e| decode_error("balance", e))?;
            let warehouse =
                warehouse_from_row(&row, "w").map_err(|e| decode_error("warehouse", e))?;
            grouped
                .entry(balance.item_id)
                .or_default()
                .push(WarehouseStock { warehouse, balance });
        }
        Ok(grouped)
    }
}

#[async_trait]
impl CatalogStore for PostgresInventoryStore {
    #[instrument(skip(self, item), fields(sku = %item.sku), err)]
    async fn insert_item(&self, item: Item) -> Result<Item, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO inventory_items (
                id, sku, name, description, category, brand, unit_of_measure,
                minimum_stock_level, maximum_stock_level, is_active, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(item.id.as_uuid())
        .bind(&item.sku)
        .bind(&item.name)
        .bind(&item.description)
        .bind(&item.category)
        .bind(&item.brand)
        .bind(&item.unit_of_measure)
        .bind(item.minimum_stock_level)
        .bind(item.maximum_stock_level)
        .bind(item.is_active)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_item", e))?;
        Ok(item)
    }

    #[instrument(skip(self, item), fields(item_id = %item.id), err)]
    async fn update_item(&self, item: Item) -> Result<Item, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE inventory_items SET
                name = $2, description = $3, category = $4, brand = $5,
                unit_of_measure = $6, minimum_stock_level = $7, maximum_stock_level = $8,
                is_active = $9, updated_at = $10
            WHERE id = $1
            "#,
        )
        .bind(item.id.as_uuid())
        .bind(&item.name)
        .bind(&item.description)
        .bind(&item.category)
        .bind(&item.brand)
        .bind(&item.unit_of_measure)
        .bind(item.minimum_stock_level)
        .bind(item.maximum_stock_level)
        .bind(item.is_active)
        .bind(item.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_item", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("item {}", item.id)));
        }
        Ok(item)
    }

    #[instrument(skip(self), fields(item_id = %id), err)]
    async fn delete_item(&self, id: ItemId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM inventory_items WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_item", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("item {id}")));
        }
        Ok(())
    }

    async fn get_item(&self, id: ItemId) -> Result<Option<Item>, StoreError> {
        let sql = format!("SELECT {} FROM inventory_items i WHERE i.id = $1", item_columns("i"));
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_item", e))?;
        row.map(|r| item_from_row(&r, "i").map_err(|e| decode_error("item", e)))
            .transpose()
    }

    async fn get_item_stock(&self, id: ItemId) -> Result<Option<ItemStock>, StoreError> {
        let Some(item) = self.get_item(id).await? else {
            return Ok(None);
        };
        let mut stocks = self.stocks_for_items(&[id]).await?;
        Ok(Some(ItemStock {
            stocks: stocks.remove(&id).unwrap_or_default(),
            item,
        }))
    }

    #[instrument(skip(self, query), err)]
    async fn search_items(&self, query: &ItemQuery) -> Result<Page<ItemStock>, StoreError> {
        let search = query.search.as_deref().and_then(ItemSearch::parse);

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM inventory_items i");
        push_item_filters(&mut count, query, search.as_ref());
        let total: i64 = count
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("search_items", e))?;

        let mut select = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM inventory_items i",
            item_columns("i")
        ));
        push_item_filters(&mut select, query, search.as_ref());
        let direction = match query.sort_order {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        };
        let sort_expr = match query.sort_by {
            ItemSortField::Name => "lower(i.name)",
            ItemSortField::Sku => "i.sku",
            ItemSortField::Category => "i.category",
            ItemSortField::Brand => "i.brand",
            ItemSortField::CreatedAt => "i.created_at",
            ItemSortField::TotalQuantity => {
                "COALESCE((SELECT SUM(sb.quantity) FROM stock_balances sb WHERE sb.item_id = i.id), 0)"
            }
        };
        select.push(format!(" ORDER BY {sort_expr} {direction}, i.id {direction}"));
        select.push(" LIMIT ");
        select.push_bind(i64::from(query.page.per_page));
        select.push(" OFFSET ");
        select.push_bind(query.page.offset() as i64);

        let rows = select
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("search_items", e))?;
        let items = rows
            .iter()
            .map(|r| item_from_row(r, "i"))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| decode_error("item", e))?;

        let ids: Vec<ItemId> = items.iter().map(|i| i.id).collect();
        let mut stocks = self.stocks_for_items(&ids).await?;
        let data = items
            .into_iter()
            .map(|item| ItemStock {
                stocks: stocks.remove(&item.id).unwrap_or_default(),
                item,
            })
            .collect();

        Ok(Page::new(data, total.max(0) as u64, query.page))
    }

    async fn item_filter_options(&self) -> Result<FilterOptions, StoreError> {
        let categories = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT category FROM inventory_items \
             WHERE is_active AND category IS NOT NULL ORDER BY category",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("item_filter_options", e))?;
        let brands = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT brand FROM inventory_items \
             WHERE is_active AND brand IS NOT NULL ORDER BY brand",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("item_filter_options", e))?;
        Ok(FilterOptions { categories, brands })
    }

    #[instrument(skip(self, warehouse), fields(warehouse_id = %warehouse.id), err)]
    async fn insert_warehouse(&self, warehouse: Warehouse) -> Result<Warehouse, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO warehouses (
                id, name, location, address, contact_person, phone, email,
                is_active, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(warehouse.id.as_uuid())
        .bind(&warehouse.name)
        .bind(&warehouse.location)
        .bind(&warehouse.address)
        .bind(&warehouse.contact_person)
        .bind(&warehouse.phone)
        .bind(&warehouse.email)
        .bind(warehouse.is_active)
        .bind(warehouse.created_at)
        .bind(warehouse.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_warehouse", e))?;
        Ok(warehouse)
    }

    async fn get_warehouse(&self, id: WarehouseId) -> Result<Option<Warehouse>, StoreError> {
        let sql = format!("SELECT {} FROM warehouses w WHERE w.id = $1", warehouse_columns("w"));
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_warehouse", e))?;
        row.map(|r| warehouse_from_row(&r, "w").map_err(|e| decode_error("warehouse", e)))
            .transpose()
    }

    async fn list_warehouses(&self) -> Result<Vec<Warehouse>, StoreError> {
        let sql = format!(
            "SELECT {} FROM warehouses w ORDER BY w.name, w.id",
            warehouse_columns("w")
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_warehouses", e))?;
        rows.iter()
            .map(|r| warehouse_from_row(r, "w"))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| decode_error("warehouse", e))
    }
}

#[async_trait]
impl StockStore for PostgresInventoryStore {
    async fn get_balance(
        &self,
        item_id: ItemId,
        warehouse_id: WarehouseId,
    ) -> Result<Option<Balance>, StoreError> {
        let sql = format!(
            "SELECT {} FROM stock_balances b WHERE b.item_id = $1 AND b.warehouse_id = $2",
            balance_columns("b")
        );
        let row = sqlx::query(&sql)
            .bind(item_id.as_uuid())
            .bind(warehouse_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_balance", e))?;
        row.map(|r| balance_from_row(&r, "b").map_err(|e| decode_error("balance", e)))
            .transpose()
    }

    #[instrument(skip(self, query), err)]
    async fn list_balances(&self, query: &BalanceQuery) -> Result<Page<BalanceView>, StoreError> {
        const FROM: &str = " FROM stock_balances b \
            JOIN inventory_items i ON i.id = b.item_id \
            JOIN warehouses w ON w.id = b.warehouse_id";

        let mut count = QueryBuilder::<Postgres>::new(format!("SELECT COUNT(*){FROM}"));
        push_balance_filters(&mut count, query);
        let total: i64 = count
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_balances", e))?;

        let mut select = QueryBuilder::<Postgres>::new(format!(
            "SELECT {}, {}, {}{FROM}",
            balance_columns("b"),
            item_columns("i"),
            warehouse_columns("w"),
        ));
        push_balance_filters(&mut select, query);
        select.push(" ORDER BY w.name, i.name, b.id LIMIT ");
        select.push_bind(i64::from(query.page.per_page));
        select.push(" OFFSET ");
        select.push_bind(query.page.offset() as i64);

        let rows = select
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_balances", e))?;
        let data = rows
            .iter()
            .map(|r| {
                Ok(BalanceView {
                    balance: balance_from_row(r, "b")?,
                    item: item_from_row(r, "i")?,
                    warehouse: warehouse_from_row(r, "w")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(|e| decode_error("balance view", e))?;

        Ok(Page::new(data, total.max(0) as u64, query.page))
    }

    #[instrument(
        skip(self, request, deadline),
        fields(
            item_id = %request.item_id,
            from_warehouse_id = %request.from_warehouse_id,
            to_warehouse_id = %request.to_warehouse_id,
            quantity = request.quantity
        ),
        err
    )]
    async fn apply_transfer(
        &self,
        request: &TransferRequest,
        deadline: Instant,
    ) -> Result<AppliedTransfer, StoreError> {
        const OP: &str = "apply_transfer";
        let mut tx = self.begin_bounded(OP, deadline).await?;
        let applied = transfer_rows(&mut tx, request).await?;

        if Instant::now() >= deadline {
            return Err(StoreError::DeadlineExceeded);
        }
        tx.commit().await.map_err(|e| map_sqlx_error(OP, e))?;
        Ok(applied)
    }

    #[instrument(
        skip(self, adjustment, deadline),
        fields(
            item_id = %adjustment.item_id,
            warehouse_id = %adjustment.warehouse_id,
            delta = adjustment.delta
        ),
        err
    )]
    async fn apply_adjustment(
        &self,
        adjustment: &StockAdjustment,
        deadline: Instant,
    ) -> Result<Balance, StoreError> {
        const OP: &str = "apply_adjustment";
        let mut tx = self.begin_bounded(OP, deadline).await?;
        let balance = adjustment_rows(&mut tx, adjustment).await?;

        if Instant::now() >= deadline {
            return Err(StoreError::DeadlineExceeded);
        }
        tx.commit().await.map_err(|e| map_sqlx_error(OP, e))?;
        Ok(balance)
    }

    #[instrument(skip(self, query), err)]
    async fn list_transfers(&self, query: &TransferQuery) -> Result<Page<TransferView>, StoreError> {
        const FROM: &str = " FROM stock_transfers t \
            JOIN inventory_items i ON i.id = t.item_id \
            JOIN warehouses fw ON fw.id = t.from_warehouse_id \
            JOIN warehouses tw ON tw.id = t.to_warehouse_id";

        let mut count = QueryBuilder::<Postgres>::new(format!("SELECT COUNT(*){FROM}"));
        push_transfer_filters(&mut count, query);
        let total: i64 = count
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_transfers", e))?;

        let mut select = QueryBuilder::<Postgres>::new(format!(
            "SELECT {}, {}, {}, {}{FROM}",
            transfer_columns("t"),
            item_columns("i"),
            warehouse_columns("fw"),
            warehouse_columns("tw"),
        ));
        push_transfer_filters(&mut select, query);
        select.push(" ORDER BY t.transferred_at DESC, t.id DESC LIMIT ");
        select.push_bind(i64::from(query.page.per_page));
        select.push(" OFFSET ");
        select.push_bind(query.page.offset() as i64);

        let rows = select
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_transfers", e))?;

        let data = rows
            .iter()
            .map(transfer_view_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page::new(data, total.max(0) as u64, query.page))
    }
}

/// Body of the transfer transaction: lock the source, debit it, upsert the
/// destination and append the ledger row. The caller commits.
async fn transfer_rows(
    conn: &mut PgConnection,
    request: &TransferRequest,
) -> Result<AppliedTransfer, StoreError> {
    const OP: &str = "apply_transfer";

    let row = sqlx::query(LOCK_BALANCE_SQL)
        .bind(request.item_id.as_uuid())
        .bind(request.from_warehouse_id.as_uuid())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error(OP, e))?
        .ok_or(StoreError::SourceBalanceMissing)?;
    let mut source = balance_from_row(&row, "b").map_err(|e| decode_error("balance", e))?;

    // Authoritative check, under the row lock.
    let now = Utc::now();
    source.debit(request.quantity, now)?;

    sqlx::query(UPDATE_BALANCE_SQL)
        .bind(source.quantity)
        .bind(now)
        .bind(source.id.as_uuid())
        .execute(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error(OP, e))?;

    let row = sqlx::query(UPSERT_DESTINATION_SQL)
        .bind(BalanceId::new().as_uuid())
        .bind(request.item_id.as_uuid())
        .bind(request.to_warehouse_id.as_uuid())
        .bind(request.quantity)
        .bind(now)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error(OP, e))?;
    let destination = balance_from_row(&row, "b").map_err(|e| decode_error("balance", e))?;

    let record = TransferRecord::completed(request, now);
    sqlx::query(INSERT_TRANSFER_SQL)
        .bind(record.id.as_uuid())
        .bind(record.item_id.as_uuid())
        .bind(record.from_warehouse_id.as_uuid())
        .bind(record.to_warehouse_id.as_uuid())
        .bind(record.quantity)
        .bind(record.transferred_at)
        .bind(record.status.as_str())
        .bind(record.notes.clone())
        .bind(record.transferred_by.map(Uuid::from))
        .bind(record.approved_by.map(Uuid::from))
        .bind(record.approved_at)
        .execute(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error(OP, e))?;

    Ok(AppliedTransfer {
        record,
        source,
        destination,
    })
}

/// Body of the adjustment transaction. The caller commits.
async fn adjustment_rows(
    conn: &mut PgConnection,
    adjustment: &StockAdjustment,
) -> Result<Balance, StoreError> {
    const OP: &str = "apply_adjustment";

    let existing = sqlx::query(LOCK_BALANCE_SQL)
        .bind(adjustment.item_id.as_uuid())
        .bind(adjustment.warehouse_id.as_uuid())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error(OP, e))?;

    let now = Utc::now();
    match existing {
        Some(row) => {
            let mut balance = balance_from_row(&row, "b").map_err(|e| decode_error("balance", e))?;
            balance.adjust(adjustment.delta, now)?;
            sqlx::query(UPDATE_BALANCE_SQL)
                .bind(balance.quantity)
                .bind(now)
                .bind(balance.id.as_uuid())
                .execute(&mut *conn)
                .await
                .map_err(|e| map_sqlx_error(OP, e))?;
            Ok(balance)
        }
        None => {
            let mut balance = Balance::empty(adjustment.item_id, adjustment.warehouse_id, now);
            balance.adjust(adjustment.delta, now)?;
            sqlx::query(INSERT_BALANCE_SQL)
                .bind(balance.id.as_uuid())
                .bind(balance.item_id.as_uuid())
                .bind(balance.warehouse_id.as_uuid())
                .bind(balance.quantity)
                .bind(now)
                .execute(&mut *conn)
                .await
                .map_err(|e| {
                    // A concurrent first adjustment created the pair; retry sees the row.
                    if is_unique_violation(&e) {
                        StoreError::Serialization("balance created concurrently".to_string())
                    } else {
                        map_sqlx_error(OP, e)
                    }
                })?;
            Ok(balance)
        }
    }
}

fn push_item_filters(
    qb: &mut QueryBuilder<'_, Postgres>,
    query: &ItemQuery,
    search: Option<&ItemSearch>,
) {
    qb.push(" WHERE TRUE");

    if let Some(search) = search {
        let lowered = search.raw().to_lowercase();
        qb.push(" AND (lower(i.name) = ");
        qb.push_bind(lowered.clone());
        qb.push(" OR lower(i.sku) = ");
        qb.push_bind(lowered.clone());
        qb.push(" OR lower(i.brand) = ");
        qb.push_bind(lowered);

        for term in search.terms() {
            let pattern = like_pattern(term);
            for column in ["i.name", "i.sku", "i.description", "i.brand", "i.category"] {
                qb.push(format!(" OR {column} ILIKE "));
                qb.push_bind(pattern.clone());
            }
        }

        if let Some(code) = search.phonetic() {
            qb.push(" OR soundex(i.name) = ");
            qb.push_bind(code.to_string());
            qb.push(" OR soundex(i.sku) = ");
            qb.push_bind(code.to_string());
        }
        qb.push(")");
    }

    if let Some(category) = &query.category {
        qb.push(" AND i.category = ");
        qb.push_bind(category.clone());
    }
    if let Some(brand) = &query.brand {
        qb.push(" AND i.brand = ");
        qb.push_bind(brand.clone());
    }
    match query.status {
        Some(ItemStatus::Active) => {
            qb.push(" AND i.is_active");
        }
        Some(ItemStatus::Inactive) => {
            qb.push(" AND NOT i.is_active");
        }
        None => {}
    }
    match query.stock_status {
        Some(StockStatus::LowStock) => {
            qb.push(
                " AND EXISTS (SELECT 1 FROM stock_balances sb \
                 WHERE sb.item_id = i.id AND sb.quantity < i.minimum_stock_level)",
            );
        }
        Some(StockStatus::OutOfStock) => {
            qb.push(
                " AND NOT EXISTS (SELECT 1 FROM stock_balances sb \
                 WHERE sb.item_id = i.id AND sb.quantity > 0)",
            );
        }
        None => {}
    }
    if query.min_stock.is_some() || query.max_stock.is_some() {
        qb.push(" AND EXISTS (SELECT 1 FROM stock_balances sb WHERE sb.item_id = i.id");
        if let Some(min) = query.min_stock {
            qb.push(" AND sb.quantity >= ");
            qb.push_bind(min);
        }
        if let Some(max) = query.max_stock {
            qb.push(" AND sb.quantity <= ");
            qb.push_bind(max);
        }
        qb.push(")");
    }
}

fn push_balance_filters(qb: &mut QueryBuilder<'_, Postgres>, query: &BalanceQuery) {
    qb.push(" WHERE TRUE");
    if let Some(item_id) = query.item_id {
        qb.push(" AND b.item_id = ");
        qb.push_bind(Uuid::from(item_id));
    }
    if let Some(warehouse_id) = query.warehouse_id {
        qb.push(" AND b.warehouse_id = ");
        qb.push_bind(Uuid::from(warehouse_id));
    }
    if let Some(needle) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = like_pattern(needle);
        qb.push(" AND (FALSE");
        for column in ["i.name", "i.sku", "i.description", "i.brand", "i.category"] {
            qb.push(format!(" OR {column} ILIKE "));
            qb.push_bind(pattern.clone());
        }
        qb.push(")");
    }
    if let Some(min) = query.min_quantity {
        qb.push(" AND b.quantity >= ");
        qb.push_bind(min);
    }
    if let Some(max) = query.max_quantity {
        qb.push(" AND b.quantity <= ");
        qb.push_bind(max);
    }
    if query.low_stock_only {
        qb.push(" AND b.quantity < i.minimum_stock_level");
    }
}

fn push_transfer_filters(qb: &mut QueryBuilder<'_, Postgres>, query: &TransferQuery) {
    qb.push(" WHERE TRUE");
    if let Some(item_id) = query.item_id {
        qb.push(" AND t.item_id = ");
        qb.push_bind(Uuid::from(item_id));
    }
    if let Some(warehouse_id) = query.warehouse_id {
        let id = Uuid::from(warehouse_id);
        qb.push(" AND (t.from_warehouse_id = ");
        qb.push_bind(id);
        qb.push(" OR t.to_warehouse_id = ");
        qb.push_bind(id);
        qb.push(")");
    }
}

/// `%term%` with LIKE metacharacters escaped, so the match is a plain
/// substring test.
fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn aliased(alias: &str, columns: &[&str]) -> String {
    columns
        .iter()
        .map(|c| format!("{alias}.{c} AS {alias}_{c}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn item_columns(alias: &str) -> String {
    aliased(
        alias,
        &[
            "id",
            "sku",
            "name",
            "description",
            "category",
            "brand",
            "unit_of_measure",
            "minimum_stock_level",
            "maximum_stock_level",
            "is_active",
            "created_at",
            "updated_at",
        ],
    )
}

fn warehouse_columns(alias: &str) -> String {
    aliased(
        alias,
        &[
            "id",
            "name",
            "location",
            "address",
            "contact_person",
            "phone",
            "email",
            "is_active",
            "created_at",
            "updated_at",
        ],
    )
}

fn balance_columns(alias: &str) -> String {
    aliased(
        alias,
        &[
            "id",
            "item_id",
            "warehouse_id",
            "quantity",
            "reserved_quantity",
            "last_updated_at",
        ],
    )
}

fn transfer_columns(alias: &str) -> String {
    aliased(
        alias,
        &[
            "id",
            "item_id",
            "from_warehouse_id",
            "to_warehouse_id",
            "quantity",
            "transferred_at",
            "status",
            "notes",
            "transferred_by",
            "approved_by",
            "approved_at",
        ],
    )
}

fn item_from_row(row: &PgRow, p: &str) -> Result<Item, sqlx::Error> {
    let col = |name: &str| format!("{p}_{name}");
    Ok(Item {
        id: ItemId::from_uuid(row.try_get(col("id").as_str())?),
        sku: row.try_get(col("sku").as_str())?,
        name: row.try_get(col("name").as_str())?,
        description: row.try_get(col("description").as_str())?,
        category: row.try_get(col("category").as_str())?,
        brand: row.try_get(col("brand").as_str())?,
        unit_of_measure: row.try_get(col("unit_of_measure").as_str())?,
        minimum_stock_level: row.try_get(col("minimum_stock_level").as_str())?,
        maximum_stock_level: row.try_get(col("maximum_stock_level").as_str())?,
        is_active: row.try_get(col("is_active").as_str())?,
        created_at: row.try_get(col("created_at").as_str())?,
        updated_at: row.try_get(col("updated_at").as_str())?,
    })
}

fn warehouse_from_row(row: &PgRow, p: &str) -> Result<Warehouse, sqlx::Error> {
    let col = |name: &str| format!("{p}_{name}");
    Ok(Warehouse {
        id: WarehouseId::from_uuid(row.try_get(col("id").as_str())?),
        name: row.try_get(col("name").as_str())?,
        location: row.try_get(col("location").as_str())?,
        address: row.try_get(col("address").as_str())?,
        contact_person: row.try_get(col("contact_person").as_str())?,
        phone: row.try_get(col("phone").as_str())?,
        email: row.try_get(col("email").as_str())?,
        is_active: row.try_get(col("is_active").as_str())?,
        created_at: row.try_get(col("created_at").as_str())?,
        updated_at: row.try_get(col("updated_at").as_str())?,
    })
}

fn balance_from_row(row: &PgRow, p: &str) -> Result<Balance, sqlx::Error> {
    let col = |name: &str| format!("{p}_{name}");
    Ok(Balance {
        id: BalanceId::from_uuid(row.try_get(col("id").as_str())?),
        item_id: ItemId::from_uuid(row.try_get(col("item_id").as_str())?),
        warehouse_id: WarehouseId::from_uuid(row.try_get(col("warehouse_id").as_str())?),
        quantity: row.try_get(col("quantity").as_str())?,
        reserved_quantity: row.try_get(col("reserved_quantity").as_str())?,
        last_updated_at: row.try_get(col("last_updated_at").as_str())?,
    })
}

fn transfer_from_row(row: &PgRow, p: &str) -> Result<TransferRecord, StoreError> {
    let col = |name: &str| format!("{p}_{name}");
    let decode = |e| decode_error("transfer", e);
    let status: String = row.try_get(col("status").as_str()).map_err(decode)?;
    let status: TransferStatus = status
        .parse()
        .map_err(|e| StoreError::Backend(format!("failed to decode transfer status: {e}")))?;
    let transferred_by: Option<Uuid> = row.try_get(col("transferred_by").as_str()).map_err(decode)?;
    let approved_by: Option<Uuid> = row.try_get(col("approved_by").as_str()).map_err(decode)?;

    Ok(TransferRecord {
        id: TransferId::from_uuid(row.try_get(col("id").as_str()).map_err(decode)?),
        item_id: ItemId::from_uuid(row.try_get(col("item_id").as_str()).map_err(decode)?),
        from_warehouse_id: WarehouseId::from_uuid(
            row.try_get(col("from_warehouse_id").as_str()).map_err(decode)?,
        ),
        to_warehouse_id: WarehouseId::from_uuid(
            row.try_get(col("to_warehouse_id").as_str()).map_err(decode)?,
        ),
        quantity: row.try_get(col("quantity").as_str()).map_err(decode)?,
        transferred_at: row.try_get(col("transferred_at").as_str()).map_err(decode)?,
        status,
        notes: row.try_get(col("notes").as_str()).map_err(decode)?,
        transferred_by: transferred_by.map(UserId::from_uuid),
        approved_by: approved_by.map(UserId::from_uuid),
        approved_at: row.try_get(col("approved_at").as_str()).map_err(decode)?,
    })
}

fn transfer_view_from_row(row: &PgRow) -> Result<TransferView, StoreError> {
    Ok(TransferView {
        record: transfer_from_row(row, "t")?,
        item: item_from_row(row, "i").map_err(|e| decode_error("item", e))?,
        from_warehouse: warehouse_from_row(row, "fw").map_err(|e| decode_error("warehouse", e))?,
        to_warehouse: warehouse_from_row(row, "tw").map_err(|e| decode_error("warehouse", e))?,
    })
}

fn decode_error(what: &str, err: sqlx::Error) -> StoreError {
    StoreError::Backend(format!("failed to decode {what} row: {err}"))
}

/// Map SQLx errors to `StoreError`.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("55P03") | Some("40P01") => StoreError::LockTimeout(msg),
                Some("40001") => StoreError::Serialization(msg),
                Some("57014") => StoreError::DeadlineExceeded,
                Some("23505") | Some("23503") => StoreError::Conflict(msg),
                Some("23514") => StoreError::Rejected(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Backend(format!("connection pool timed out in {operation}"))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {operation}"))
        }
        _ => StoreError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_escapes_metacharacters() {
        assert_eq!(like_pattern("bolt"), "%bolt%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(like_pattern("a\\b"), "%a\\\\b%");
    }

    #[test]
    fn aliased_columns_are_prefixed() {
        assert_eq!(aliased("b", &["id", "quantity"]), "b.id AS b_id, b.quantity AS b_quantity");
    }

    #[test]
    fn static_balance_select_matches_decoder_columns() {
        assert_eq!(balance_select!(), balance_columns("b"));
    }

    mod live {
        //! Run against a real server when `DATABASE_URL` is set; skipped otherwise.

        use super::*;
        use std::sync::Arc;
        use stockyard_inventory::{ItemDraft, WarehouseDraft};

        async fn store() -> Option<Arc<PostgresInventoryStore>> {
            let url = std::env::var("DATABASE_URL").ok()?;
            let store = PostgresInventoryStore::connect(&url, 8).await.unwrap();
            store.migrate().await.unwrap();
            Some(Arc::new(store))
        }

        fn far() -> Instant {
            Instant::now() + Duration::from_secs(10)
        }

        async fn seed_item(store: &PostgresInventoryStore) -> Item {
            let item = Item::create(
                ItemDraft {
                    sku: format!("PG-{}", Uuid::now_v7().simple()),
                    name: "Hex bolt".to_string(),
                    description: None,
                    category: None,
                    brand: None,
                    unit_of_measure: "pcs".to_string(),
                    minimum_stock_level: 10,
                    maximum_stock_level: None,
                    is_active: None,
                },
                Utc::now(),
            )
            .unwrap();
            store.insert_item(item).await.unwrap()
        }

        async fn seed_warehouse(store: &PostgresInventoryStore, name: &str) -> Warehouse {
            let warehouse = Warehouse::create(
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
            .unwrap();
            store.insert_warehouse(warehouse).await.unwrap()
        }

        async fn receive(store: &PostgresInventoryStore, item: &Item, warehouse: &Warehouse, qty: i64) {
            store
                .apply_adjustment(
                    &StockAdjustment {
                        item_id: item.id,
                        warehouse_id: warehouse.id,
                        delta: qty,
                        reason: None,
                    },
                    far(),
                )
                .await
                .unwrap();
        }

        fn request(item: &Item, from: &Warehouse, to: &Warehouse, quantity: i64) -> TransferRequest {
            TransferRequest {
                item_id: item.id,
                from_warehouse_id: from.id,
                to_warehouse_id: to.id,
                quantity,
                notes: Some("rebalance".to_string()),
                initiated_by: None,
            }
        }

        #[tokio::test]
        async fn transfer_moves_stock_and_records_ledger_row() {
            let Some(store) = store().await else { return };
            let item = seed_item(&store).await;
            let a = seed_warehouse(&store, "Alpha").await;
            let b = seed_warehouse(&store, "Bravo").await;
            receive(&store, &item, &a, 50).await;

            let applied = store.apply_transfer(&request(&item, &a, &b, 45), far()).await.unwrap();
            assert_eq!(applied.source.quantity, 5);
            assert_eq!(applied.destination.quantity, 45);

            let source = store.get_balance(item.id, a.id).await.unwrap().unwrap();
            let destination = store.get_balance(item.id, b.id).await.unwrap().unwrap();
            assert_eq!(source.quantity + destination.quantity, 50);

            let ledger = store
                .list_transfers(&TransferQuery {
                    item_id: Some(item.id),
                    ..TransferQuery::default()
                })
                .await
                .unwrap();
            assert_eq!(ledger.total, 1);
            assert_eq!(ledger.data[0].record.id, applied.record.id);
        }

        #[tokio::test]
        async fn insufficient_stock_rolls_back() {
            let Some(store) = store().await else { return };
            let item = seed_item(&store).await;
            let a = seed_warehouse(&store, "Alpha").await;
            let b = seed_warehouse(&store, "Bravo").await;
            receive(&store, &item, &a, 5).await;

            let err = store
                .apply_transfer(&request(&item, &a, &b, 6), far())
                .await
                .unwrap_err();
            assert_eq!(err, StoreError::InsufficientStock { available: 5 });
            assert_eq!(store.get_balance(item.id, a.id).await.unwrap().unwrap().quantity, 5);
            assert!(store.get_balance(item.id, b.id).await.unwrap().is_none());
        }

        #[tokio::test]
        async fn concurrent_first_transfers_share_one_destination_row() {
            let Some(store) = store().await else { return };
            let item = seed_item(&store).await;
            let a = seed_warehouse(&store, "Alpha").await;
            let b = seed_warehouse(&store, "Bravo").await;
            let c = seed_warehouse(&store, "Charlie").await;
            receive(&store, &item, &a, 30).await;
            receive(&store, &item, &b, 30).await;

            let from_a = {
                let store = store.clone();
                let req = request(&item, &a, &c, 10);
                tokio::spawn(async move { store.apply_transfer(&req, far()).await })
            };
            let from_b = {
                let store = store.clone();
                let req = request(&item, &b, &c, 15);
                tokio::spawn(async move { store.apply_transfer(&req, far()).await })
            };
            let first = from_a.await.unwrap().unwrap();
            let second = from_b.await.unwrap().unwrap();

            assert_eq!(first.destination.id, second.destination.id);
            let destination = store.get_balance(item.id, c.id).await.unwrap().unwrap();
            assert_eq!(destination.quantity, 25);
        }
    }
}
