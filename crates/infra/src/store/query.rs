//! Read-side query parameters and pagination.
//!
//! Queries are plain data. Both stores interpret them the same way, so the
//! in-memory store doubles as an executable description of the SQL.

use serde::{Deserialize, Serialize};

use stockyard_core::{ItemId, WarehouseId};

pub const DEFAULT_PER_PAGE: u32 = 15;
pub const MAX_PER_PAGE: u32 = 100;

/// Page-number pagination (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

impl PageRequest {
    pub fn new(page: Option<u32>, per_page: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.per_page)
    }

    /// Slice an already filtered and sorted result set.
    pub fn paginate<T>(&self, all: Vec<T>) -> Page<T> {
        let total = all.len() as u64;
        let data = all
            .into_iter()
            .skip(self.offset() as usize)
            .take(self.per_page as usize)
            .collect();
        Page::new(data, total, *self)
    }
}

/// One page of results with the counters clients render pagers from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub current_page: u32,
    pub last_page: u32,
    pub per_page: u32,
    pub total: u64,
    pub from: Option<u64>,
    pub to: Option<u64>,
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>, total: u64, request: PageRequest) -> Self {
        let per_page = u64::from(request.per_page);
        let last_page = total.div_ceil(per_page).max(1);
        let (from, to) = if data.is_empty() {
            (None, None)
        } else {
            let first = request.offset() + 1;
            (Some(first), Some(first + data.len() as u64 - 1))
        };
        Self {
            data,
            current_page: request.page,
            last_page: u32::try_from(last_page).unwrap_or(u32::MAX),
            per_page: request.per_page,
            total,
            from,
            to,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            data: self.data.into_iter().map(f).collect(),
            current_page: self.current_page,
            last_page: self.last_page,
            per_page: self.per_page,
            total: self.total,
            from: self.from,
            to: self.to,
        }
    }
}

/// Filters for the balance listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BalanceQuery {
    pub item_id: Option<ItemId>,
    pub warehouse_id: Option<WarehouseId>,
    /// Case-insensitive substring over the item's descriptive fields.
    pub search: Option<String>,
    pub min_quantity: Option<i64>,
    pub max_quantity: Option<i64>,
    /// Only balances sitting below their item's minimum.
    pub low_stock_only: bool,
    pub page: PageRequest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Active,
    Inactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    /// Some balance is below the item's minimum.
    LowStock,
    /// No balance holds any units.
    OutOfStock,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemSortField {
    #[default]
    Name,
    Sku,
    Category,
    Brand,
    CreatedAt,
    TotalQuantity,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Filters for the item listing and search endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemQuery {
    pub search: Option<String>,
    pub category: Option<String>,
    pub brand: Option<String>,
    pub status: Option<ItemStatus>,
    pub stock_status: Option<StockStatus>,
    /// Some balance holds at least this many units.
    pub min_stock: Option<i64>,
    /// Some balance holds at most this many units.
    pub max_stock: Option<i64>,
    pub sort_by: ItemSortField,
    pub sort_order: SortOrder,
    pub page: PageRequest,
}

/// Filters for the transfer ledger listing. Newest entries first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferQuery {
    pub item_id: Option<ItemId>,
    /// Entries moving stock into or out of this warehouse.
    pub warehouse_id: Option<WarehouseId>,
    pub page: PageRequest,
}

/// Values available to the item listing's facet filters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterOptions {
    pub categories: Vec<String>,
    pub brands: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_request_clamps_inputs() {
        let req = PageRequest::new(Some(0), Some(1000));
        assert_eq!(req.page, 1);
        assert_eq!(req.per_page, MAX_PER_PAGE);
        assert_eq!(PageRequest::new(None, None).per_page, DEFAULT_PER_PAGE);
    }

    #[test]
    fn paginate_reports_bounds() {
        let req = PageRequest::new(Some(2), Some(4));
        let page = req.paginate((1..=10).collect::<Vec<_>>());
        assert_eq!(page.data, vec![5, 6, 7, 8]);
        assert_eq!(page.total, 10);
        assert_eq!(page.last_page, 3);
        assert_eq!(page.from, Some(5));
        assert_eq!(page.to, Some(8));
    }

    #[test]
    fn empty_result_has_one_page_and_no_bounds() {
        let page = PageRequest::default().paginate(Vec::<u8>::new());
        assert_eq!(page.last_page, 1);
        assert_eq!(page.from, None);
        assert_eq!(page.to, None);
    }
}
