use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use chrono::Utc;
use serde_json::json;

use stockyard_auth::Capability;
use stockyard_core::{FieldErrors, ItemId};
use stockyard_infra::store::{ItemQuery, StockStatus};
use stockyard_infra::{CacheScope, ReadCache, StoreError};
use stockyard_inventory::Item;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::authz;
use crate::context::PrincipalContext;

pub fn public() -> Router {
    Router::new()
        .route("/inventory-items", get(list_items))
        .route("/inventory-items/filters", get(filter_options))
        .route("/inventory-items/search", get(search_items))
        .route("/inventory-items/low-stock", get(low_stock_items))
        .route("/inventory-items/out-of-stock", get(out_of_stock_items))
        .route("/inventory-items/:id", get(get_item))
}

pub fn protected() -> Router {
    Router::new()
        .route("/inventory-items", post(create_item))
        .route("/inventory-items/:id", put(update_item).delete(delete_item))
}

pub async fn list_items(
    Extension(services): Extension<Arc<AppServices>>,
    Query(params): Query<dto::ItemListParams>,
) -> Response {
    let query = ItemQuery::from(params);
    let key = ReadCache::fingerprint(&query);
    let catalog = &services.catalog;
    let query = &query;
    let result = services
        .cache
        .get_or_try_insert(CacheScope::ItemSearch, key, move || async move {
            let page = catalog
                .search_items(query)
                .await
                .map_err(errors::store_error_to_response)?;
            let filters = catalog
                .item_filter_options()
                .await
                .map_err(errors::store_error_to_response)?;
            let mut body = dto::paginated(page.map(|s| dto::item_stock_json(&s)));
            body["filters"] = json!(filters);
            Ok::<_, Response>(body)
        })
        .await;

    match result {
        Ok(body) => Json(body).into_response(),
        Err(response) => response,
    }
}

pub async fn filter_options(Extension(services): Extension<Arc<AppServices>>) -> Response {
    match services.catalog.item_filter_options().await {
        Ok(filters) => Json(json!(filters)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

/// Autocomplete over active items.
pub async fn search_items(
    Extension(services): Extension<Arc<AppServices>>,
    Query(params): Query<dto::SearchParams>,
) -> Response {
    let Some(query) = params.into_query() else {
        return Json(json!({ "data": [] })).into_response();
    };

    match services.catalog.search_items(&query).await {
        Ok(page) => Json(json!({
            "data": page.data.iter().map(dto::item_suggestion_json).collect::<Vec<_>>(),
        }))
        .into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn low_stock_items(
    Extension(services): Extension<Arc<AppServices>>,
    Query(params): Query<dto::PageParams>,
) -> Response {
    items_by_stock_status(&services, StockStatus::LowStock, &params).await
}

pub async fn out_of_stock_items(
    Extension(services): Extension<Arc<AppServices>>,
    Query(params): Query<dto::PageParams>,
) -> Response {
    items_by_stock_status(&services, StockStatus::OutOfStock, &params).await
}

async fn items_by_stock_status(
    services: &AppServices,
    status: StockStatus,
    params: &dto::PageParams,
) -> Response {
    let query = ItemQuery {
        stock_status: Some(status),
        page: params.page(),
        ..ItemQuery::default()
    };
    match services.catalog.search_items(&query).await {
        Ok(page) => Json(dto::paginated(page.map(|s| dto::item_stock_json(&s)))).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn get_item(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    let item_id: ItemId = match errors::parse_id(&id, "item id") {
        Ok(id) => id,
        Err(response) => return response,
    };

    match services.catalog.get_item_stock(item_id).await {
        Ok(Some(stock)) => Json(json!({ "data": dto::item_stock_json(&stock) })).into_response(),
        Ok(None) => errors::json_error(StatusCode::NOT_FOUND, "not_found", "inventory item not found"),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn create_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    payload: Result<Json<dto::ItemPayload>, JsonRejection>,
) -> Response {
    if let Err(denied) = authz::require(&principal, Capability::ManageItems) {
        return denied;
    }

    let Json(body) = match payload {
        Ok(body) => body,
        Err(rejection) => return errors::body_rejection(rejection),
    };

    let (draft, mut field_errors) = body.into_create_draft();
    let item = match Item::create(draft, Utc::now()) {
        Ok(item) if field_errors.is_empty() => item,
        Ok(_) => return errors::validation_error(field_errors),
        Err(e) => {
            field_errors.merge(e);
            return errors::validation_error(field_errors);
        }
    };

    let item = match services.catalog.insert_item(item).await {
        Ok(item) => item,
        Err(StoreError::Conflict(_)) => {
            return errors::validation_error(FieldErrors::single(
                "sku",
                "The SKU has already been taken.",
            ));
        }
        Err(e) => return errors::store_error_to_response(e),
    };
    services.cache.invalidate(CacheScope::ItemSearch);

    (
        StatusCode::CREATED,
        Json(json!({
            "message": "Inventory item created successfully.",
            "data": dto::item_json(&item),
        })),
    )
        .into_response()
}

pub async fn update_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    payload: Result<Json<dto::ItemPayload>, JsonRejection>,
) -> Response {
    if let Err(denied) = authz::require(&principal, Capability::ManageItems) {
        return denied;
    }

    let item_id: ItemId = match errors::parse_id(&id, "item id") {
        Ok(id) => id,
        Err(response) => return response,
    };

    let Json(body) = match payload {
        Ok(body) => body,
        Err(rejection) => return errors::body_rejection(rejection),
    };

    let mut item = match services.catalog.get_item(item_id).await {
        Ok(Some(item)) => item,
        Ok(None) => return errors::json_error(StatusCode::NOT_FOUND, "not_found", "inventory item not found"),
        Err(e) => return errors::store_error_to_response(e),
    };

    let draft = body.into_update_draft(&item);
    if let Err(field_errors) = item.apply_update(draft, Utc::now()) {
        return errors::validation_error(field_errors);
    }

    let item = match services.catalog.update_item(item).await {
        Ok(item) => item,
        Err(e) => return errors::store_error_to_response(e),
    };
    // Balance listings embed item details.
    services.cache.clear();

    Json(json!({
        "message": "Inventory item updated successfully.",
        "data": dto::item_json(&item),
    }))
    .into_response()
}

pub async fn delete_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    if let Err(denied) = authz::require(&principal, Capability::DeleteItems) {
        return denied;
    }

    let item_id: ItemId = match errors::parse_id(&id, "item id") {
        Ok(id) => id,
        Err(response) => return response,
    };

    if let Err(e) = services.catalog.delete_item(item_id).await {
        return errors::store_error_to_response(e);
    }
    services.cache.clear();

    Json(json!({ "message": "Inventory item deleted successfully." })).into_response()
}
