use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use chrono::Utc;
use serde_json::json;

use stockyard_auth::Capability;
use stockyard_core::WarehouseId;
use stockyard_infra::{CacheScope, ReadCache};
use stockyard_inventory::{Warehouse, WarehouseDraft};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::authz;
use crate::context::PrincipalContext;

pub fn public() -> Router {
    Router::new()
        .route("/warehouses", get(list_warehouses))
        .route("/warehouses/:id/inventory", get(warehouse_inventory))
}

pub fn protected() -> Router {
    Router::new()
        .route("/warehouses", post(create_warehouse))
        .route("/warehouses/:id/inventory/cache", delete(clear_inventory_cache))
}

pub async fn list_warehouses(Extension(services): Extension<Arc<AppServices>>) -> Response {
    let catalog = &services.catalog;
    let result = services
        .cache
        .get_or_try_insert(CacheScope::Warehouses, "all".to_string(), move || async move {
            let warehouses = catalog
                .list_warehouses()
                .await
                .map_err(errors::store_error_to_response)?;
            Ok::<_, Response>(json!({
                "data": warehouses.iter().map(dto::warehouse_json).collect::<Vec<_>>(),
            }))
        })
        .await;

    match result {
        Ok(body) => Json(body).into_response(),
        Err(response) => response,
    }
}

pub async fn create_warehouse(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    payload: Result<Json<dto::WarehousePayload>, JsonRejection>,
) -> Response {
    if let Err(denied) = authz::require(&principal, Capability::ManageWarehouses) {
        return denied;
    }

    let Json(body) = match payload {
        Ok(body) => body,
        Err(rejection) => return errors::body_rejection(rejection),
    };

    let warehouse = match Warehouse::create(WarehouseDraft::from(body), Utc::now()) {
        Ok(w) => w,
        Err(field_errors) => return errors::validation_error(field_errors),
    };

    let warehouse = match services.catalog.insert_warehouse(warehouse).await {
        Ok(w) => w,
        Err(e) => return errors::store_error_to_response(e),
    };
    services.cache.invalidate(CacheScope::Warehouses);

    (
        StatusCode::CREATED,
        Json(json!({
            "message": "Warehouse created successfully.",
            "data": dto::warehouse_json(&warehouse),
        })),
    )
        .into_response()
}

/// One warehouse's balances, cached per query until a stock change touches it.
pub async fn warehouse_inventory(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Query(params): Query<dto::WarehouseInventoryParams>,
) -> Response {
    let warehouse_id: WarehouseId = match errors::parse_id(&id, "warehouse id") {
        Ok(id) => id,
        Err(response) => return response,
    };

    let warehouse = match services.catalog.get_warehouse(warehouse_id).await {
        Ok(Some(w)) => w,
        Ok(None) => return errors::json_error(StatusCode::NOT_FOUND, "not_found", "warehouse not found"),
        Err(e) => return errors::store_error_to_response(e),
    };

    let query = params.into_query(warehouse_id);
    let key = ReadCache::fingerprint(&query);
    let stock = &services.stock;
    let query = &query;
    let result = services
        .cache
        .get_or_try_insert(CacheScope::WarehouseInventory(warehouse_id), key, move || async move {
            let page = stock
                .list_balances(query)
                .await
                .map_err(errors::store_error_to_response)?;
            let mut body = dto::paginated(page.map(|v| dto::balance_view_json(&v)));
            body["warehouse"] = dto::warehouse_json(&warehouse);
            Ok::<_, Response>(body)
        })
        .await;

    match result {
        Ok(body) => Json(body).into_response(),
        Err(response) => response,
    }
}

pub async fn clear_inventory_cache(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    if let Err(denied) = authz::require(&principal, Capability::ClearCache) {
        return denied;
    }

    let warehouse_id: WarehouseId = match errors::parse_id(&id, "warehouse id") {
        Ok(id) => id,
        Err(response) => return response,
    };

    match services.catalog.get_warehouse(warehouse_id).await {
        Ok(Some(_)) => {}
        Ok(None) => return errors::json_error(StatusCode::NOT_FOUND, "not_found", "warehouse not found"),
        Err(e) => return errors::store_error_to_response(e),
    }

    services.cache.invalidate(CacheScope::WarehouseInventory(warehouse_id));
    Json(json!({ "message": "Inventory cache cleared successfully." })).into_response()
}
