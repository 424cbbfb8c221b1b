use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Query, rejection::JsonRejection},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;

use stockyard_auth::Capability;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::authz;
use crate::context::PrincipalContext;

pub fn public() -> Router {
    Router::new().route("/inventory", get(list_balances))
}

pub fn protected() -> Router {
    Router::new().route("/inventory/adjustments", post(adjust_stock))
}

/// Balances joined with their item and warehouse.
pub async fn list_balances(
    Extension(services): Extension<Arc<AppServices>>,
    Query(params): Query<dto::BalanceListParams>,
) -> Response {
    let query = match params.into_query() {
        Ok(query) => query,
        Err(response) => return response,
    };

    match services.stock.list_balances(&query).await {
        Ok(page) => Json(dto::paginated(page.map(|v| dto::balance_view_json(&v)))).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn adjust_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    payload: Result<Json<dto::AdjustStockRequest>, JsonRejection>,
) -> Response {
    if let Err(denied) = authz::require(&principal, Capability::AdjustStock) {
        return denied;
    }

    let Json(body) = match payload {
        Ok(body) => body,
        Err(rejection) => return errors::body_rejection(rejection),
    };

    let command = match body.into_command() {
        Ok(command) => command,
        Err(field_errors) => return errors::validation_error(field_errors),
    };

    match services.adjustments.adjust(command).await {
        Ok(done) => Json(json!({
            "message": "Stock adjusted successfully.",
            "data": dto::adjustment_json(&done),
        }))
        .into_response(),
        Err(e) => errors::stock_error_to_response(e, "Stock adjustment failed."),
    }
}
