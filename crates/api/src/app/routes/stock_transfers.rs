use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Query, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;

use stockyard_auth::Capability;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::authz;
use crate::context::PrincipalContext;

const TRANSFER_FAILED: &str = "Stock transfer failed.";

pub fn public() -> Router {
    Router::new().route("/stock-transfers", get(list_transfers))
}

pub fn protected() -> Router {
    Router::new().route("/stock-transfers", post(create_transfer))
}

pub async fn create_transfer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    payload: Result<Json<dto::CreateTransferRequest>, JsonRejection>,
) -> Response {
    if let Err(denied) = authz::require(&principal, Capability::TransferStock) {
        return denied;
    }

    let Json(body) = match payload {
        Ok(body) => body,
        Err(rejection) => return errors::body_rejection(rejection),
    };

    let command = match body.into_command(principal.user_id()) {
        Ok(command) => command,
        Err(field_errors) => return errors::validation_error(field_errors),
    };

    let done = match services.transfers.transfer(command).await {
        Ok(done) => done,
        Err(e) => return errors::stock_error_to_response(e, TRANSFER_FAILED),
    };

    (
        StatusCode::CREATED,
        Json(json!({
            "message": "Stock transferred successfully.",
            "data": dto::completed_transfer_json(&done),
        })),
    )
        .into_response()
}

pub async fn list_transfers(
    Extension(services): Extension<Arc<AppServices>>,
    Query(params): Query<dto::TransferListParams>,
) -> Response {
    let query = match params.into_query() {
        Ok(query) => query,
        Err(response) => return response,
    };

    match services.stock.list_transfers(&query).await {
        Ok(page) => Json(dto::paginated(page.map(|v| dto::transfer_view_json(&v)))).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}
