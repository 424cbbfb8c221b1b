use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;

use stockyard_core::FieldErrors;
use stockyard_infra::{StockError, StoreError};

const INVALID_DATA: &str = "The given data was invalid.";

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// 422 with every failing field.
pub fn validation_error(errors: FieldErrors) -> Response {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        axum::Json(json!({
            "message": INVALID_DATA,
            "errors": errors,
        })),
    )
        .into_response()
}

/// Malformed JSON bodies are reported like any other field failure.
pub fn body_rejection(rejection: JsonRejection) -> Response {
    validation_error(FieldErrors::single("body", rejection.body_text()))
}

/// Map a failed stock operation. `failure` is the operation-level message
/// used for non-validation outcomes, e.g. "Stock transfer failed.".
pub fn stock_error_to_response(err: StockError, failure: &'static str) -> Response {
    match err {
        StockError::Validation(errors) => validation_error(errors),
        StockError::Contention { attempts } => (
            StatusCode::SERVICE_UNAVAILABLE,
            axum::Json(json!({
                "message": failure,
                "error": format!("stock is busy, gave up after {attempts} attempts; retry the request"),
            })),
        )
            .into_response(),
        StockError::DeadlineExceeded => (
            StatusCode::SERVICE_UNAVAILABLE,
            axum::Json(json!({
                "message": failure,
                "error": "deadline exceeded; nothing was changed",
            })),
        )
            .into_response(),
        StockError::Persistence(detail) => {
            error!(%detail, "stock operation failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                axum::Json(json!({
                    "message": failure,
                    "error": "internal error",
                })),
            )
                .into_response()
        }
    }
}

pub fn store_error_to_response(err: StoreError) -> Response {
    match err {
        StoreError::NotFound(what) => json_error(StatusCode::NOT_FOUND, "not_found", what),
        StoreError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        StoreError::Rejected(msg) => json_error(StatusCode::UNPROCESSABLE_ENTITY, "rejected", msg),
        StoreError::LockTimeout(_) | StoreError::Serialization(_) | StoreError::DeadlineExceeded => {
            json_error(StatusCode::SERVICE_UNAVAILABLE, "busy", "storage is busy; retry the request")
        }
        other => {
            error!(error = %other, "store request failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", "internal error")
        }
    }
}

/// Parse a path identifier, answering 400 when it is not a UUID.
pub fn parse_id<T>(raw: &str, what: &'static str) -> Result<T, Response>
where
    T: std::str::FromStr,
{
    raw.parse::<T>().map_err(|_| {
        json_error(
            StatusCode::BAD_REQUEST,
            "invalid_id",
            format!("{what} must be a valid identifier"),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockyard_core::ItemId;

    #[test]
    fn validation_maps_to_422() {
        let response = stock_error_to_response(
            StockError::Validation(FieldErrors::single("quantity", "Insufficient stock.")),
            "Stock transfer failed.",
        );
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn contention_and_deadline_are_transient() {
        for err in [StockError::Contention { attempts: 3 }, StockError::DeadlineExceeded] {
            let response = stock_error_to_response(err, "Stock transfer failed.");
            assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        }
    }

    #[test]
    fn persistence_is_opaque_500() {
        let response = stock_error_to_response(
            StockError::Persistence("connection reset".to_string()),
            "Stock transfer failed.",
        );
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn store_errors_map_to_http_status() {
        assert_eq!(
            store_error_to_response(StoreError::NotFound("item".into())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            store_error_to_response(StoreError::Conflict("in use".into())).status(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn malformed_id_is_bad_request() {
        let response = parse_id::<ItemId>("not-a-uuid", "item id").unwrap_err();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
