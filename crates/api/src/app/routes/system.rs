use std::sync::Arc;

use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, sse::Event as SseEvent},
};

use stockyard_auth::Capability;

use crate::app::services::{self, AppServices};
use crate::context::PrincipalContext;

const ALL_CAPABILITIES: [Capability; 7] = [
    Capability::ReadInventory,
    Capability::TransferStock,
    Capability::AdjustStock,
    Capability::ManageItems,
    Capability::DeleteItems,
    Capability::ManageWarehouses,
    Capability::ClearCache,
];

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(Extension(principal): Extension<PrincipalContext>) -> impl IntoResponse {
    let role = principal.role();
    Json(serde_json::json!({
        "user_id": principal.user_id().to_string(),
        "role": role.as_str(),
        "capabilities": ALL_CAPABILITIES
            .iter()
            .filter(|c| role.grants(**c))
            .map(|c| c.as_str())
            .collect::<Vec<_>>(),
    }))
}

/// Live low-stock alerts.
pub async fn alerts_stream(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Sse<impl tokio_stream::Stream<Item = Result<SseEvent, std::convert::Infallible>>> {
    services::alerts_sse_stream(services)
}
