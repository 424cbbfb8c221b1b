use axum::{Router, routing::get};

pub mod inventory;
pub mod items;
pub mod stock_transfers;
pub mod system;
pub mod warehouses;

/// Read endpoints; no token required.
pub fn public_router() -> Router {
    Router::new()
        .route("/health", get(system::health))
        .route("/alerts/stream", get(system::alerts_stream))
        .merge(stock_transfers::public())
        .merge(inventory::public())
        .merge(warehouses::public())
        .merge(items::public())
}

/// Mutating endpoints plus `/whoami`; every route here sits behind the auth
/// middleware and checks its own capability.
pub fn protected_router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .merge(stock_transfers::protected())
        .merge(inventory::protected())
        .merge(warehouses::protected())
        .merge(items::protected())
}
