//! HTTP application wiring (axum router + service wiring).
//!
//! - `services.rs`: store selection, engine/adjuster/cache/alert wiring
//! - `routes/`: handlers, one file per resource
//! - `dto.rs`: request/response DTOs and JSON mapping helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router};
use tower::ServiceBuilder;

use stockyard_auth::Hs256JwtValidator;
use stockyard_infra::Settings;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::AppServices;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(settings: &Settings) -> anyhow::Result<Router> {
    let services = Arc::new(services::build_services(settings).await?);
    Ok(router(services, &settings.jwt_secret))
}

/// Router over already-wired services.
pub fn router(services: Arc<AppServices>, jwt_secret: &str) -> Router {
    let jwt = Arc::new(Hs256JwtValidator::new(jwt_secret.as_bytes()));
    let auth_state = middleware::AuthState { jwt };

    // Mutations: require a valid bearer token.
    let protected = routes::protected_router().layer(axum::middleware::from_fn_with_state(
        auth_state,
        middleware::auth_middleware,
    ));

    routes::public_router()
        .merge(protected)
        .layer(ServiceBuilder::new().layer(Extension(services)))
}
