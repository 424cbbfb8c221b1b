//! HTTP API: routing, auth and request/response mapping over the stock services.

pub mod app;
pub mod authz;
pub mod context;
pub mod middleware;
