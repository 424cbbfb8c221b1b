//! `stockyard-auth`: authentication/authorization boundary.
//!
//! This crate is decoupled from HTTP and storage: it turns a bearer token into
//! a [`Principal`] and answers whether that principal holds a [`Capability`].

pub mod authorize;
pub mod claims;
pub mod jwt;
pub mod permissions;
pub mod principal;
pub mod roles;

pub use authorize::{AuthzError, authorize};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use jwt::{Hs256JwtValidator, JwtValidator};
pub use permissions::Capability;
pub use principal::Principal;
pub use roles::Role;
