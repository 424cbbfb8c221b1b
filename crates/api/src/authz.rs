//! Capability gate for mutating endpoints.
//!
//! Handlers call [`require`] before touching any service, so a caller lacking
//! the capability never reaches the stock layer.

use axum::{http::StatusCode, response::Response};
use stockyard_auth::{AuthzError, Capability, authorize};

use crate::app::errors::json_error;
use crate::context::PrincipalContext;

pub fn require(principal: &PrincipalContext, capability: Capability) -> Result<(), Response> {
    authorize(principal.principal(), capability).map_err(|e| match e {
        AuthzError::Forbidden { required, .. } => json_error(
            StatusCode::FORBIDDEN,
            "forbidden",
            format!("Missing required capability: {required}."),
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockyard_auth::{Principal, Role};
    use stockyard_core::UserId;

    fn ctx(role: Role) -> PrincipalContext {
        PrincipalContext::new(Principal::new(UserId::new(), role))
    }

    #[test]
    fn granted_capability_passes() {
        assert!(require(&ctx(Role::Admin), Capability::TransferStock).is_ok());
        assert!(require(&ctx(Role::Manager), Capability::AdjustStock).is_ok());
    }

    #[test]
    fn missing_capability_is_forbidden() {
        let response = require(&ctx(Role::Viewer), Capability::TransferStock).unwrap_err();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
