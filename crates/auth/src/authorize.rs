use thiserror::Error;

use crate::{Capability, Principal, Role};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: role '{role}' lacks capability '{required}'")]
    Forbidden { role: Role, required: Capability },
}

/// Authorize a principal for one capability.
///
/// - No IO
/// - No panics
/// - Pure policy check
pub fn authorize(principal: &Principal, required: Capability) -> Result<(), AuthzError> {
    if principal.role.grants(required) {
        Ok(())
    } else {
        tracing::debug!(
            user_id = %principal.user_id,
            role = %principal.role,
            capability = %required,
            "authorization denied"
        );
        Err(AuthzError::Forbidden {
            role: principal.role,
            required,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockyard_core::UserId;

    #[test]
    fn forbidden_names_the_capability() {
        let p = Principal::new(UserId::new(), Role::Viewer);
        let err = authorize(&p, Capability::TransferStock).unwrap_err();
        assert!(err.to_string().contains("inventory.transfer"));
    }

    #[test]
    fn admin_is_allowed() {
        let p = Principal::new(UserId::new(), Role::Admin);
        assert!(authorize(&p, Capability::ClearCache).is_ok());
    }
}
