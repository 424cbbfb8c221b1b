use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockyard_core::{Entity, FieldErrors, WarehouseId};

/// A physical stock location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warehouse {
    pub id: WarehouseId,
    pub name: String,
    pub location: Option<String>,
    pub address: Option<String>,
    pub contact_person: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Warehouse {
    type Id = WarehouseId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseDraft {
    pub name: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub contact_person: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

impl WarehouseDraft {
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        if self.name.trim().is_empty() {
            errors.add("name", "Warehouse name is required.");
        } else if self.name.chars().count() > 255 {
            errors.add("name", "Warehouse name cannot exceed 255 characters.");
        }
        if let Some(email) = self.email.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
            if !email.contains('@') {
                errors.add("email", "Email must be a valid address.");
            }
        }
        errors.into_result()
    }
}

impl Warehouse {
    pub fn create(draft: WarehouseDraft, now: DateTime<Utc>) -> Result<Self, FieldErrors> {
        draft.validate()?;
        let clean = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        Ok(Self {
            id: WarehouseId::new(),
            name: draft.name.trim().to_string(),
            location: clean(draft.location),
            address: clean(draft.address),
            contact_person: clean(draft.contact_person),
            phone: clean(draft.phone),
            email: clean(draft.email),
            is_active: draft.is_active.unwrap_or(true),
            created_at: now,
            updated_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(name: &str) -> WarehouseDraft {
        WarehouseDraft {
            name: name.to_string(),
            location: Some("Rotterdam".to_string()),
            address: None,
            contact_person: None,
            phone: None,
            email: Some("ops@example.com".to_string()),
            is_active: None,
        }
    }

    #[test]
    fn create_is_active_by_default() {
        let wh = Warehouse::create(draft("North"), Utc::now()).unwrap();
        assert!(wh.is_active);
        assert_eq!(wh.location.as_deref(), Some("Rotterdam"));
    }

    #[test]
    fn blank_name_and_bad_email_are_rejected() {
        let mut d = draft(" ");
        d.email = Some("nope".to_string());
        let errors = Warehouse::create(d, Utc::now()).unwrap_err();
        assert!(errors.contains("name"));
        assert!(errors.contains("email"));
    }
}
