use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockyard_core::{Entity, FieldErrors, ItemId};

const MAX_NAME_LEN: usize = 255;
const MAX_SKU_LEN: usize = 255;
const MAX_DESCRIPTION_LEN: usize = 1000;
const MAX_CLASSIFIER_LEN: usize = 255;
const MAX_UNIT_LEN: usize = 50;

/// Catalog item.
///
/// The SKU is the business key: unique across the catalog and never changed
/// after creation. `minimum_stock_level` drives low-stock signalling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub brand: Option<String>,
    pub unit_of_measure: String,
    pub minimum_stock_level: i64,
    pub maximum_stock_level: Option<i64>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Item {
    type Id = ItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Create/update payload for an item, validated before it touches storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDraft {
    pub sku: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    pub unit_of_measure: String,
    pub minimum_stock_level: i64,
    #[serde(default)]
    pub maximum_stock_level: Option<i64>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

impl ItemDraft {
    /// Check every field and collect all failures.
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();

        if self.name.trim().is_empty() {
            errors.add("name", "Item name is required.");
        } else if self.name.chars().count() > MAX_NAME_LEN {
            errors.add("name", "Item name cannot exceed 255 characters.");
        }

        if self.sku.trim().is_empty() {
            errors.add("sku", "SKU is required.");
        } else if self.sku.chars().count() > MAX_SKU_LEN {
            errors.add("sku", "SKU cannot exceed 255 characters.");
        }

        if exceeds(&self.description, MAX_DESCRIPTION_LEN) {
            errors.add("description", "Description cannot exceed 1000 characters.");
        }
        if exceeds(&self.category, MAX_CLASSIFIER_LEN) {
            errors.add("category", "Category cannot exceed 255 characters.");
        }
        if exceeds(&self.brand, MAX_CLASSIFIER_LEN) {
            errors.add("brand", "Brand cannot exceed 255 characters.");
        }

        if self.unit_of_measure.trim().is_empty() {
            errors.add("unit_of_measure", "Unit of measure is required.");
        } else if self.unit_of_measure.chars().count() > MAX_UNIT_LEN {
            errors.add("unit_of_measure", "Unit of measure cannot exceed 50 characters.");
        }

        if self.minimum_stock_level < 0 {
            errors.add("minimum_stock_level", "Minimum stock level cannot be negative.");
        }

        if let Some(max) = self.maximum_stock_level {
            if max < 0 {
                errors.add("maximum_stock_level", "Maximum stock level cannot be negative.");
            } else if max <= self.minimum_stock_level {
                errors.add(
                    "maximum_stock_level",
                    "Maximum stock level must be greater than minimum stock level.",
                );
            }
        }

        errors.into_result()
    }
}

fn exceeds(value: &Option<String>, max: usize) -> bool {
    value.as_ref().is_some_and(|v| v.chars().count() > max)
}

fn normalized(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Item {
    /// Build a new active item from a validated draft.
    pub fn create(draft: ItemDraft, now: DateTime<Utc>) -> Result<Self, FieldErrors> {
        draft.validate()?;
        Ok(Self {
            id: ItemId::new(),
            sku: draft.sku.trim().to_string(),
            name: draft.name.trim().to_string(),
            description: normalized(draft.description),
            category: normalized(draft.category),
            brand: normalized(draft.brand),
            unit_of_measure: draft.unit_of_measure.trim().to_string(),
            minimum_stock_level: draft.minimum_stock_level,
            maximum_stock_level: draft.maximum_stock_level,
            is_active: draft.is_active.unwrap_or(true),
            created_at: now,
            updated_at: now,
        })
    }

    /// Apply an update. The SKU must match the existing one.
    pub fn apply_update(&mut self, draft: ItemDraft, now: DateTime<Utc>) -> Result<(), FieldErrors> {
        let mut errors = match draft.validate() {
            Ok(()) => FieldErrors::new(),
            Err(e) => e,
        };
        if !draft.sku.trim().is_empty() && draft.sku.trim() != self.sku {
            errors.add("sku", "SKU cannot be changed once created.");
        }
        errors.into_result()?;

        self.name = draft.name.trim().to_string();
        self.description = normalized(draft.description);
        self.category = normalized(draft.category);
        self.brand = normalized(draft.brand);
        self.unit_of_measure = draft.unit_of_measure.trim().to_string();
        self.minimum_stock_level = draft.minimum_stock_level;
        self.maximum_stock_level = draft.maximum_stock_level;
        if let Some(active) = draft.is_active {
            self.is_active = active;
        }
        self.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> ItemDraft {
        ItemDraft {
            sku: "SKU-001".to_string(),
            name: "Pallet wrap".to_string(),
            description: Some("  ".to_string()),
            category: Some("Packaging".to_string()),
            brand: None,
            unit_of_measure: "roll".to_string(),
            minimum_stock_level: 10,
            maximum_stock_level: Some(100),
            is_active: None,
        }
    }

    #[test]
    fn create_defaults_to_active_and_normalizes_blanks() {
        let item = Item::create(draft(), Utc::now()).unwrap();
        assert!(item.is_active);
        assert_eq!(item.description, None);
        assert_eq!(item.category.as_deref(), Some("Packaging"));
    }

    #[test]
    fn maximum_must_exceed_minimum() {
        let mut d = draft();
        d.maximum_stock_level = Some(10);
        let errors = d.validate().unwrap_err();
        assert!(errors.contains("maximum_stock_level"));
    }

    #[test]
    fn all_failures_are_reported_together() {
        let mut d = draft();
        d.name = String::new();
        d.unit_of_measure = "x".repeat(51);
        d.minimum_stock_level = -1;
        let errors = d.validate().unwrap_err();
        assert!(errors.contains("name"));
        assert!(errors.contains("unit_of_measure"));
        assert!(errors.contains("minimum_stock_level"));
    }

    #[test]
    fn sku_is_immutable_on_update() {
        let mut item = Item::create(draft(), Utc::now()).unwrap();
        let mut d = draft();
        d.sku = "SKU-002".to_string();
        let errors = item.apply_update(d, Utc::now()).unwrap_err();
        assert!(errors.contains("sku"));
        assert_eq!(item.sku, "SKU-001");
    }

    #[test]
    fn update_can_deactivate() {
        let mut item = Item::create(draft(), Utc::now()).unwrap();
        let mut d = draft();
        d.is_active = Some(false);
        d.minimum_stock_level = 5;
        item.apply_update(d, Utc::now()).unwrap();
        assert!(!item.is_active);
        assert_eq!(item.minimum_stock_level, 5);
    }
}
