use serde::{Deserialize, Serialize};

/// Capability required by an endpoint.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ReadInventory,
    TransferStock,
    AdjustStock,
    ManageItems,
    DeleteItems,
    ManageWarehouses,
    ClearCache,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::ReadInventory => "inventory.read",
            Capability::TransferStock => "inventory.transfer",
            Capability::AdjustStock => "inventory.adjust",
            Capability::ManageItems => "items.manage",
            Capability::DeleteItems => "items.delete",
            Capability::ManageWarehouses => "warehouses.manage",
            Capability::ClearCache => "cache.clear",
        }
    }
}

impl core::fmt::Display for Capability {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
