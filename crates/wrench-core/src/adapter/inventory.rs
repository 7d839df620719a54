//! Built-in `check_inventory` tool backed by an [`InventoryStore`].

use std::sync::Arc;

use anyhow::{Result, bail};
use async_trait::async_trait;
use serde_json::{Value, json};

use super::Tool;
use crate::store::InventoryStore;

pub const CHECK_INVENTORY: &str = "check_inventory";

/// Looks up spare parts by name, optionally narrowed to a location.
///
/// Arguments: `{"part": "<name fragment>", "location": "<fragment>"}`.
/// The reply is a JSON object; when nothing matches it is
/// `{"part": ..., "available": false}`.
pub struct CheckInventoryTool {
    inventory: Arc<dyn InventoryStore>,
}

impl CheckInventoryTool {
    pub fn new(inventory: Arc<dyn InventoryStore>) -> Self {
        Self { inventory }
    }
}

#[async_trait]
impl Tool for CheckInventoryTool {
    fn name(&self) -> &str {
        CHECK_INVENTORY
    }

    fn description(&self) -> &str {
        "Check spare-part stock. Args: {\"part\": name, \"location\": optional}"
    }

    async fn invoke(&self, args: &Value) -> Result<String> {
        let Some(part) = args
            .get("part")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|p| !p.is_empty())
        else {
            bail!("missing \"part\" argument");
        };
        let location = args.get("location").and_then(Value::as_str);

        let items = self.inventory.search_items(Some(part), location).await?;
        if items.is_empty() {
            return Ok(json!({ "part": part, "available": false }).to_string());
        }

        let matches: Vec<Value> = items
            .iter()
            .map(|item| {
                json!({
                    "name": item.name,
                    "quantity": item.quantity,
                    "location": item.location,
                    "available": item.is_available(),
                })
            })
            .collect();
        let available = items.iter().any(|item| item.is_available());
        Ok(json!({ "part": part, "available": available, "matches": matches }).to_string())
    }
}
