//! `wrench inventory` commands.

use anyhow::{Context, Result};

use wrench_core::store::InventoryStore;
use wrench_db::models::InventoryItem;
use wrench_db::queries::inventory::NewInventoryItem;

use crate::InventoryCommands;
use crate::order_cmds::{parse_id, truncate};

pub async fn run_inventory_command(
    command: InventoryCommands,
    inventory: &dyn InventoryStore,
) -> Result<()> {
    match command {
        InventoryCommands::List => {
            print!("{}", render_items(&inventory.list_items().await?));
            Ok(())
        }
        InventoryCommands::Search { name, location } => {
            let items = inventory
                .search_items(name.as_deref(), location.as_deref())
                .await?;
            print!("{}", render_items(&items));
            Ok(())
        }
        InventoryCommands::Add {
            name,
            quantity,
            location,
            unit_cost_cents,
        } => {
            let item = inventory
                .add_item(&NewInventoryItem {
                    name,
                    quantity,
                    location,
                    unit_cost_cents,
                })
                .await?;
            println!("Stocked {} x {} as {}.", item.quantity, item.name, item.id);
            Ok(())
        }
        InventoryCommands::Adjust { id, delta } => {
            let item = adjust(inventory, &id, delta).await?;
            println!("{} now has {} on hand.", item.name, item.quantity);
            Ok(())
        }
        InventoryCommands::Reserve { id, release } => {
            let id = parse_id("inventory item", &id)?;
            let item = inventory
                .set_reserved(id, !release)
                .await?
                .with_context(|| format!("inventory item {id} not found"))?;
            let state = if item.reserved { "reserved" } else { "released" };
            println!("{} {state}.", item.name);
            Ok(())
        }
    }
}

async fn adjust(inventory: &dyn InventoryStore, id: &str, delta: i32) -> Result<InventoryItem> {
    let id = parse_id("inventory item", id)?;
    inventory
        .adjust_quantity(id, delta)
        .await?
        .with_context(|| format!("inventory item {id} not found"))
}

fn render_items(items: &[InventoryItem]) -> String {
    if items.is_empty() {
        return "No inventory items found.\n".to_owned();
    }

    let mut out = format!(
        "{:<38} {:<28} {:>5} {:<20} {:>10} RESERVED\n",
        "ID", "NAME", "QTY", "LOCATION", "UNIT COST"
    );
    out.push_str(&"-".repeat(112));
    out.push('\n');
    for item in items {
        out.push_str(&format!(
            "{:<38} {:<28} {:>5} {:<20} {:>10} {}\n",
            item.id,
            truncate(&item.name, 26),
            item.quantity,
            truncate(&item.location, 18),
            item.unit_cost_cents.map(format_cents).unwrap_or_else(|| "-".to_owned()),
            if item.reserved { "yes" } else { "" }
        ));
    }
    out
}

fn format_cents(cents: i64) -> String {
    format!("${}.{:02}", cents / 100, cents % 100)
}
