use std::path::Path;

use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};

use brook_node::BrookStore;

use crate::engine;

/// Status of every brook in the store, read as-is: pending appends are
/// reported, not recovered.
pub async fn run(dir: &Path) -> anyhow::Result<()> {
    let engine = engine::open(dir)?;
    let store = engine.store();
    let keys = store.list_brooks().await?;

    println!("\nBrook Store Report");
    println!("------------------");
    println!("Root: {}\n", store.root().display());

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Brook", "Head", "Status", "Snapshots"]);

    for key in &keys {
        let head = store
            .read_head(key)
            .await?
            .map(|h| h.position.to_string())
            .unwrap_or_else(|| "-".to_string());
        let status = match store.read_pending_head(key).await? {
            Some(pending) => format!(
                "PENDING {}..={} since {}",
                pending.previous_head.value() + 1,
                pending.final_position,
                pending.created_at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
            ),
            None => "OK".to_string(),
        };
        let snapshots = store.list_snapshots(key).await?;
        let detail = match snapshots.iter().map(|d| d.position).max() {
            Some(newest) => format!("{} (newest at {})", snapshots.len(), newest),
            None => "0".to_string(),
        };
        table.add_row(vec![key.to_string(), head, status, detail]);
    }

    if keys.is_empty() {
        println!("No brooks found.\n");
    } else {
        println!("{table}\n");
    }
    Ok(())
}
