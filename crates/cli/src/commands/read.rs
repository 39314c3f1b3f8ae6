use std::path::Path;

use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};

use brook_kernel::BrookRangeKey;

use crate::engine;

pub async fn run(
    dir: &Path,
    brook_type: &str,
    id: &str,
    from: i64,
    to: Option<i64>,
) -> anyhow::Result<()> {
    let engine = engine::open(dir)?;
    let key = engine::key(brook_type, id)?;

    let head = engine.get_head(&key).await?;
    if !head.is_set() {
        println!("\n{} is empty\n", key);
        return Ok(());
    }
    let end = match to {
        Some(to) => engine::position(to)?.min(head),
        None => head,
    };
    let range = BrookRangeKey::new(key.clone(), engine::position(from)?, end)?;
    let outcome = engine.read_all(range).await?;

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Position", "Id", "Type", "Time", "Data"]);

    let start = from.max(0);
    for (offset, event) in outcome.events.iter().enumerate() {
        let time = event
            .time()
            .map(|t| t.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
            .unwrap_or_default();
        let data = match std::str::from_utf8(event.data()) {
            Ok(text) => text.to_string(),
            Err(_) => format!("<{} bytes {}>", event.data().len(), event.data_content_type()),
        };
        table.add_row(vec![
            (start + offset as i64).to_string(),
            event.id().to_string(),
            event.event_type().to_string(),
            time,
            data,
        ]);
    }

    println!("\n{} [{}..={}]\n", key, start, end);
    println!("{table}\n");
    if !outcome.complete {
        println!("⚠️  WARNING: store stopped short of position {}; the listing is partial.\n", end);
    }
    Ok(())
}
