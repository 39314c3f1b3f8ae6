use std::path::Path;

use anyhow::Context;
use chrono::Utc;

use brook_kernel::BrookEvent;

use crate::engine;

pub struct AppendArgs {
    pub brook_type: String,
    pub id: String,
    pub event_type: String,
    pub data: String,
    pub source: String,
    pub event_id: Option<String>,
    pub expected: Option<i64>,
}

pub async fn run(dir: &Path, args: AppendArgs) -> anyhow::Result<()> {
    let engine = engine::open(dir)?;
    let key = engine::key(&args.brook_type, &args.id)?;
    let expected = engine::expected(args.expected)?;

    let payload: serde_json::Value =
        serde_json::from_str(&args.data).context("Event data must be valid JSON")?;
    let event_id = args.event_id.unwrap_or_else(|| {
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        format!("{}-{}", args.event_type, nanos)
    });
    let event = BrookEvent::json(event_id, args.source, args.event_type, &payload)?.stamped();

    let head = engine.append(&key, vec![event], expected).await?;
    println!("Appended to {} at position {}", key, head);
    Ok(())
}
