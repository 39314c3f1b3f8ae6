use std::path::Path;

use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};

use brook_kernel::BrookKey;
use brook_persistence::{fs, BrookLayout, RecordKind};

#[derive(Debug, Default)]
pub struct BrookReport {
    pub events: usize,
    pub snapshots: usize,
    pub pending: bool,
    pub issues: Vec<String>,
}

/// Check every frame checksum and that event files are gap-free from 0.
pub fn run(dir: &Path) -> anyhow::Result<()> {
    let layout = BrookLayout::new(dir);
    let keys = layout.list_brooks()?;

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Brook", "Events", "Snapshots", "Status"]);

    let mut corrupted = 0usize;
    for key in &keys {
        let report = verify_brook(&layout, key)?;
        let status = if !report.issues.is_empty() {
            corrupted += 1;
            format!("CORRUPT: {}", report.issues.join("; "))
        } else if report.pending {
            "OK (append pending recovery)".to_string()
        } else {
            "OK".to_string()
        };
        table.add_row(vec![
            key.to_string(),
            report.events.to_string(),
            report.snapshots.to_string(),
            status,
        ]);
    }

    println!("{table}\n");
    if corrupted == 0 {
        println!("✅ VERIFIED {} brook(s)\n", keys.len());
        Ok(())
    } else {
        println!("❌ CORRUPTED {} of {} brook(s)\n", corrupted, keys.len());
        anyhow::bail!("{} brook(s) failed verification", corrupted)
    }
}

pub fn verify_brook(layout: &BrookLayout, key: &BrookKey) -> anyhow::Result<BrookReport> {
    let mut report = BrookReport::default();

    if let Err(e) = fs::read_frame(&layout.head_path(key), RecordKind::Head) {
        report.issues.push(format!("head: {}", e));
    }
    match fs::read_frame(&layout.pending_path(key), RecordKind::PendingHead) {
        Ok(found) => report.pending = found.is_some(),
        Err(e) => report.issues.push(format!("pending marker: {}", e)),
    }

    let positions = layout.event_positions(key)?;
    report.events = positions.len();
    if let Some((expected, found)) = positions
        .iter()
        .enumerate()
        .find(|(i, p)| p.value() != *i as i64)
    {
        report
            .issues
            .push(format!("gap: expected position {}, found {}", expected, found));
    }
    for position in &positions {
        if let Err(e) = fs::read_frame(&layout.event_path(key, *position), RecordKind::Event) {
            report.issues.push(format!("event {}: {}", position, e));
        }
    }

    let snapshots = layout.all_snapshots(key)?;
    report.snapshots = snapshots.len();
    for (fingerprint, position) in &snapshots {
        let path = layout.snapshot_path(key, fingerprint, *position);
        if let Err(e) = fs::read_frame(&path, RecordKind::Snapshot) {
            report
                .issues
                .push(format!("snapshot {}@{}: {}", fingerprint.short(), position, e));
        }
    }

    Ok(report)
}
