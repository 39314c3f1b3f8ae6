use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use brook_kernel::{BrookKey, BrookPosition, ExpectedVersion};
use brook_node::{BrookEngine, EngineConfig, FileStore};

/// Engine over the file store rooted at `dir`, configured from `BROOK_*` env vars.
pub fn open(dir: &Path) -> Result<BrookEngine<FileStore>> {
    let store = FileStore::open(dir)
        .with_context(|| format!("Failed to open brook store at {}", dir.display()))?;
    let config = EngineConfig::from_env().context("Invalid BROOK_* configuration")?;
    BrookEngine::new(Arc::new(store), config).context("Invalid engine configuration")
}

pub fn key(brook_type: &str, id: &str) -> Result<BrookKey> {
    BrookKey::new(brook_type, id).with_context(|| format!("Invalid brook key {}|{}", brook_type, id))
}

pub fn position(value: i64) -> Result<BrookPosition> {
    BrookPosition::new(value).with_context(|| format!("Invalid position {}", value))
}

/// `None` accepts any head; `-1` means the brook must be empty.
pub fn expected(value: Option<i64>) -> Result<ExpectedVersion> {
    match value {
        None => Ok(ExpectedVersion::Any),
        Some(v) => Ok(ExpectedVersion::Exact(position(v)?)),
    }
}
