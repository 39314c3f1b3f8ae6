// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Single writer per brook.
//!
//! Appends and pending-marker resolution for a key run under that key's
//! async mutex. Entries are held weakly so idle keys do not accumulate;
//! dead entries are swept whenever the map grows past its last sweep size.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use brook_kernel::BrookKey;

pub type WriterGuard = OwnedMutexGuard<()>;

#[derive(Default)]
struct LockTable {
    entries: HashMap<BrookKey, Weak<AsyncMutex<()>>>,
    sweep_at: usize,
}

#[derive(Default, Clone)]
pub struct KeyedWriterLocks {
    table: Arc<Mutex<LockTable>>,
}

impl KeyedWriterLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, key: &BrookKey) -> Arc<AsyncMutex<()>> {
        let mut table = self.table.lock();
        if let Some(existing) = table.entries.get(key).and_then(Weak::upgrade) {
            return existing;
        }

        if table.entries.len() >= table.sweep_at {
            table.entries.retain(|_, weak| weak.strong_count() > 0);
            table.sweep_at = (table.entries.len() * 2).max(64);
        }

        let lock = Arc::new(AsyncMutex::new(()));
        table.entries.insert(key.clone(), Arc::downgrade(&lock));
        lock
    }

    /// Wait for exclusive write access to `key`.
    pub async fn lock(&self, key: &BrookKey) -> WriterGuard {
        self.entry(key).lock_owned().await
    }

    /// Number of keys with a live lock.
    pub fn active(&self) -> usize {
        self.table
            .lock()
            .entries
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}
