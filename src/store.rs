//! store.rs: the single source of truth for "last known version" per source.
//!
//! All mutation goes through [`VersionStore::compare_and_set`], so the
//! periodic loop and a forced/manual check can never disagree about what
//! was already observed.

use std::collections::HashMap;
use std::sync::Mutex;

/// Per-source cache entry. Created empty at process start, seeded on the
/// first successful fetch, overwritten on every confirmed transition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionRecord {
    pub last_known: Option<String>,
    pub initialized: bool,
}

/// Outcome of a [`VersionStore::compare_and_set`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasOutcome {
    /// First observation for this source; cache seeded silently.
    Seeded,
    /// Same as the cached value (or an empty fetch result); no mutation.
    Unchanged,
    /// A confirmed transition; the cache already holds `new`.
    Changed { old: String, new: String },
}

#[derive(Debug, Default)]
pub struct VersionStore {
    inner: Mutex<HashMap<String, VersionRecord>>,
}

impl VersionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the record for `source_id` (empty record if never seen).
    pub fn get(&self, source_id: &str) -> VersionRecord {
        let map = self.inner.lock().expect("version store mutex poisoned");
        map.get(source_id).cloned().unwrap_or_default()
    }

    /// Sole mutation entry point. Atomic per source: the lock covers the
    /// read-compare-write, so a forced check racing the periodic one still
    /// observes a total order of updates.
    pub fn compare_and_set(&self, source_id: &str, new_version: &str) -> CasOutcome {
        let new_version = new_version.trim();
        if new_version.is_empty() {
            return CasOutcome::Unchanged;
        }

        let mut map = self.inner.lock().expect("version store mutex poisoned");
        let rec = map.entry(source_id.to_string()).or_default();

        if !rec.initialized {
            rec.initialized = true;
            rec.last_known = Some(new_version.to_string());
            return CasOutcome::Seeded;
        }

        match rec.last_known.as_deref() {
            Some(current) if current == new_version => CasOutcome::Unchanged,
            _ => {
                let old = rec
                    .last_known
                    .replace(new_version.to_string())
                    .unwrap_or_default();
                CasOutcome::Changed {
                    old,
                    new: new_version.to_string(),
                }
            }
        }
    }
}
