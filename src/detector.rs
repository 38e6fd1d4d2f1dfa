// src/detector.rs
use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::counter;

use crate::source::fetcher::VersionFetch;
use crate::source::{FetchError, SourceDescriptor};
use crate::store::{CasOutcome, VersionStore};

/// Ephemeral change record. Produced here, consumed once by the notifier,
/// never persisted.
#[derive(Debug, Clone)]
pub struct Transition {
    pub source: SourceDescriptor,
    pub old: String,
    pub new: String,
    pub detected_at: DateTime<Utc>,
}

/// What one evaluation of a source concluded. Only `Changed` carries a
/// [`Transition`]; everything else is a silent outcome.
#[derive(Debug)]
pub enum EvalOutcome {
    Seeded { version: String },
    Unchanged { version: String },
    Changed(Transition),
    FetchFailed(FetchError),
}

impl EvalOutcome {
    pub fn into_transition(self) -> Option<Transition> {
        match self {
            EvalOutcome::Changed(t) => Some(t),
            _ => None,
        }
    }
}

/// Compares freshly fetched versions against the store. A forced check goes
/// through the exact same path as a scheduled tick; `force` only changes
/// when evaluation happens, never what it concludes.
pub struct ChangeDetector {
    fetcher: Arc<dyn VersionFetch>,
    store: Arc<VersionStore>,
}

impl ChangeDetector {
    pub fn new(fetcher: Arc<dyn VersionFetch>, store: Arc<VersionStore>) -> Self {
        Self { fetcher, store }
    }

    pub fn store(&self) -> &Arc<VersionStore> {
        &self.store
    }

    pub fn fetcher(&self) -> &Arc<dyn VersionFetch> {
        &self.fetcher
    }

    pub async fn evaluate(&self, descriptor: &SourceDescriptor) -> EvalOutcome {
        let version = match self.fetcher.fetch(descriptor).await {
            Ok(v) => v,
            Err(e) => {
                // Not an error state for the monitor, just a skipped cycle
                // for this source.
                tracing::warn!(source = %descriptor.id, error = %e, "fetch failed");
                counter!("monitor_fetch_errors_total", "source" => descriptor.id.clone())
                    .increment(1);
                return EvalOutcome::FetchFailed(e);
            }
        };

        match self.store.compare_and_set(&descriptor.id, &version) {
            CasOutcome::Seeded => {
                tracing::info!(source = %descriptor.id, version = %version, "seeded version cache");
                EvalOutcome::Seeded { version }
            }
            CasOutcome::Unchanged => {
                tracing::trace!(source = %descriptor.id, version = %version, "no change");
                EvalOutcome::Unchanged { version }
            }
            CasOutcome::Changed { old, new } => {
                counter!("monitor_transitions_total", "source" => descriptor.id.clone())
                    .increment(1);
                EvalOutcome::Changed(Transition {
                    source: descriptor.clone(),
                    old,
                    new,
                    detected_at: Utc::now(),
                })
            }
        }
    }
}
