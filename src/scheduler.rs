// src/scheduler.rs
//
// Drives fetch -> detect -> dispatch for all sources. One periodic task plus
// on-demand invocations, all funneled through the same Idle/Running gate:
// a cycle that is still running when the next tick (or a manual trigger)
// arrives is skipped, never queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::detector::{ChangeDetector, EvalOutcome};
use crate::notify::Notify;
use crate::source::SourceDescriptor;

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("monitor_cycles_total", "Completed poll cycles.");
        describe_counter!(
            "monitor_cycles_skipped_total",
            "Cycles skipped because one was already running."
        );
        describe_counter!("monitor_fetch_errors_total", "Source fetch/parse errors.");
        describe_counter!("monitor_transitions_total", "Confirmed version transitions.");
        describe_counter!("monitor_delivery_errors_total", "Failed notification deliveries.");
        describe_gauge!(
            "monitor_last_cycle_ts",
            "Unix ts when the last poll cycle completed."
        );
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStatus {
    Completed,
    /// A cycle was already in flight; nothing was evaluated.
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceOutcome {
    Seeded {
        version: String,
    },
    Unchanged {
        version: String,
    },
    Changed {
        old: String,
        new: String,
        delivered: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        delivery_error: Option<String>,
    },
    FetchFailed {
        error: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub source: String,
    pub outcome: SourceOutcome,
}

/// What a single invocation (tick or manual) did, per source.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub status: CycleStatus,
    pub sources: Vec<SourceReport>,
}

impl CycleReport {
    fn skipped() -> Self {
        Self {
            status: CycleStatus::Skipped,
            sources: Vec::new(),
        }
    }
}

/// Per-source view for the status surface.
#[derive(Debug, Clone, Serialize)]
pub struct SourceStatus {
    pub source: String,
    pub title: String,
    pub last_known: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub live: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub live_error: Option<String>,
}

pub struct PollScheduler {
    sources: Vec<SourceDescriptor>,
    detector: Arc<ChangeDetector>,
    notifier: Arc<dyn Notify>,
    interval: Duration,
    /// Idle/Running gate shared by the periodic tick and manual triggers.
    gate: tokio::sync::Mutex<()>,
    started: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl PollScheduler {
    pub fn new(
        sources: Vec<SourceDescriptor>,
        detector: Arc<ChangeDetector>,
        notifier: Arc<dyn Notify>,
        interval: Duration,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            sources,
            detector,
            notifier,
            interval,
            gate: tokio::sync::Mutex::new(()),
            started: AtomicBool::new(false),
            shutdown_tx,
            shutdown_rx,
        }
    }

    pub fn sources(&self) -> &[SourceDescriptor] {
        &self.sources
    }

    /// Spawn the periodic loop. Idempotent: a second start is a no-op and
    /// returns `None`. The first tick fires immediately and seeds all
    /// sources.
    pub fn start(self: Arc<Self>) -> Option<JoinHandle<()>> {
        if self.started.swap(true, Ordering::SeqCst) {
            tracing::warn!("scheduler already started; ignoring");
            return None;
        }

        let this = self;
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut shutdown = this.shutdown_rx.clone();
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let report = this.run_cycle().await;
                        tracing::info!(
                            target: "monitor",
                            status = ?report.status,
                            sources = report.sources.len(),
                            "poll tick"
                        );
                    }
                    _ = shutdown.changed() => break,
                }
            }
            tracing::info!("scheduler loop stopped");
        }))
    }

    /// Ask the loop to stop after the in-flight cycle (if any) finishes.
    /// Await the handle returned by [`start`](Self::start) to join it.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Manual trigger. Identical detection semantics to a scheduled tick;
    /// only the timing differs.
    pub async fn trigger_manual_check(&self) -> CycleReport {
        self.run_cycle().await
    }

    /// Run one cycle through the Idle/Running gate. Sources are evaluated
    /// concurrently and independently; one source's failure never blocks
    /// the others. Resulting transitions are dispatched one at a time.
    pub async fn run_cycle(&self) -> CycleReport {
        ensure_metrics_described();

        let Ok(_running) = self.gate.try_lock() else {
            counter!("monitor_cycles_skipped_total").increment(1);
            tracing::debug!("cycle already running; skipping");
            return CycleReport::skipped();
        };

        let mut handles = Vec::with_capacity(self.sources.len());
        for descriptor in self.sources.iter().cloned() {
            let detector = Arc::clone(&self.detector);
            handles.push(tokio::spawn(async move {
                let outcome = detector.evaluate(&descriptor).await;
                (descriptor, outcome)
            }));
        }

        let mut reports = Vec::with_capacity(handles.len());
        for handle in handles {
            let (descriptor, outcome) = match handle.await {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::warn!(error = %e, "source evaluation task failed");
                    continue;
                }
            };
            let outcome = match outcome {
                EvalOutcome::Seeded { version } => SourceOutcome::Seeded { version },
                EvalOutcome::Unchanged { version } => SourceOutcome::Unchanged { version },
                EvalOutcome::FetchFailed(e) => SourceOutcome::FetchFailed {
                    error: e.to_string(),
                },
                EvalOutcome::Changed(transition) => {
                    let (old, new) = (transition.old.clone(), transition.new.clone());
                    match self.notifier.dispatch(&transition).await {
                        Ok(()) => {
                            tracing::info!(
                                source = %descriptor.id,
                                old = %old,
                                new = %new,
                                "transition notified"
                            );
                            SourceOutcome::Changed {
                                old,
                                new,
                                delivered: true,
                                delivery_error: None,
                            }
                        }
                        Err(e) => {
                            // Store is already committed; the next cycle sees
                            // this version as unchanged. At-most-once.
                            tracing::warn!(source = %descriptor.id, error = %e, "delivery failed");
                            counter!("monitor_delivery_errors_total").increment(1);
                            SourceOutcome::Changed {
                                old,
                                new,
                                delivered: false,
                                delivery_error: Some(e.to_string()),
                            }
                        }
                    }
                }
            };
            reports.push(SourceReport {
                source: descriptor.id,
                outcome,
            });
        }

        counter!("monitor_cycles_total").increment(1);
        gauge!("monitor_last_cycle_ts").set(chrono::Utc::now().timestamp().max(0) as f64);

        CycleReport {
            status: CycleStatus::Completed,
            sources: reports,
        }
    }

    /// Per-source status: cached version, optionally a fresh live fetch.
    /// Live fetches bypass the store entirely, so a status call can never
    /// produce or suppress a transition.
    pub async fn status(&self, include_live: bool) -> Vec<SourceStatus> {
        let mut out = Vec::with_capacity(self.sources.len());
        for descriptor in &self.sources {
            let record = self.detector.store().get(&descriptor.id);
            let (live, live_error) = if include_live {
                match self.detector.fetcher().fetch(descriptor).await {
                    Ok(v) => (Some(v), None),
                    Err(e) => (None, Some(e.to_string())),
                }
            } else {
                (None, None)
            };
            out.push(SourceStatus {
                source: descriptor.id.clone(),
                title: descriptor.title.clone(),
                last_known: record.last_known,
                live,
                live_error,
            });
        }
        out
    }
}
