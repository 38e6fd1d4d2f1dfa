// tests/monitor_cycles.rs
//
// Scheduler-level tests with a scripted fetcher and a recording notifier:
// seed suppression, exactly-once notification, fetch-failure resilience,
// forced-check equivalence, overlap skipping, idempotent start.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use release_monitor::detector::{ChangeDetector, Transition};
use release_monitor::notify::{DeliveryError, Notify};
use release_monitor::scheduler::{CycleStatus, PollScheduler, SourceOutcome};
use release_monitor::source::fetcher::VersionFetch;
use release_monitor::source::{ExtractionRule, FetchError, SourceDescriptor};
use release_monitor::store::VersionStore;

fn descriptor(id: &str) -> SourceDescriptor {
    SourceDescriptor {
        id: id.into(),
        title: format!("{id} release"),
        url: format!("https://example.invalid/{id}"),
        rule: ExtractionRule::PagePattern {
            pattern: r"\d+(?:\.\d+)*".into(),
        },
        link: None,
        color: 0x5865F2,
    }
}

/// Returns one scripted step per fetch, in order. An exhausted script keeps
/// returning the last step.
#[derive(Default)]
struct ScriptedFetcher {
    scripts: Mutex<HashMap<String, VecDeque<Result<String, String>>>>,
}

impl ScriptedFetcher {
    fn script(&self, id: &str, steps: &[Result<&str, &str>]) {
        let queue = steps
            .iter()
            .map(|s| s.map(str::to_string).map_err(str::to_string))
            .collect();
        self.scripts.lock().unwrap().insert(id.to_string(), queue);
    }
}

#[async_trait]
impl VersionFetch for ScriptedFetcher {
    async fn fetch(&self, d: &SourceDescriptor) -> Result<String, FetchError> {
        let mut scripts = self.scripts.lock().unwrap();
        let queue = scripts
            .get_mut(&d.id)
            .unwrap_or_else(|| panic!("no script for source {}", d.id));
        let step = if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue.front().cloned().expect("empty script")
        };
        step.map_err(FetchError::Network)
    }
}

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<(String, String, String)>>,
    attempts: AtomicUsize,
    fail: AtomicBool,
}

impl RecordingNotifier {
    fn sent(&self) -> Vec<(String, String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notify for RecordingNotifier {
    async fn dispatch(&self, t: &Transition) -> Result<(), DeliveryError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(DeliveryError::Sink("sink unreachable".into()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((t.source.id.clone(), t.old.clone(), t.new.clone()));
        Ok(())
    }
}

fn build(
    sources: Vec<SourceDescriptor>,
    fetcher: Arc<ScriptedFetcher>,
    notifier: Arc<RecordingNotifier>,
) -> Arc<PollScheduler> {
    let store = Arc::new(VersionStore::new());
    let detector = Arc::new(ChangeDetector::new(fetcher, store));
    Arc::new(PollScheduler::new(
        sources,
        detector,
        notifier,
        Duration::from_secs(300),
    ))
}

#[tokio::test]
async fn seed_then_change_notifies_exactly_once_per_transition() {
    let fetcher = Arc::new(ScriptedFetcher::default());
    fetcher.script(
        "appstore",
        &[Ok("59.0"), Ok("59.0"), Ok("60.0"), Ok("60.0"), Ok("61.0")],
    );
    let notifier = Arc::new(RecordingNotifier::default());
    let scheduler = build(vec![descriptor("appstore")], fetcher, notifier.clone());

    let first = scheduler.run_cycle().await;
    assert_eq!(first.status, CycleStatus::Completed);
    assert!(matches!(
        first.sources[0].outcome,
        SourceOutcome::Seeded { ref version } if version == "59.0"
    ));

    for _ in 0..4 {
        scheduler.run_cycle().await;
    }

    assert_eq!(
        notifier.sent(),
        vec![
            ("appstore".to_string(), "59.0".to_string(), "60.0".to_string()),
            ("appstore".to_string(), "60.0".to_string(), "61.0".to_string()),
        ]
    );
}

#[tokio::test]
async fn failing_source_never_blocks_the_other() {
    let fetcher = Arc::new(ScriptedFetcher::default());
    fetcher.script("appstore", &[Err("connection refused")]);
    fetcher.script("webpage", &[Ok("1.0"), Ok("2.0")]);
    let notifier = Arc::new(RecordingNotifier::default());
    let scheduler = build(
        vec![descriptor("appstore"), descriptor("webpage")],
        fetcher,
        notifier.clone(),
    );

    let first = scheduler.run_cycle().await;
    let second = scheduler.run_cycle().await;

    for report in [&first, &second] {
        let appstore = report
            .sources
            .iter()
            .find(|s| s.source == "appstore")
            .unwrap();
        assert!(matches!(appstore.outcome, SourceOutcome::FetchFailed { .. }));
    }

    assert_eq!(
        notifier.sent(),
        vec![("webpage".to_string(), "1.0".to_string(), "2.0".to_string())]
    );
}

#[tokio::test]
async fn forced_check_with_unchanged_version_is_silent() {
    let fetcher = Arc::new(ScriptedFetcher::default());
    fetcher.script("appstore", &[Ok("59.0")]);
    let notifier = Arc::new(RecordingNotifier::default());
    let scheduler = build(vec![descriptor("appstore")], fetcher, notifier.clone());

    scheduler.run_cycle().await; // seeds

    let forced = scheduler.trigger_manual_check().await;
    assert_eq!(forced.status, CycleStatus::Completed);
    assert!(matches!(
        forced.sources[0].outcome,
        SourceOutcome::Unchanged { ref version } if version == "59.0"
    ));
    assert!(notifier.sent().is_empty());
}

#[tokio::test]
async fn delivery_failure_is_not_retried_next_cycle() {
    let fetcher = Arc::new(ScriptedFetcher::default());
    fetcher.script("appstore", &[Ok("59.0"), Ok("60.0"), Ok("60.0")]);
    let notifier = Arc::new(RecordingNotifier::default());
    notifier.fail.store(true, Ordering::SeqCst);
    let scheduler = build(vec![descriptor("appstore")], fetcher, notifier.clone());

    scheduler.run_cycle().await; // seeds 59.0

    let second = scheduler.run_cycle().await;
    match &second.sources[0].outcome {
        SourceOutcome::Changed {
            delivered,
            delivery_error,
            ..
        } => {
            assert!(!delivered);
            assert!(delivery_error.is_some());
        }
        other => panic!("expected changed outcome, got {other:?}"),
    }

    // Store already holds 60.0, so the failed notification is gone for good.
    let third = scheduler.run_cycle().await;
    assert!(matches!(
        third.sources[0].outcome,
        SourceOutcome::Unchanged { ref version } if version == "60.0"
    ));
    assert_eq!(notifier.attempts.load(Ordering::SeqCst), 1);
}

/// Holds every fetch until released, to keep a cycle in flight.
struct StallingFetcher {
    release: tokio::sync::Notify,
}

#[async_trait]
impl VersionFetch for StallingFetcher {
    async fn fetch(&self, _d: &SourceDescriptor) -> Result<String, FetchError> {
        self.release.notified().await;
        Ok("1.0".into())
    }
}

#[tokio::test]
async fn manual_check_while_running_is_skipped_not_queued() {
    let fetcher = Arc::new(StallingFetcher {
        release: tokio::sync::Notify::new(),
    });
    let notifier = Arc::new(RecordingNotifier::default());
    let store = Arc::new(VersionStore::new());
    let detector = Arc::new(ChangeDetector::new(fetcher.clone(), store));
    let scheduler = Arc::new(PollScheduler::new(
        vec![descriptor("appstore")],
        detector,
        notifier,
        Duration::from_secs(300),
    ));

    let running = tokio::spawn({
        let scheduler = Arc::clone(&scheduler);
        async move { scheduler.run_cycle().await }
    });
    // Let the first cycle take the gate and park in its fetch.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let second = scheduler.trigger_manual_check().await;
    assert_eq!(second.status, CycleStatus::Skipped);
    assert!(second.sources.is_empty());

    fetcher.release.notify_waiters();
    let first = running.await.unwrap();
    assert_eq!(first.status, CycleStatus::Completed);
}

#[tokio::test]
async fn start_is_idempotent_and_shuts_down_cleanly() {
    let fetcher = Arc::new(ScriptedFetcher::default());
    fetcher.script("appstore", &[Ok("59.0")]);
    let notifier = Arc::new(RecordingNotifier::default());
    let scheduler = build(vec![descriptor("appstore")], fetcher, notifier);

    let handle = Arc::clone(&scheduler).start().expect("first start");
    assert!(Arc::clone(&scheduler).start().is_none(), "second start must no-op");

    // First tick fires immediately and seeds the source.
    tokio::time::sleep(Duration::from_millis(100)).await;
    scheduler.shutdown();
    handle.await.unwrap();
}
