//! Background location ingestion: the host-OS boundary of the pipeline.
//!
//! The OS scheduler delivers fix batches on its own cadence, possibly while
//! the UI is not running. The callback entry point here does nothing but
//! normalize and forward over a bounded channel; a worker thread that owns
//! its own store connection drains the channel and drives the batcher. That
//! decouples OS callback frequency from write frequency and keeps the
//! callback non-blocking.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, RecvTimeoutError, SyncSender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::batcher::{FlushConfig, PersistenceBatcher};
use crate::clock::now_ms;
use crate::draft::{DraftPatch, DraftStore};
use crate::error::{Result, TrackerError};
use crate::types::{RawFix, TrackPoint};

/// Ingestion configuration and gating.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Host OS location permission, as last reported by the host. When
    /// unmet, `start` is a silent no-op; the host's own permission-prompt
    /// flow surfaces it to the user.
    pub location_permission: bool,

    /// App-level GPS toggle.
    pub gps_enabled: bool,

    /// Capacity of the bounded channel between the OS callback and the
    /// worker. A full channel drops the batch rather than blocking the
    /// callback. Default: 256.
    pub channel_capacity: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            location_permission: true,
            gps_enabled: true,
            channel_capacity: 256,
        }
    }
}

/// Receives batched fixes from the host scheduler, normalizes them and
/// forwards them to the persistence worker.
///
/// Carries no buffering of its own beyond the channel; it is purely a
/// normalization-and-forwarding boundary.
pub struct IngestionTask {
    db_path: String,
    config: IngestConfig,
    flush_config: FlushConfig,
    started: AtomicBool,
    sender: Option<SyncSender<Vec<TrackPoint>>>,
    worker: Option<JoinHandle<()>>,
}

impl IngestionTask {
    pub fn new(db_path: &str, config: IngestConfig, flush_config: FlushConfig) -> Self {
        Self {
            db_path: db_path.to_string(),
            config,
            flush_config,
            started: AtomicBool::new(false),
            sender: None,
            worker: None,
        }
    }

    /// Register the pipeline if not already registered.
    ///
    /// Idempotent: a second call while already running is a no-op success.
    /// The started flag flips with a compare-and-swap, so two racing starts
    /// cannot both spawn a worker. Silent no-op when the permission or GPS
    /// gates are unmet. `seed` carries points recovered during hydration;
    /// they are treated as already durable.
    pub fn start(&mut self, seed: Vec<TrackPoint>) -> Result<()> {
        if !self.config.location_permission || !self.config.gps_enabled {
            log::info!("ingestion start skipped: location permission or GPS toggle unmet");
            return Ok(());
        }

        if self
            .started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log::debug!("ingestion already started");
            return Ok(());
        }

        let draft_store = match DraftStore::open(&self.db_path) {
            Ok(store) => store,
            Err(err) => {
                self.started.store(false, Ordering::SeqCst);
                return Err(err);
            }
        };

        let now = now_ms();
        let mut batcher = PersistenceBatcher::new(self.flush_config.clone(), now);
        if !seed.is_empty() {
            log::info!("ingestion hydrating {} recovered points", seed.len());
            batcher.replace_from_hydration(seed, now);
        }

        let (sender, receiver) = sync_channel(self.config.channel_capacity);
        let flush_interval = self.flush_config.flush_interval_ms.max(1) as u64;

        let worker = thread::Builder::new()
            .name("tracklog-ingest".into())
            .spawn(move || run_worker(receiver, draft_store, batcher, flush_interval))
            .map_err(|err| {
                self.started.store(false, Ordering::SeqCst);
                TrackerError::Ingestion {
                    message: format!("failed to spawn worker: {err}"),
                }
            })?;

        self.sender = Some(sender);
        self.worker = Some(worker);
        log::info!("ingestion started");
        Ok(())
    }

    /// OS callback entry point: normalize a fix batch and forward it.
    ///
    /// Never blocks and never panics; an empty, invalid or overflowing
    /// batch is swallowed so nothing can propagate into the OS event loop.
    pub fn submit(&self, fixes: &[RawFix]) {
        if fixes.is_empty() {
            return;
        }

        let Some(sender) = self.sender.as_ref() else {
            log::debug!("ingestion not running, dropping {} fixes", fixes.len());
            return;
        };

        let points: Vec<TrackPoint> = fixes
            .iter()
            .filter(|f| f.is_valid())
            .map(TrackPoint::from_fix)
            .collect();
        if points.is_empty() {
            return;
        }

        if let Err(err) = sender.try_send(points) {
            log::warn!("dropping location batch: {err}");
        }
    }

    /// Deregister if registered, otherwise no-op.
    ///
    /// Awaits the worker to completion: the channel closes, the worker
    /// drains what is queued, performs a final flush and exits before this
    /// returns.
    pub fn stop(&mut self) -> Result<()> {
        if !self.started.load(Ordering::SeqCst) {
            return Ok(());
        }

        drop(self.sender.take());
        if let Some(worker) = self.worker.take() {
            worker.join().map_err(|_| TrackerError::Ingestion {
                message: "ingestion worker panicked".into(),
            })?;
        }

        self.started.store(false, Ordering::SeqCst);
        log::info!("ingestion stopped");
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }
}

/// Worker loop: drain the channel at its own cadence.
///
/// A receive timeout at the flush interval drives time-based flushes even
/// when no new fixes arrive; channel disconnect triggers a final flush
/// before exit.
fn run_worker(
    receiver: Receiver<Vec<TrackPoint>>,
    mut draft_store: DraftStore,
    mut batcher: PersistenceBatcher,
    flush_interval_ms: u64,
) {
    let mut reported = batcher.total_flushed();

    loop {
        match receiver.recv_timeout(Duration::from_millis(flush_interval_ms)) {
            Ok(points) => {
                let now = now_ms();
                for point in points {
                    batcher.add_point(point, now, draft_store.store_mut());
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                let now = now_ms();
                if batcher.pending() > 0 && batcher.should_flush(now) {
                    batcher.flush(now, draft_store.store_mut()).ok();
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
        report_flushed(&mut draft_store, &batcher, &mut reported);
    }

    if batcher.pending() > 0 {
        batcher.flush(now_ms(), draft_store.store_mut()).ok();
    }
    report_flushed(&mut draft_store, &batcher, &mut reported);

    log::info!(
        "ingestion worker exiting, {} points durable",
        batcher.total_flushed()
    );
}

/// Mirror the durable point count into the draft when it changes.
fn report_flushed(draft_store: &mut DraftStore, batcher: &PersistenceBatcher, reported: &mut u64) {
    let total = batcher.total_flushed();
    if total == *reported {
        return;
    }
    let patch = DraftPatch {
        flushed_point_count: Some(total),
        ..DraftPatch::default()
    };
    match draft_store.merge_append(&patch) {
        Ok(()) => *reported = total,
        Err(err) => log::warn!("failed to record flushed count: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::TrackerStore;
    use tempfile::TempDir;

    fn fix(timestamp: i64) -> RawFix {
        RawFix {
            latitude: 60.1,
            longitude: 24.9,
            altitude: None,
            accuracy: Some(10.0),
            speed: Some(3.0),
            heading: None,
            timestamp,
        }
    }

    fn setup() -> (IngestionTask, TempDir, String) {
        let tmp = TempDir::new().expect("failed to create temp dir");
        let db_path = tmp.path().join("test.db").to_str().unwrap().to_string();
        let task = IngestionTask::new(&db_path, IngestConfig::default(), FlushConfig::default());
        (task, tmp, db_path)
    }

    #[test]
    fn test_start_is_idempotent() {
        let (mut task, _tmp, _path) = setup();
        task.start(Vec::new()).unwrap();
        assert!(task.is_started());
        // Second start while running is a no-op success, not an error.
        task.start(Vec::new()).unwrap();
        assert!(task.is_started());
        task.stop().unwrap();
        assert!(!task.is_started());
    }

    #[test]
    fn test_stop_without_start_is_noop() {
        let (mut task, _tmp, _path) = setup();
        task.stop().unwrap();
    }

    #[test]
    fn test_gated_start_is_silent_noop() {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("test.db").to_str().unwrap().to_string();
        let config = IngestConfig {
            gps_enabled: false,
            ..IngestConfig::default()
        };
        let mut task = IngestionTask::new(&db_path, config, FlushConfig::default());

        task.start(Vec::new()).unwrap();
        assert!(!task.is_started());
        // Callbacks while not running are swallowed.
        task.submit(&[fix(1_000)]);
        task.stop().unwrap();
    }

    #[test]
    fn test_submitted_fixes_are_durable_after_stop() {
        let (mut task, _tmp, db_path) = setup();
        task.start(Vec::new()).unwrap();

        task.submit(&[fix(1_000), fix(2_000)]);
        // Stop drains the channel and final-flushes the tail.
        task.stop().unwrap();

        let store = TrackerStore::open(&db_path).unwrap();
        assert_eq!(store.count_points().unwrap(), 2);

        let draft = DraftStore::open(&db_path).unwrap().load_on_startup().unwrap();
        assert_eq!(draft.flushed_point_count, 2);
    }

    #[test]
    fn test_invalid_and_empty_batches_swallowed() {
        let (mut task, _tmp, db_path) = setup();
        task.start(Vec::new()).unwrap();

        task.submit(&[]);
        let mut bad = fix(1_000);
        bad.latitude = f64::NAN;
        task.submit(&[bad]);
        task.stop().unwrap();

        let store = TrackerStore::open(&db_path).unwrap();
        assert_eq!(store.count_points().unwrap(), 0);
    }

    #[test]
    fn test_hydration_seed_dedups_and_extends() {
        let (mut task, _tmp, db_path) = setup();

        // Simulate the committed points of an interrupted session.
        let seed: Vec<TrackPoint> = (1..=3).map(|i| TrackPoint::from_fix(&fix(i * 1_000))).collect();
        {
            let mut store = TrackerStore::open(&db_path).unwrap();
            store.insert_points(&seed).unwrap();
        }

        task.start(seed).unwrap();
        // A replayed last fix plus one genuinely new fix.
        task.submit(&[fix(3_000), fix(4_000)]);
        task.stop().unwrap();

        let store = TrackerStore::open(&db_path).unwrap();
        assert_eq!(store.count_points().unwrap(), 4);

        let draft = DraftStore::open(&db_path).unwrap().load_on_startup().unwrap();
        assert_eq!(draft.flushed_point_count, 4);
    }
}
