//! Session facade: one handle over the clock, the draft store and the
//! ingestion pipeline.
//!
//! This is the surface the host app drives. It owns the strict
//! stop-then-clear-then-start ordering on session start, so two ingestion
//! registrations can never write into the same draft concurrently, and a
//! new session can never see the previous session's points.

use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use once_cell::sync::Lazy;

use crate::batcher::FlushConfig;
use crate::clock::{RunState, SessionClock};
use crate::draft::{Draft, DraftPatch, DraftStore};
use crate::error::Result;
use crate::geo_utils::haversine_distance;
use crate::ingest::{IngestConfig, IngestionTask};
use crate::route::{render, RouteConfig, RouteView};
use crate::types::{GpsPoint, RawFix, TrackPoint};

/// Top-level configuration, all fields overridable with defaults.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub flush: FlushConfig,
    pub route: RouteConfig,
    pub ingest: IngestConfig,
    /// Settle delay between stopping the previous ingestion and clearing
    /// the draft on session start. Default: 250 ms.
    pub settle_delay_ms: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            flush: FlushConfig::default(),
            route: RouteConfig::default(),
            ingest: IngestConfig::default(),
            settle_delay_ms: 250,
        }
    }
}

/// Summary reading over the committed track.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackStats {
    pub point_count: u64,
    /// Path length in meters, gap jumps excluded.
    pub distance_meters: f64,
    pub duration_ms: i64,
    pub avg_speed_mps: f64,
}

/// The activity-tracking pipeline behind one handle.
pub struct SessionTracker {
    clock: SessionClock,
    draft: DraftStore,
    ingestion: IngestionTask,
    config: TrackerConfig,
}

impl SessionTracker {
    /// Open the tracker over the local store at `db_path`.
    pub fn open(db_path: &str, config: TrackerConfig) -> Result<Self> {
        let draft = DraftStore::open(db_path)?;
        let ingestion =
            IngestionTask::new(db_path, config.ingest.clone(), config.flush.clone());
        Ok(Self {
            clock: SessionClock::new(),
            draft,
            ingestion,
            config,
        })
    }

    /// Recover state after an app relaunch.
    ///
    /// Restores the persisted clock snapshot and, when a session was live,
    /// re-starts ingestion seeded with the committed points so the batcher
    /// treats them as already durable.
    pub fn hydrate(&mut self) -> Result<Draft> {
        let draft = self.draft.load_on_startup()?;
        self.clock.restore(draft.clock.clone());

        let live = matches!(self.clock.state(), RunState::Running | RunState::Paused);
        let gps_allowed = self
            .clock
            .session()
            .map(|s| s.gps_allowed)
            .unwrap_or(false);

        if live && gps_allowed {
            let seed = self.draft.store().load_points()?;
            log::info!("hydrating live session with {} committed points", seed.len());
            self.ingestion.start(seed)?;
        }

        Ok(draft)
    }

    /// Start a fresh session.
    ///
    /// Ordering is strict: stop the previous ingestion and await it, give
    /// the store a short settle window, clear the draft (which drops the
    /// prior session's points), then start the clock and the new
    /// ingestion. `total_duration_ms` of 0 selects stopwatch mode.
    pub fn start_session(
        &mut self,
        activity_type: &str,
        label: &str,
        gps_allowed: bool,
        total_duration_ms: i64,
    ) -> Result<()> {
        self.ingestion.stop()?;
        if self.config.settle_delay_ms > 0 {
            thread::sleep(Duration::from_millis(self.config.settle_delay_ms));
        }
        self.draft.clear()?;

        self.clock.cancel();
        self.clock.start(
            activity_type.to_string(),
            label.to_string(),
            gps_allowed,
            total_duration_ms,
        )?;

        self.draft.merge_append(&DraftPatch {
            title: Some(label.to_string()),
            activity_type: Some(activity_type.to_string()),
            flushed_point_count: Some(0),
            clock: self.clock.session().cloned(),
            ..DraftPatch::default()
        })?;

        if gps_allowed {
            self.ingestion.start(Vec::new())?;
        }
        Ok(())
    }

    /// Pause the clock. Ingestion keeps running; the clock is decoupled
    /// from point data.
    pub fn pause(&mut self) -> Result<()> {
        self.clock.pause()?;
        self.persist_clock()
    }

    /// Resume the clock.
    pub fn resume(&mut self) -> Result<()> {
        self.clock.resume()?;
        self.persist_clock()
    }

    /// Complete the session: freeze the clock, stop ingestion (final flush
    /// included) and return the committed point list for the save flow.
    pub fn stop_session(&mut self) -> Result<Vec<TrackPoint>> {
        self.clock.stop()?;
        self.ingestion.stop()?;
        self.persist_clock()?;
        self.draft.store().load_points()
    }

    /// Abort the session: unconditional clock reset, stop ingestion, wipe
    /// the draft and its points. Last writer wins.
    pub fn discard(&mut self) -> Result<()> {
        self.clock.cancel();
        self.ingestion.stop()?;
        self.draft.clear()
    }

    /// OS callback pass-through.
    pub fn submit_fixes(&self, fixes: &[RawFix]) {
        self.ingestion.submit(fixes);
    }

    /// Elapsed session time in milliseconds.
    pub fn elapsed(&self) -> i64 {
        self.clock.elapsed()
    }

    /// Edge-triggered countdown alarm poll.
    pub fn poll_alarm(&mut self) -> bool {
        let fired = self.clock.poll_alarm();
        if fired {
            if let Err(err) = self.persist_clock() {
                log::warn!("failed to persist alarm state: {err}");
            }
        }
        fired
    }

    pub fn state(&self) -> RunState {
        self.clock.state()
    }

    /// Merge foreground metadata edits into the draft.
    pub fn update_draft(&mut self, patch: &DraftPatch) -> Result<()> {
        self.draft.merge_append(patch)
    }

    /// Read the current draft.
    pub fn current_draft(&self) -> Result<Draft> {
        self.draft.load_on_startup()
    }

    /// Reconstruct the renderable route from the committed points.
    pub fn route(&self) -> Result<RouteView> {
        let points = self.draft.store().load_points()?;
        Ok(render(&points, &self.config.route))
    }

    /// Summary stats over the committed points and the clock.
    pub fn stats(&self) -> Result<TrackStats> {
        let points = self.draft.store().load_points()?;
        let positions: Vec<GpsPoint> = points.iter().map(TrackPoint::position).collect();

        let mut distance_meters = 0.0;
        for pair in positions.windows(2) {
            let d = haversine_distance(&pair[0], &pair[1]);
            // A gap-sized jump is lost signal, not motion.
            if d <= self.config.route.gap_threshold_meters {
                distance_meters += d;
            }
        }

        let duration_ms = self.clock.elapsed();
        let avg_speed_mps = if duration_ms > 0 {
            distance_meters / (duration_ms as f64 / 1_000.0)
        } else {
            0.0
        };

        Ok(TrackStats {
            point_count: points.len() as u64,
            distance_meters,
            duration_ms,
            avg_speed_mps,
        })
    }

    fn persist_clock(&mut self) -> Result<()> {
        self.draft.merge_append(&DraftPatch {
            clock: self.clock.session().cloned(),
            ..DraftPatch::default()
        })
    }
}

// ============================================================================
// Global tracker for the host boundary
// ============================================================================

/// Global tracker instance, so host calls can reach a shared pipeline
/// without passing state back and forth across the boundary.
pub static TRACKER: Lazy<Mutex<Option<SessionTracker>>> = Lazy::new(|| Mutex::new(None));

/// Run a closure against the global tracker, if initialized.
pub fn with_tracker<F, R>(f: F) -> Option<R>
where
    F: FnOnce(&mut SessionTracker) -> R,
{
    let mut guard = TRACKER.lock().ok()?;
    guard.as_mut().map(f)
}
