//! FFI exports for the mobile host (iOS/Android).
//!
//! One global tracker behind a mutex; the host initializes it once at app
//! startup and every call goes through [`with_tracker`]. Structured payloads
//! cross the boundary as JSON strings in both directions, which keeps the
//! exported signatures flat.

use log::info;

use crate::draft::DraftPatch;
use crate::session::{with_tracker, SessionTracker, TrackerConfig, TRACKER};
use crate::types::RawFix;

/// Initialize the global tracker with a database path and hydrate any
/// interrupted session. Call once at app startup.
#[uniffi::export]
pub fn tracker_init(db_path: String) -> bool {
    crate::init_logging();
    info!("[Tracker] initializing with db: {db_path}");

    match SessionTracker::open(&db_path, TrackerConfig::default()) {
        Ok(mut tracker) => {
            if let Err(err) = tracker.hydrate() {
                info!("[Tracker] hydration failed: {err}");
            }
            match TRACKER.lock() {
                Ok(mut guard) => {
                    *guard = Some(tracker);
                    info!("[Tracker] initialized");
                    true
                }
                Err(_) => false,
            }
        }
        Err(err) => {
            info!("[Tracker] failed to initialize: {err}");
            false
        }
    }
}

/// Check whether the global tracker is initialized.
#[uniffi::export]
pub fn tracker_is_initialized() -> bool {
    TRACKER
        .lock()
        .map(|guard| guard.is_some())
        .unwrap_or(false)
}

/// Start a fresh session. `total_duration_ms` of 0 selects stopwatch mode.
#[uniffi::export]
pub fn tracker_start_session(
    activity_type: String,
    label: String,
    gps_allowed: bool,
    total_duration_ms: i64,
) -> bool {
    with_tracker(|t| {
        match t.start_session(&activity_type, &label, gps_allowed, total_duration_ms) {
            Ok(()) => true,
            Err(err) => {
                info!("[Tracker] start_session failed: {err}");
                false
            }
        }
    })
    .unwrap_or(false)
}

#[uniffi::export]
pub fn tracker_pause() -> bool {
    with_tracker(|t| t.pause().is_ok()).unwrap_or(false)
}

#[uniffi::export]
pub fn tracker_resume() -> bool {
    with_tracker(|t| t.resume().is_ok()).unwrap_or(false)
}

/// Complete the running session, final-flushing its points.
#[uniffi::export]
pub fn tracker_stop_session() -> bool {
    with_tracker(|t| t.stop_session().is_ok()).unwrap_or(false)
}

/// Abort the session and wipe the draft.
#[uniffi::export]
pub fn tracker_discard() -> bool {
    with_tracker(|t| t.discard().is_ok()).unwrap_or(false)
}

/// Elapsed session time in milliseconds.
#[uniffi::export]
pub fn tracker_elapsed_ms() -> i64 {
    with_tracker(|t| t.elapsed()).unwrap_or(0)
}

/// Current run state: "idle", "running", "paused" or "completed".
#[uniffi::export]
pub fn tracker_state() -> String {
    use crate::clock::RunState;
    let state = with_tracker(|t| t.state()).unwrap_or(RunState::Idle);
    match state {
        RunState::Idle => "idle",
        RunState::Running => "running",
        RunState::Paused => "paused",
        RunState::Completed => "completed",
    }
    .to_string()
}

/// Edge-triggered countdown alarm poll; true at most once per session.
#[uniffi::export]
pub fn tracker_poll_alarm() -> bool {
    with_tracker(|t| t.poll_alarm()).unwrap_or(false)
}

/// Submit a batch of raw fixes from the OS scheduler, as a JSON array.
/// Returns the number of fixes forwarded; malformed payloads are dropped.
#[uniffi::export]
pub fn tracker_submit_locations(batch_json: String) -> u32 {
    let fixes: Vec<RawFix> = match serde_json::from_str(&batch_json) {
        Ok(fixes) => fixes,
        Err(err) => {
            info!("[Tracker] dropping malformed location batch: {err}");
            return 0;
        }
    };
    let count = fixes.len() as u32;
    match with_tracker(|t| t.submit_fixes(&fixes)) {
        Some(()) => count,
        None => 0,
    }
}

/// The renderable route as a JSON document: GeoJSON MultiLineString
/// geometry, start/end markers and a padded bounding box.
#[uniffi::export]
pub fn tracker_route_json() -> String {
    with_tracker(|t| {
        t.route()
            .ok()
            .and_then(|view| serde_json::to_string(&view).ok())
    })
    .flatten()
    .unwrap_or_else(|| "{}".to_string())
}

/// Summary stats over the committed track, as JSON.
#[uniffi::export]
pub fn tracker_stats_json() -> String {
    with_tracker(|t| {
        t.stats()
            .ok()
            .and_then(|stats| serde_json::to_string(&stats).ok())
    })
    .flatten()
    .unwrap_or_else(|| "{}".to_string())
}

/// The current draft, as JSON.
#[uniffi::export]
pub fn tracker_draft_json() -> String {
    with_tracker(|t| {
        t.current_draft()
            .ok()
            .and_then(|draft| serde_json::to_string(&draft).ok())
    })
    .flatten()
    .unwrap_or_else(|| "{}".to_string())
}

/// Merge a partial draft update, as JSON. Missing fields are untouched.
#[uniffi::export]
pub fn tracker_update_draft(patch_json: String) -> bool {
    let patch: DraftPatch = match serde_json::from_str(&patch_json) {
        Ok(patch) => patch,
        Err(err) => {
            info!("[Tracker] dropping malformed draft patch: {err}");
            return false;
        }
    };
    with_tracker(|t| t.update_draft(&patch).is_ok()).unwrap_or(false)
}
