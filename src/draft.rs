//! Crash-safe staging area for in-progress session state.
//!
//! The draft lives in the store's key-value table, one key per field, so a
//! partial update touches only the keys it carries. Background writes (the
//! flushed-point count from the ingestion worker) and foreground writes
//! (titles, notes) can land in any order without clobbering each other.

use serde::{Deserialize, Serialize};

use crate::clock::ActiveSession;
use crate::error::Result;
use crate::store::TrackerStore;

const KEY_TITLE: &str = "title";
const KEY_NOTES: &str = "notes";
const KEY_ACTIVITY_TYPE: &str = "activity_type";
const KEY_FLUSHED_POINT_COUNT: &str = "flushed_point_count";
const KEY_CLOCK: &str = "clock";

/// Locally staged, not-yet-committed session state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Draft {
    pub title: Option<String>,
    pub notes: Option<String>,
    pub activity_type: Option<String>,
    /// How many of the session's points are known durable.
    pub flushed_point_count: u64,
    /// Persisted clock snapshot, so a relaunch restores elapsed time.
    pub clock: Option<ActiveSession>,
}

/// Partial draft update. `None` fields leave the stored value untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftPatch {
    pub title: Option<String>,
    pub notes: Option<String>,
    pub activity_type: Option<String>,
    pub flushed_point_count: Option<u64>,
    pub clock: Option<ActiveSession>,
}

/// Staging store for the in-progress session.
pub struct DraftStore {
    store: TrackerStore,
}

impl DraftStore {
    pub fn open(path: &str) -> Result<Self> {
        Ok(Self {
            store: TrackerStore::open(path)?,
        })
    }

    /// In-memory variant (for testing).
    pub fn in_memory() -> Result<Self> {
        Ok(Self {
            store: TrackerStore::in_memory()?,
        })
    }

    /// The underlying store handle.
    pub fn store(&self) -> &TrackerStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut TrackerStore {
        &mut self.store
    }

    /// Read the current draft, or an empty one if none exists.
    ///
    /// Recovery is lenient: a corrupt value is logged and treated as
    /// absent rather than failing startup.
    pub fn load_on_startup(&self) -> Result<Draft> {
        let flushed_point_count = self
            .store
            .draft_get(KEY_FLUSHED_POINT_COUNT)?
            .and_then(|v| {
                v.parse().ok().or_else(|| {
                    log::warn!("draft: unreadable flushed point count {v:?}");
                    None
                })
            })
            .unwrap_or(0);

        let clock = self
            .store
            .draft_get(KEY_CLOCK)?
            .and_then(|v| match serde_json::from_str::<ActiveSession>(&v) {
                Ok(session) => Some(session),
                Err(err) => {
                    log::warn!("draft: unreadable clock snapshot: {err}");
                    None
                }
            });

        Ok(Draft {
            title: self.store.draft_get(KEY_TITLE)?,
            notes: self.store.draft_get(KEY_NOTES)?,
            activity_type: self.store.draft_get(KEY_ACTIVITY_TYPE)?,
            flushed_point_count,
            clock,
        })
    }

    /// Merge a partial update into the existing draft. Only keys present in
    /// the patch are written.
    pub fn merge_append(&mut self, patch: &DraftPatch) -> Result<()> {
        if let Some(title) = &patch.title {
            self.store.draft_set(KEY_TITLE, title)?;
        }
        if let Some(notes) = &patch.notes {
            self.store.draft_set(KEY_NOTES, notes)?;
        }
        if let Some(activity_type) = &patch.activity_type {
            self.store.draft_set(KEY_ACTIVITY_TYPE, activity_type)?;
        }
        if let Some(count) = patch.flushed_point_count {
            self.store
                .draft_set(KEY_FLUSHED_POINT_COUNT, &count.to_string())?;
        }
        if let Some(clock) = &patch.clock {
            self.store
                .draft_set(KEY_CLOCK, &serde_json::to_string(clock)?)?;
        }
        Ok(())
    }

    /// Wipe the staged metadata and drop every persisted point of the
    /// prior session. Runs before a new session's ingestion starts, so
    /// old points cannot leak into the new session.
    pub fn clear(&mut self) -> Result<()> {
        self.store.draft_delete_all()?;
        self.store.delete_all_points()?;
        log::info!("draft cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SessionClock;
    use crate::types::{RawFix, TrackPoint};

    fn tp(timestamp: i64) -> TrackPoint {
        TrackPoint::from_fix(&RawFix {
            latitude: 60.1,
            longitude: 24.9,
            altitude: None,
            accuracy: None,
            speed: None,
            heading: None,
            timestamp,
        })
    }

    #[test]
    fn test_empty_draft_on_first_startup() {
        let draft_store = DraftStore::in_memory().unwrap();
        let draft = draft_store.load_on_startup().unwrap();
        assert_eq!(draft, Draft::default());
    }

    #[test]
    fn test_merge_append_touches_only_present_keys() {
        let mut draft_store = DraftStore::in_memory().unwrap();

        draft_store
            .merge_append(&DraftPatch {
                title: Some("Trail loop".into()),
                activity_type: Some("Run".into()),
                ..DraftPatch::default()
            })
            .unwrap();

        // A background count update must not clobber the foreground fields.
        draft_store
            .merge_append(&DraftPatch {
                flushed_point_count: Some(12),
                ..DraftPatch::default()
            })
            .unwrap();

        let draft = draft_store.load_on_startup().unwrap();
        assert_eq!(draft.title.as_deref(), Some("Trail loop"));
        assert_eq!(draft.activity_type.as_deref(), Some("Run"));
        assert_eq!(draft.flushed_point_count, 12);
    }

    #[test]
    fn test_clock_snapshot_roundtrip() {
        let mut draft_store = DraftStore::in_memory().unwrap();

        let mut clock = SessionClock::new();
        clock.start_at("Run".into(), "Hills".into(), true, 0, 0).unwrap();
        clock.pause_at(37_000).unwrap();

        draft_store
            .merge_append(&DraftPatch {
                clock: clock.session().cloned(),
                ..DraftPatch::default()
            })
            .unwrap();

        let draft = draft_store.load_on_startup().unwrap();
        let mut restored = SessionClock::new();
        restored.restore(draft.clock);
        assert_eq!(restored.elapsed_at(999_000), 37_000);
    }

    #[test]
    fn test_clear_drops_metadata_and_points() {
        let mut draft_store = DraftStore::in_memory().unwrap();
        draft_store
            .merge_append(&DraftPatch {
                title: Some("Old session".into()),
                flushed_point_count: Some(3),
                ..DraftPatch::default()
            })
            .unwrap();
        draft_store
            .store_mut()
            .insert_points(&[tp(1_000), tp(2_000), tp(3_000)])
            .unwrap();

        draft_store.clear().unwrap();

        assert_eq!(draft_store.load_on_startup().unwrap(), Draft::default());
        assert_eq!(draft_store.store().count_points().unwrap(), 0);
    }

    #[test]
    fn test_corrupt_clock_snapshot_treated_as_absent() {
        let mut draft_store = DraftStore::in_memory().unwrap();
        draft_store
            .store_mut()
            .draft_set("clock", "not json")
            .unwrap();
        let draft = draft_store.load_on_startup().unwrap();
        assert!(draft.clock.is_none());
    }
}
