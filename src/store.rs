//! Local durable store: the track-point table and the draft key-value table.
//!
//! Points are keyed by their unique timestamp and written with
//! INSERT OR IGNORE, so re-writing an overlapping range is a no-op for rows
//! already present. That conflict handling is what gives the batcher its
//! idempotent at-least-once flush semantics.

use std::time::Duration;

use rusqlite::{params, Connection};
use rusqlite_migration::{Migrations, M};

use crate::error::Result;
use crate::types::TrackPoint;

const SCHEMA: &str = r#"
CREATE TABLE track_points (
    timestamp     INTEGER PRIMARY KEY,
    latitude      REAL NOT NULL,
    longitude     REAL NOT NULL,
    altitude      REAL,
    accuracy      REAL,
    is_stationary INTEGER NOT NULL DEFAULT 0,
    confidence    INTEGER NOT NULL DEFAULT 0,
    bad_signal    INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE draft (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

fn migrations() -> Migrations<'static> {
    Migrations::new(vec![M::up(SCHEMA)])
}

/// Handle on the local SQLite store.
///
/// Connections are cheap; the ingestion worker opens its own on the same
/// path rather than sharing one across threads.
pub struct TrackerStore {
    conn: Connection,
}

impl TrackerStore {
    /// Open (and migrate) the store at the given path.
    pub fn open(path: &str) -> Result<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Open an in-memory store (for testing).
    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(mut conn: Connection) -> Result<Self> {
        conn.busy_timeout(Duration::from_secs(5))?;
        migrations().to_latest(&mut conn)?;
        Ok(Self { conn })
    }

    // ========================================================================
    // Track points
    // ========================================================================

    /// Write a batch of points with insert-or-ignore-on-conflict semantics.
    ///
    /// Returns the number of rows actually inserted; rows whose timestamp
    /// already exists are skipped.
    pub fn insert_points(&mut self, points: &[TrackPoint]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR IGNORE INTO track_points
                 (timestamp, latitude, longitude, altitude, accuracy,
                  is_stationary, confidence, bad_signal)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for p in points {
                inserted += stmt.execute(params![
                    p.timestamp,
                    p.latitude,
                    p.longitude,
                    p.altitude,
                    p.accuracy,
                    p.is_stationary,
                    p.confidence,
                    p.bad_signal,
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Load the committed point list in timestamp order.
    ///
    /// Speed and heading are not persisted, so loaded points carry None
    /// for both.
    pub fn load_points(&self) -> Result<Vec<TrackPoint>> {
        let mut stmt = self.conn.prepare(
            "SELECT timestamp, latitude, longitude, altitude, accuracy,
                    is_stationary, confidence, bad_signal
             FROM track_points ORDER BY timestamp ASC",
        )?;

        let points = stmt
            .query_map([], |row| {
                Ok(TrackPoint {
                    timestamp: row.get(0)?,
                    latitude: row.get(1)?,
                    longitude: row.get(2)?,
                    altitude: row.get(3)?,
                    accuracy: row.get(4)?,
                    speed: None,
                    heading: None,
                    is_stationary: row.get(5)?,
                    confidence: row.get(6)?,
                    bad_signal: row.get(7)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(points)
    }

    /// Number of committed points.
    pub fn count_points(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM track_points", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Drop every committed point. Used when a new session starts so the
    /// old session's points cannot leak into it.
    pub fn delete_all_points(&mut self) -> Result<()> {
        self.conn.execute("DELETE FROM track_points", [])?;
        Ok(())
    }

    // ========================================================================
    // Draft key-value table
    // ========================================================================

    /// Read one draft value.
    pub fn draft_get(&self, key: &str) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT value FROM draft WHERE key = ?1")?;
        let mut rows = stmt.query(params![key])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    /// Write one draft value, replacing any previous value for the key.
    pub fn draft_set(&mut self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO draft (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    /// Wipe every draft key.
    pub fn draft_delete_all(&mut self) -> Result<()> {
        self.conn.execute("DELETE FROM draft", [])?;
        Ok(())
    }

    /// Raw SQL escape hatch for tests that need to sabotage the schema.
    #[cfg(test)]
    pub(crate) fn execute_batch(&self, sql: &str) -> Result<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }
}
