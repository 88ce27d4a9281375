//! Debounced, idempotent writer from the normalized-point stream into the
//! durable store.
//!
//! An explicit state machine, `{buffer, flushed_offset, last_flush_at,
//! in_flight}` with named transitions, so the write cadence is testable
//! without any host runtime. `in_flight` is the only mutual-exclusion
//! primitive: a flush request while one is in progress is dropped, and the
//! next add-point trigger catches the unflushed tail.

use crate::error::Result;
use crate::store::TrackerStore;
use crate::types::TrackPoint;

/// Flush cadence configuration.
#[derive(Debug, Clone)]
pub struct FlushConfig {
    /// Flush when this much time has passed since the last flush.
    /// Default: 2000 ms.
    pub flush_interval_ms: i64,

    /// Flush when this many unflushed points have accumulated.
    /// Default: 5.
    pub flush_batch_size: usize,

    /// Cap on the in-memory buffer; once exceeded, the already-durable
    /// prefix is compacted away. Bounds memory on unusually long sessions.
    /// Default: 10_000.
    pub max_buffer_points: usize,
}

impl Default for FlushConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: 2_000,
            flush_batch_size: 5,
            max_buffer_points: 10_000,
        }
    }
}

/// Debounced point writer with idempotent at-least-once flushes.
#[derive(Debug)]
pub struct PersistenceBatcher {
    buffer: Vec<TrackPoint>,
    /// Buffer index up to which points are known durable.
    flushed_offset: usize,
    /// Epoch ms of the last successful flush.
    last_flush_at: i64,
    /// Guard: at most one flush in flight at a time.
    in_flight: bool,
    /// Timestamp of the most recently buffered point. Survives compaction,
    /// so the dedup guard keeps working after the buffer is trimmed.
    last_timestamp: Option<i64>,
    /// Monotone count of points made durable this session.
    total_flushed: u64,
    config: FlushConfig,
}

impl PersistenceBatcher {
    pub fn new(config: FlushConfig, now: i64) -> Self {
        Self {
            buffer: Vec::new(),
            flushed_offset: 0,
            last_flush_at: now,
            in_flight: false,
            last_timestamp: None,
            total_flushed: 0,
            config,
        }
    }

    /// Append a point and flush if the cadence predicate says so.
    ///
    /// A point whose timestamp equals the last buffered point's is
    /// discarded, not re-appended. Flush failures are reported through the
    /// log facade and the unflushed suffix stays buffered for the next
    /// trigger; the ingestion path never sees the error.
    pub fn add_point(&mut self, point: TrackPoint, now: i64, store: &mut TrackerStore) {
        if self.last_timestamp == Some(point.timestamp) {
            log::debug!("discarding duplicate-timestamp point {}", point.timestamp);
            return;
        }

        self.last_timestamp = Some(point.timestamp);
        self.buffer.push(point);

        if self.should_flush(now) {
            self.flush(now, store).ok();
        }
    }

    /// Whether the cadence predicate is currently met.
    pub fn should_flush(&self, now: i64) -> bool {
        now - self.last_flush_at >= self.config.flush_interval_ms
            || self.pending() >= self.config.flush_batch_size
    }

    /// Write the unflushed suffix to the store.
    ///
    /// Idempotent at-least-once: the store ignores rows whose timestamp
    /// already exists, so re-flushing an overlapping range is harmless.
    /// Returns the number of rows newly written. A request while a flush
    /// is already in flight is dropped.
    pub fn flush(&mut self, now: i64, store: &mut TrackerStore) -> Result<usize> {
        if self.in_flight {
            log::debug!("flush request dropped: one already in flight");
            return Ok(0);
        }
        if self.pending() == 0 {
            return Ok(0);
        }

        self.in_flight = true;
        let result = store.insert_points(&self.buffer[self.flushed_offset..]);
        self.in_flight = false;

        match result {
            Ok(inserted) => {
                self.total_flushed += (self.buffer.len() - self.flushed_offset) as u64;
                self.flushed_offset = self.buffer.len();
                self.last_flush_at = now;
                self.compact();
                Ok(inserted)
            }
            Err(err) => {
                log::warn!(
                    "flush failed, keeping {} points for retry: {err}",
                    self.pending()
                );
                Err(err)
            }
        }
    }

    /// Seed the batcher from points recovered after an app relaunch.
    ///
    /// Recovered points came out of the store, so all of them are treated
    /// as already durable.
    pub fn replace_from_hydration(&mut self, points: Vec<TrackPoint>, now: i64) {
        self.last_timestamp = points.last().map(|p| p.timestamp);
        self.total_flushed = points.len() as u64;
        self.flushed_offset = points.len();
        self.buffer = points;
        self.last_flush_at = now;
        self.compact();
    }

    /// Trim the durable prefix once the buffer exceeds its cap.
    fn compact(&mut self) {
        if self.buffer.len() > self.config.max_buffer_points && self.flushed_offset > 0 {
            self.buffer.drain(..self.flushed_offset);
            self.flushed_offset = 0;
        }
    }

    /// Number of buffered points not yet known durable.
    pub fn pending(&self) -> usize {
        self.buffer.len() - self.flushed_offset
    }

    /// Points made durable this session, including compacted ones.
    pub fn total_flushed(&self) -> u64 {
        self.total_flushed
    }

    /// Current in-memory buffer length.
    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    #[cfg(test)]
    fn set_in_flight(&mut self, in_flight: bool) {
        self.in_flight = in_flight;
    }
}
