//! Core data types for the tracking pipeline.
//!
//! `RawFix` is what the host OS delivers; `TrackPoint` is the normalized
//! form the rest of the pipeline works with. `GpsPoint` and `Bounds` are the
//! rendering-side coordinate types.

use serde::{Deserialize, Serialize};

/// Speed below which a fix is considered stationary, in m/s.
const STATIONARY_SPEED_MPS: f64 = 0.5;

/// Accuracy above which a fix is flagged as bad signal, in meters.
const BAD_SIGNAL_ACCURACY_M: f64 = 50.0;

/// One raw fix as delivered by the host OS location scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFix {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    /// Horizontal accuracy estimate in meters.
    pub accuracy: Option<f64>,
    /// Ground speed in m/s.
    pub speed: Option<f64>,
    /// Heading in degrees from true north.
    pub heading: Option<f64>,
    /// Fix time as Unix epoch milliseconds.
    pub timestamp: i64,
}

impl RawFix {
    /// Check that the fix carries renderable coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// One normalized GPS fix.
///
/// Timestamps are unique within a session; the persistence layer enforces
/// this with a unique key and the batcher discards same-timestamp repeats
/// before they ever reach storage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackPoint {
    /// Unix epoch milliseconds. Unique and monotonic within a session.
    pub timestamp: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    pub accuracy: Option<f64>,
    /// Ground speed in m/s. Not persisted; used only for normalization.
    pub speed: Option<f64>,
    /// Heading in degrees. Not persisted.
    pub heading: Option<f64>,
    /// True when the reported speed is below the stationary threshold.
    pub is_stationary: bool,
    /// Fix quality 0-100, derived from the accuracy estimate.
    pub confidence: u32,
    /// True when the accuracy estimate is missing or poor.
    pub bad_signal: bool,
}

impl TrackPoint {
    /// Normalize a raw OS fix into a track point.
    pub fn from_fix(fix: &RawFix) -> Self {
        Self {
            timestamp: fix.timestamp,
            latitude: fix.latitude,
            longitude: fix.longitude,
            altitude: fix.altitude,
            accuracy: fix.accuracy,
            speed: fix.speed,
            heading: fix.heading,
            is_stationary: fix.speed.map(|s| s < STATIONARY_SPEED_MPS).unwrap_or(false),
            confidence: confidence_from_accuracy(fix.accuracy),
            bad_signal: fix.accuracy.map(|a| a > BAD_SIGNAL_ACCURACY_M).unwrap_or(true),
        }
    }

    /// The rendering-side coordinate of this point.
    pub fn position(&self) -> GpsPoint {
        GpsPoint::new(self.latitude, self.longitude)
    }
}

/// Map an accuracy estimate in meters to a 0-100 confidence score.
///
/// 100 at 5 m or better, 0 at 100 m or worse, linear in between. Unknown
/// accuracy scores 0.
fn confidence_from_accuracy(accuracy: Option<f64>) -> u32 {
    match accuracy {
        Some(a) if a <= 5.0 => 100,
        Some(a) if a >= 100.0 => 0,
        Some(a) => (100.0 * (100.0 - a) / 95.0).round() as u32,
        None => 0,
    }
}

/// A single GPS coordinate for rendering and geometry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// A contiguous run of points with no inter-point gap above the configured
/// threshold. Derived and ephemeral; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSegment {
    pub points: Vec<GpsPoint>,
}

impl RouteSegment {
    pub fn new(points: Vec<GpsPoint>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Geographic bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Compute the bounding box of a point set. None for empty input.
    pub fn from_points(points: &[GpsPoint]) -> Option<Self> {
        let first = points.first()?;
        let mut bounds = Bounds {
            min_lat: first.latitude,
            max_lat: first.latitude,
            min_lng: first.longitude,
            max_lng: first.longitude,
        };
        for p in &points[1..] {
            bounds.min_lat = bounds.min_lat.min(p.latitude);
            bounds.max_lat = bounds.max_lat.max(p.latitude);
            bounds.min_lng = bounds.min_lng.min(p.longitude);
            bounds.max_lng = bounds.max_lng.max(p.longitude);
        }
        Some(bounds)
    }

    /// Expand each side by `padding` times the corresponding span, so the
    /// map camera does not clip the route at the viewport edge.
    ///
    /// Degenerate (zero-span) boxes get a small fixed margin instead, so a
    /// single-point route still produces a usable camera target.
    pub fn padded(&self, padding: f64) -> Self {
        const MIN_SPAN_DEG: f64 = 0.0005;
        let lat_pad = ((self.max_lat - self.min_lat) * padding).max(MIN_SPAN_DEG * padding);
        let lng_pad = ((self.max_lng - self.min_lng) * padding).max(MIN_SPAN_DEG * padding);
        Bounds {
            min_lat: self.min_lat - lat_pad,
            max_lat: self.max_lat + lat_pad,
            min_lng: self.min_lng - lng_pad,
            max_lng: self.max_lng + lng_pad,
        }
    }
}
