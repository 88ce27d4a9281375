//! # Tracklog
//!
//! Activity tracking core for a mobile fitness app: background GPS
//! ingestion, durable point buffering, a pause/resume-correct session
//! clock, and route reconstruction.
//!
//! The pipeline, leaves first:
//! - [`ingest::IngestionTask`] receives fix batches from the host OS
//!   scheduler, normalizes them and forwards over a bounded channel.
//! - [`batcher::PersistenceBatcher`] debounces writes into the local
//!   SQLite store with idempotent at-least-once flushes.
//! - [`draft::DraftStore`] stages in-progress session metadata so a crash
//!   or relaunch recovers cleanly.
//! - [`clock::SessionClock`] keeps elapsed time correct across arbitrary
//!   process suspension.
//! - [`route`] turns the committed raw points into smoothed, renderable
//!   polylines.
//!
//! [`session::SessionTracker`] fronts all of it behind one handle.
//!
//! ## Quick Start
//!
//! ```rust
//! use tracklog::{RawFix, RouteConfig, TrackPoint};
//!
//! let fixes = vec![
//!     RawFix { latitude: 60.1000, longitude: 24.9000, altitude: None,
//!              accuracy: Some(8.0), speed: Some(3.0), heading: None,
//!              timestamp: 0 },
//!     RawFix { latitude: 60.1001, longitude: 24.9001, altitude: None,
//!              accuracy: Some(8.0), speed: Some(3.0), heading: None,
//!              timestamp: 1_000 },
//! ];
//!
//! let points: Vec<TrackPoint> = fixes.iter().map(TrackPoint::from_fix).collect();
//! let segments = tracklog::route::reconstruct(&points, &RouteConfig::default());
//! assert_eq!(segments.len(), 1);
//! ```

// Unified error handling
pub mod error;
pub use error::{Result, TrackerError};

// Core data types
pub mod types;
pub use types::{Bounds, GpsPoint, RawFix, RouteSegment, TrackPoint};

// Geographic utilities (distance, path length)
pub mod geo_utils;

// Pause/resume-correct session clock
pub mod clock;
pub use clock::{ActiveSession, RunState, SessionClock};

// Route reconstruction (gap segmentation, downsampling, smoothing)
pub mod route;
pub use route::{reconstruct, render, RouteConfig, RouteView};

// Local durable store (SQLite)
pub mod store;
pub use store::TrackerStore;

// Debounced point writer
pub mod batcher;
pub use batcher::{FlushConfig, PersistenceBatcher};

// Crash-safe session draft
pub mod draft;
pub use draft::{Draft, DraftPatch, DraftStore};

// Host-OS location ingestion
pub mod ingest;
pub use ingest::{IngestConfig, IngestionTask};

// Session facade (singleton for the host boundary)
pub mod session;
pub use session::{with_tracker, SessionTracker, TrackStats, TrackerConfig, TRACKER};

// FFI bindings for mobile platforms (iOS/Android)
#[cfg(feature = "ffi")]
pub mod ffi;

#[cfg(feature = "ffi")]
uniffi::setup_scaffolding!();

/// Initialize logging for Android (only used in FFI)
#[cfg(all(feature = "ffi", target_os = "android"))]
pub(crate) fn init_logging() {
    use android_logger::Config;
    use log::LevelFilter;

    android_logger::init_once(
        Config::default()
            .with_max_level(LevelFilter::Debug)
            .with_tag("tracklog"),
    );
}

/// Initialize logging for iOS (only used in FFI)
#[cfg(all(feature = "ffi", target_os = "ios"))]
pub(crate) fn init_logging() {
    use log::LevelFilter;

    oslog::OsLogger::new("com.tracklog.core")
        .level_filter(LevelFilter::Debug)
        .init()
        .ok();
}

#[cfg(all(feature = "ffi", not(any(target_os = "android", target_os = "ios"))))]
pub(crate) fn init_logging() {
    // No-op on desktop platforms; tests wire up env_logger themselves.
}
