//! Route reconstruction: raw fixes in, renderable polylines out.
//!
//! Pure, total, deterministic. The pipeline is gap segmentation (a jump
//! larger than the gap threshold is a lost-signal gap, not motion, and must
//! not be rendered as a straight line), stride downsampling to bound
//! rendering cost, then Chaikin corner-cutting for smoothing. Safe to run
//! on any thread and to memoize by input identity.

use serde::Serialize;

use crate::geo_utils::haversine_distance;
use crate::types::{Bounds, GpsPoint, RouteSegment, TrackPoint};

/// Route reconstruction configuration.
#[derive(Debug, Clone)]
pub struct RouteConfig {
    /// Distance between consecutive points above which a new segment
    /// starts. Default: 500.0 meters.
    pub gap_threshold_meters: f64,

    /// Per-segment point budget before smoothing; longer segments are
    /// uniformly stride-sampled down to it. Default: 500.
    pub max_points_per_segment: usize,

    /// Chaikin corner-cutting passes. Default: 2.
    pub smooth_iterations: u32,

    /// Camera padding applied to the route bounding box, as a fraction of
    /// the box span per side. Default: 0.1.
    pub camera_padding: f64,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            gap_threshold_meters: 500.0,
            max_points_per_segment: 500,
            smooth_iterations: 2,
            camera_padding: 0.1,
        }
    }
}

/// Render-ready route output for the map collaborator.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteView {
    /// GeoJSON MultiLineString, one line string per segment, coordinates
    /// ordered (lon, lat).
    pub geometry: geojson::Geometry,
    /// First recorded point, for the start marker.
    pub start: Option<GpsPoint>,
    /// Last recorded point, for the end marker.
    pub end: Option<GpsPoint>,
    /// Padded bounding box of the raw track, for the camera.
    pub bounds: Option<Bounds>,
}

/// Reconstruct smoothed, renderable segments from the full raw point list.
///
/// Degenerate inputs degrade instead of failing: an empty list yields no
/// segments, a single point yields a single one-point segment.
pub fn reconstruct(points: &[TrackPoint], config: &RouteConfig) -> Vec<RouteSegment> {
    split_on_gaps(points, config.gap_threshold_meters)
        .into_iter()
        .map(|segment| {
            let mut segment = downsample(segment, config.max_points_per_segment);
            for _ in 0..config.smooth_iterations {
                // Smoothing is undefined below 3 points.
                if segment.len() < 3 {
                    break;
                }
                segment = chaikin_pass(&segment);
            }
            RouteSegment::new(segment)
        })
        .collect()
}

/// Reconstruct and package the route for the rendering collaborator.
///
/// Markers and bounds come from the raw track, so they stay truthful to
/// what was recorded even though the polylines are smoothed.
pub fn render(points: &[TrackPoint], config: &RouteConfig) -> RouteView {
    let segments = reconstruct(points, config);

    let coordinates: Vec<Vec<Vec<f64>>> = segments
        .iter()
        .map(|s| {
            s.points
                .iter()
                .map(|p| vec![p.longitude, p.latitude])
                .collect()
        })
        .collect();

    let raw: Vec<GpsPoint> = points.iter().map(TrackPoint::position).collect();

    RouteView {
        geometry: geojson::Geometry::new(geojson::Value::MultiLineString(coordinates)),
        start: raw.first().copied(),
        end: raw.last().copied(),
        bounds: Bounds::from_points(&raw).map(|b| b.padded(config.camera_padding)),
    }
}

/// Walk the track pairwise and cut it wherever consecutive points are
/// farther apart than the gap threshold.
fn split_on_gaps(points: &[TrackPoint], gap_threshold_meters: f64) -> Vec<Vec<GpsPoint>> {
    let mut segments = Vec::new();
    let mut current: Vec<GpsPoint> = Vec::new();

    for point in points {
        let position = point.position();
        if let Some(last) = current.last() {
            if haversine_distance(last, &position) > gap_threshold_meters {
                segments.push(std::mem::take(&mut current));
            }
        }
        current.push(position);
    }

    if !current.is_empty() {
        segments.push(current);
    }

    segments
}

/// Uniformly stride-sample a segment down to `max_points`, always keeping
/// the first and last point.
fn downsample(points: Vec<GpsPoint>, max_points: usize) -> Vec<GpsPoint> {
    if points.len() <= max_points || max_points < 2 {
        return points;
    }

    let stride = (points.len() - 1) as f64 / (max_points - 1) as f64;
    (0..max_points)
        .map(|i| points[(i as f64 * stride).round() as usize])
        .collect()
}

/// One Chaikin corner-cutting pass.
///
/// Every consecutive pair (P0, P1) is replaced with the two interpolated
/// points 0.75*P0 + 0.25*P1 and 0.25*P0 + 0.75*P1.
fn chaikin_pass(points: &[GpsPoint]) -> Vec<GpsPoint> {
    let mut smoothed = Vec::with_capacity(2 * points.len().saturating_sub(1));
    for pair in points.windows(2) {
        let (p0, p1) = (pair[0], pair[1]);
        smoothed.push(GpsPoint::new(
            0.75 * p0.latitude + 0.25 * p1.latitude,
            0.75 * p0.longitude + 0.25 * p1.longitude,
        ));
        smoothed.push(GpsPoint::new(
            0.25 * p0.latitude + 0.75 * p1.latitude,
            0.25 * p0.longitude + 0.75 * p1.longitude,
        ));
    }
    smoothed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RawFix;

    fn tp(timestamp: i64, latitude: f64, longitude: f64) -> TrackPoint {
        TrackPoint::from_fix(&RawFix {
            latitude,
            longitude,
            altitude: None,
            accuracy: Some(5.0),
            speed: None,
            heading: None,
            timestamp,
        })
    }

    fn no_smoothing() -> RouteConfig {
        RouteConfig {
            smooth_iterations: 0,
            ..RouteConfig::default()
        }
    }

    #[test]
    fn test_empty_input_yields_no_segments() {
        let segments = reconstruct(&[], &RouteConfig::default());
        assert!(segments.is_empty());
    }

    #[test]
    fn test_single_point_yields_single_point_segment() {
        let segments = reconstruct(&[tp(0, 60.1, 24.9)], &RouteConfig::default());
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].len(), 1);
    }

    #[test]
    fn test_gap_splits_segments() {
        // Two close points, then a ~100 km jump: the signal-loss gap must
        // split the route before the third point.
        let points = vec![
            tp(0, 60.1000, 24.9000),
            tp(1_000, 60.1001, 24.9001),
            tp(600_000, 61.0000, 25.5000),
        ];
        let segments = reconstruct(&points, &no_smoothing());
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].len(), 2);
        assert_eq!(segments[1].len(), 1);
    }

    #[test]
    fn test_points_within_threshold_stay_in_one_segment() {
        // ~111 m hops, well under the 500 m default threshold.
        let points: Vec<TrackPoint> = (0..10)
            .map(|i| tp(i * 1_000, 60.1 + i as f64 * 0.001, 24.9))
            .collect();
        let segments = reconstruct(&points, &no_smoothing());
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].len(), 10);
    }

    #[test]
    fn test_downsample_respects_budget_and_endpoints() {
        let points: Vec<GpsPoint> = (0..2_000)
            .map(|i| GpsPoint::new(60.0 + i as f64 * 1e-5, 24.9))
            .collect();
        let sampled = downsample(points.clone(), 500);
        assert_eq!(sampled.len(), 500);
        assert_eq!(sampled[0], points[0]);
        assert_eq!(*sampled.last().unwrap(), *points.last().unwrap());

        // Short segments pass through untouched.
        let short = downsample(points[..10].to_vec(), 500);
        assert_eq!(short.len(), 10);
    }

    #[test]
    fn test_chaikin_pass_interpolation() {
        let corner = vec![
            GpsPoint::new(0.0, 0.0),
            GpsPoint::new(0.0, 1.0),
            GpsPoint::new(1.0, 1.0),
        ];
        let smoothed = chaikin_pass(&corner);
        assert_eq!(smoothed.len(), 4);
        assert_eq!(smoothed[0], GpsPoint::new(0.0, 0.25));
        assert_eq!(smoothed[1], GpsPoint::new(0.0, 0.75));
        assert_eq!(smoothed[2], GpsPoint::new(0.25, 1.0));
        assert_eq!(smoothed[3], GpsPoint::new(0.75, 1.0));
    }

    #[test]
    fn test_more_smoothing_never_shrinks_a_segment() {
        let points: Vec<TrackPoint> = (0..8)
            .map(|i| tp(i * 1_000, 60.1 + (i as f64 * 0.3).sin() * 0.001, 24.9 + i as f64 * 0.001))
            .collect();

        let mut previous = 0;
        for iterations in 0..5 {
            let config = RouteConfig {
                smooth_iterations: iterations,
                ..RouteConfig::default()
            };
            let segments = reconstruct(&points, &config);
            assert_eq!(segments.len(), 1);
            assert!(segments[0].len() >= previous);
            previous = segments[0].len();
        }
    }

    #[test]
    fn test_two_point_segment_passes_through_smoothing() {
        let points = vec![tp(0, 60.1, 24.9), tp(1_000, 60.1001, 24.9001)];
        let segments = reconstruct(&points, &RouteConfig::default());
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].len(), 2);
    }

    #[test]
    fn test_render_markers_bounds_and_coordinate_order() {
        let points = vec![
            tp(0, 60.1000, 24.9000),
            tp(1_000, 60.1001, 24.9001),
            tp(600_000, 61.0000, 25.5000),
        ];
        let view = render(&points, &no_smoothing());

        assert_eq!(view.start.unwrap(), GpsPoint::new(60.1000, 24.9000));
        assert_eq!(view.end.unwrap(), GpsPoint::new(61.0000, 25.5000));

        let bounds = view.bounds.unwrap();
        assert!(bounds.min_lat < 60.1 && bounds.max_lat > 61.0);

        match &view.geometry.value {
            geojson::Value::MultiLineString(lines) => {
                assert_eq!(lines.len(), 2);
                // (lon, lat) ordering.
                assert_eq!(lines[0][0], vec![24.9000, 60.1000]);
            }
            other => panic!("expected MultiLineString, got {other:?}"),
        }
    }

    #[test]
    fn test_render_empty_is_total() {
        let view = render(&[], &RouteConfig::default());
        assert!(view.start.is_none());
        assert!(view.end.is_none());
        assert!(view.bounds.is_none());
        match &view.geometry.value {
            geojson::Value::MultiLineString(lines) => assert!(lines.is_empty()),
            other => panic!("expected MultiLineString, got {other:?}"),
        }
    }
}
