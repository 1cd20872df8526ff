//! Circular-arc waypoint planning.
//!
//! Pure geometry: given the current position, an endpoint, a radius and a
//! rotation sense, produce the ordered waypoint list a backend drives
//! through as straight-line segments. No motion happens here, which is what
//! lets an impossible arc be rejected before anything moves.

use thiserror::Error;

/// Waypoint density along the arc, points per millimeter of chord.
const WAYPOINTS_PER_MM: f64 = 1.0;

/// Lower bound on waypoint count so short arcs still curve.
const MIN_WAYPOINTS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum ArcError {
    /// The straight-line distance between the endpoints is longer than the
    /// arc's diameter; no circle of the requested radius passes through
    /// both points.
    #[error("chord {chord:.3} mm exceeds diameter {diameter:.3} mm")]
    ChordExceedsDiameter { chord: f64, diameter: f64 },
}

/// One straight-line segment of a discretized arc.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Waypoint {
    pub x: f64,
    pub y: f64,
    /// This segment's share of the total chord length, in (0, 1]. The
    /// executing backend scales the commanded feed rate by it.
    pub feed_share: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArcPlan {
    pub center: (f64, f64),
    pub waypoints: Vec<Waypoint>,
}

/// Plan an arc from `start` to `end` with the given radius and rotation
/// sense. Waypoints are snapped to the step grid when `quantum > 0`.
pub fn plan(
    start: (f64, f64),
    end: (f64, f64),
    radius: f64,
    clockwise: bool,
    quantum: f64,
) -> Result<ArcPlan, ArcError> {
    let dx = end.0 - start.0;
    let dy = end.1 - start.1;
    let chord = (dx * dx + dy * dy).sqrt();

    if chord <= f64::EPSILON {
        // Coincident endpoints: nothing to drive.
        return Ok(ArcPlan {
            center: start,
            waypoints: Vec::new(),
        });
    }
    if chord > 2.0 * radius {
        return Err(ArcError::ChordExceedsDiameter {
            chord,
            diameter: 2.0 * radius,
        });
    }

    // Center: offset the chord midpoint along the unit perpendicular, the
    // rotation sense picking which of the two candidate centers.
    let mid = ((start.0 + end.0) / 2.0, (start.1 + end.1) / 2.0);
    let half_chord = chord / 2.0;
    let apothem = (radius * radius - half_chord * half_chord).sqrt();
    let perp = (-dy / chord, dx / chord);
    let center = if clockwise {
        (mid.0 - apothem * perp.0, mid.1 - apothem * perp.1)
    } else {
        (mid.0 + apothem * perp.0, mid.1 + apothem * perp.1)
    };

    // Sweep angles, made monotonic in the direction of travel.
    let start_angle = (start.1 - center.1).atan2(start.0 - center.0);
    let mut end_angle = (end.1 - center.1).atan2(end.0 - center.0);
    if clockwise {
        if end_angle < start_angle {
            end_angle += std::f64::consts::TAU;
        }
    } else if end_angle > start_angle {
        end_angle -= std::f64::consts::TAU;
    }
    let sweep = end_angle - start_angle;

    let count = ((chord * WAYPOINTS_PER_MM).ceil() as usize).max(MIN_WAYPOINTS);
    let mut points = Vec::with_capacity(count);
    for i in 1..=count {
        let angle = start_angle + sweep * (i as f64 / count as f64);
        let point = (
            center.0 + radius * angle.cos(),
            center.1 + radius * angle.sin(),
        );
        points.push(snap(point, quantum));
    }

    // Feed shares: each segment's fraction of the summed segment lengths.
    let mut lengths = Vec::with_capacity(count);
    let mut total = 0.0;
    let mut prev = start;
    for point in &points {
        let len = ((point.0 - prev.0).powi(2) + (point.1 - prev.1).powi(2)).sqrt();
        lengths.push(len);
        total += len;
        prev = *point;
    }

    let waypoints = points
        .into_iter()
        .zip(lengths)
        .map(|((x, y), len)| Waypoint {
            x,
            y,
            feed_share: if total > 0.0 { len / total } else { 0.0 },
        })
        .collect();

    Ok(ArcPlan { center, waypoints })
}

fn snap(point: (f64, f64), quantum: f64) -> (f64, f64) {
    if quantum > 0.0 {
        (
            (point.0 / quantum).round() * quantum,
            (point.1 / quantum).round() * quantum,
        )
    } else {
        point
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dist(a: (f64, f64), b: (f64, f64)) -> f64 {
        ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
    }

    #[test]
    fn impossible_arc_is_rejected() {
        let err = plan((0.0, 0.0), (10.0, 0.0), 4.0, true, 0.0).unwrap_err();
        assert!(matches!(err, ArcError::ChordExceedsDiameter { .. }));
    }

    #[test]
    fn semicircle_waypoints_lie_on_the_circle() {
        let plan = plan((0.0, 0.0), (10.0, 0.0), 5.0, true, 0.0).unwrap();
        assert!(dist(plan.center, (5.0, 0.0)) < 1e-9);
        for wp in &plan.waypoints {
            assert!((dist((wp.x, wp.y), plan.center) - 5.0).abs() < 1e-9);
        }
    }

    #[test]
    fn quantized_waypoints_stay_within_one_quantum_of_the_radius() {
        let quantum = 1.0 / 80.0;
        let plan = plan((0.0, 0.0), (20.0, 5.0), 12.0, false, quantum).unwrap();
        for wp in &plan.waypoints {
            let err = (dist((wp.x, wp.y), plan.center) - 12.0).abs();
            assert!(err <= quantum, "waypoint off circle by {err}");
        }
    }

    #[test]
    fn last_waypoint_reaches_the_endpoint() {
        let end = (7.0, 3.0);
        let quantum = 0.0125;
        let plan = plan((0.0, 0.0), end, 6.0, true, quantum).unwrap();
        let last = plan.waypoints.last().unwrap();
        assert!(dist((last.x, last.y), end) <= quantum);
    }

    #[test]
    fn rotation_sense_flips_the_center() {
        let cw = plan((0.0, 0.0), (8.0, 0.0), 5.0, true, 0.0).unwrap();
        let ccw = plan((0.0, 0.0), (8.0, 0.0), 5.0, false, 0.0).unwrap();
        assert!((cw.center.1 + ccw.center.1).abs() < 1e-9);
        assert!(cw.center.1 != ccw.center.1);
    }

    #[test]
    fn feed_shares_sum_to_one() {
        let plan = plan((0.0, 0.0), (12.0, 4.0), 9.0, false, 0.0).unwrap();
        let total: f64 = plan.waypoints.iter().map(|w| w.feed_share).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn waypoint_count_scales_with_chord_length() {
        let short = plan((0.0, 0.0), (2.0, 0.0), 5.0, true, 0.0).unwrap();
        let long = plan((0.0, 0.0), (40.0, 0.0), 25.0, true, 0.0).unwrap();
        assert_eq!(short.waypoints.len(), MIN_WAYPOINTS);
        assert!(long.waypoints.len() > short.waypoints.len());
    }

    #[test]
    fn coincident_endpoints_yield_no_waypoints() {
        let plan = plan((3.0, 3.0), (3.0, 3.0), 5.0, true, 0.0).unwrap();
        assert!(plan.waypoints.is_empty());
    }
}
