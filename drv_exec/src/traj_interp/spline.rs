//! # Joint splines
//!
//! A [`JointSpline`] is a piecewise polynomial through a list of waypoints for a single joint.
//! Each segment is picked from the data available at both of its ends:
//!
//! - positions only: linear
//! - positions and velocities: cubic Hermite
//! - positions, velocities and accelerations: quintic
//!
//! Before the first waypoint the spline holds the first position, after the last one it holds the
//! last position.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A single waypoint of a joint trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    /// Units: seconds
    pub t: f64,
    pub position: f64,
    pub velocity: Option<f64>,
    pub acceleration: Option<f64>,
}

/// The value of a spline at a given time.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SplineSample {
    pub position: f64,
    pub velocity: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JointSpline {
    waypoints: Vec<Waypoint>,
    segments: Vec<Segment>,
}

/// One polynomial piece, `p(tau) = sum(coeffs[i] * tau^i)` with `tau = t - t_start`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Segment {
    t_start: f64,
    t_end: f64,
    kind: SegmentKind,
    coeffs: [f64; 6],
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Linear,
    Cubic,
    Quintic,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SplineError {
    #[error("A spline needs at least one waypoint")]
    NoWaypoints,

    #[error("Waypoint {0} is not later than the waypoint before it")]
    NonIncreasingTime(usize),

    #[error("Waypoint {0} contains a non-finite value")]
    NonFinite(usize),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Waypoint {
    pub fn new(t: f64, position: f64) -> Self {
        Self {
            t,
            position,
            velocity: None,
            acceleration: None,
        }
    }

    fn is_finite(&self) -> bool {
        self.t.is_finite()
            && self.position.is_finite()
            && self.velocity.map(f64::is_finite).unwrap_or(true)
            && self.acceleration.map(f64::is_finite).unwrap_or(true)
    }
}

impl JointSpline {
    /// Build a spline through the given waypoints.
    ///
    /// Waypoint times must be strictly increasing.
    pub fn new(waypoints: Vec<Waypoint>) -> Result<Self, SplineError> {
        if waypoints.is_empty() {
            return Err(SplineError::NoWaypoints);
        }

        for (i, w) in waypoints.iter().enumerate() {
            if !w.is_finite() {
                return Err(SplineError::NonFinite(i));
            }
            if i > 0 && w.t <= waypoints[i - 1].t {
                return Err(SplineError::NonIncreasingTime(i));
            }
        }

        let segments = waypoints
            .windows(2)
            .map(|w| Segment::between(&w[0], &w[1]))
            .collect();

        Ok(Self {
            waypoints,
            segments,
        })
    }

    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }

    /// Kind of each segment, in order.
    pub fn segment_kinds(&self) -> Vec<SegmentKind> {
        self.segments.iter().map(|s| s.kind).collect()
    }

    /// Time of the first waypoint.
    ///
    /// Units: seconds
    pub fn start_time_s(&self) -> f64 {
        self.waypoints[0].t
    }

    /// Time of the last waypoint.
    ///
    /// Units: seconds
    pub fn end_time_s(&self) -> f64 {
        self.waypoints[self.waypoints.len() - 1].t
    }

    /// Evaluate the spline at time `t`.
    pub fn sample(&self, t: f64) -> SplineSample {
        let first = &self.waypoints[0];
        let last = &self.waypoints[self.waypoints.len() - 1];

        // Outside the waypoints the end point is held at its demanded velocity
        if t <= first.t || self.segments.is_empty() {
            return SplineSample {
                position: first.position,
                velocity: first.velocity.unwrap_or(0.0),
            };
        }
        if t >= last.t {
            return SplineSample {
                position: last.position,
                velocity: last.velocity.unwrap_or(0.0),
            };
        }

        // Segments are sorted by time, so the first one ending after t contains it
        let idx = self.segments.partition_point(|s| s.t_end < t);
        let seg = &self.segments[idx.min(self.segments.len() - 1)];

        seg.eval(t - seg.t_start)
    }
}

impl Segment {
    fn between(a: &Waypoint, b: &Waypoint) -> Self {
        let dt = b.t - a.t;
        let dx = b.position - a.position;

        let (kind, coeffs) = match (a.velocity, b.velocity, a.acceleration, b.acceleration) {
            (Some(v0), Some(v1), Some(a0), Some(a1)) => (
                SegmentKind::Quintic,
                [
                    a.position,
                    v0,
                    a0 / 2.0,
                    (20.0 * dx - (8.0 * v1 + 12.0 * v0) * dt - (3.0 * a0 - a1) * dt.powi(2))
                        / (2.0 * dt.powi(3)),
                    (-30.0 * dx + (14.0 * v1 + 16.0 * v0) * dt + (3.0 * a0 - 2.0 * a1) * dt.powi(2))
                        / (2.0 * dt.powi(4)),
                    (12.0 * dx - 6.0 * (v1 + v0) * dt - (a0 - a1) * dt.powi(2))
                        / (2.0 * dt.powi(5)),
                ],
            ),
            (Some(v0), Some(v1), _, _) => (
                SegmentKind::Cubic,
                [
                    a.position,
                    v0,
                    (3.0 * dx / dt - 2.0 * v0 - v1) / dt,
                    (-2.0 * dx / dt + v0 + v1) / dt.powi(2),
                    0.0,
                    0.0,
                ],
            ),
            _ => (
                SegmentKind::Linear,
                [a.position, dx / dt, 0.0, 0.0, 0.0, 0.0],
            ),
        };

        Self {
            t_start: a.t,
            t_end: b.t,
            kind,
            coeffs,
        }
    }

    fn eval(&self, tau: f64) -> SplineSample {
        let c = &self.coeffs;

        // Horner's scheme
        let position =
            c[0] + tau * (c[1] + tau * (c[2] + tau * (c[3] + tau * (c[4] + tau * c[5]))));
        let velocity = c[1]
            + tau * (2.0 * c[2] + tau * (3.0 * c[3] + tau * (4.0 * c[4] + tau * 5.0 * c[5])));

        SplineSample { position, velocity }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const EPS: f64 = 1e-9;

    fn waypoint(t: f64, x: f64, v: Option<f64>, a: Option<f64>) -> Waypoint {
        Waypoint {
            t,
            position: x,
            velocity: v,
            acceleration: a,
        }
    }

    #[test]
    fn test_passes_through_waypoints() {
        let spline = JointSpline::new(vec![
            waypoint(0.0, 0.1, Some(0.0), Some(0.0)),
            waypoint(1.0, 0.5, Some(0.2), Some(0.0)),
            waypoint(2.5, 0.3, Some(0.0), None),
            waypoint(3.0, 0.4, None, None),
        ])
        .unwrap();

        assert_eq!(
            spline.segment_kinds(),
            vec![SegmentKind::Quintic, SegmentKind::Cubic, SegmentKind::Linear]
        );

        for w in spline.waypoints().iter() {
            assert!((spline.sample(w.t).position - w.position).abs() < EPS);
        }

        // Velocities are honoured at both ends of the quintic and cubic segments
        assert!((spline.sample(1.0 - 1e-9).velocity - 0.2).abs() < 1e-6);
        assert!((spline.sample(1.0 + 1e-9).velocity - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_linear_midpoint_and_holds() {
        let spline =
            JointSpline::new(vec![waypoint(1.0, 0.0, None, None), waypoint(3.0, 1.0, None, None)])
                .unwrap();

        assert!((spline.sample(2.0).position - 0.5).abs() < EPS);
        assert!((spline.sample(2.0).velocity - 0.5).abs() < EPS);
        assert_eq!(spline.sample(0.0).position, 0.0);
        assert_eq!(spline.sample(10.0).position, 1.0);
        assert_eq!(spline.end_time_s(), 3.0);
    }

    #[test]
    fn test_end_point_velocities() {
        let spline = JointSpline::new(vec![
            waypoint(1.0, 0.0, Some(0.1), None),
            waypoint(2.0, 0.2, Some(0.3), None),
        ])
        .unwrap();

        assert!((spline.sample(0.5).velocity - 0.1).abs() < EPS);
        assert!((spline.sample(1.0).velocity - 0.1).abs() < EPS);
        assert!((spline.sample(2.0).velocity - 0.3).abs() < EPS);
        assert!((spline.sample(5.0).velocity - 0.3).abs() < EPS);
        assert_eq!(spline.sample(5.0).position, 0.2);

        // No demand at the ends means the joint is held still
        let spline =
            JointSpline::new(vec![waypoint(0.0, 0.0, None, None), waypoint(1.0, 1.0, None, None)])
                .unwrap();
        assert_eq!(spline.sample(-1.0).velocity, 0.0);
        assert_eq!(spline.sample(2.0).velocity, 0.0);
    }

    #[test]
    fn test_invalid_waypoints() {
        assert_eq!(JointSpline::new(vec![]), Err(SplineError::NoWaypoints));
        assert_eq!(
            JointSpline::new(vec![
                waypoint(0.0, 0.0, None, None),
                waypoint(1.0, 0.0, None, None),
                waypoint(1.0, 0.2, None, None),
            ]),
            Err(SplineError::NonIncreasingTime(2))
        );
        assert_eq!(
            JointSpline::new(vec![waypoint(0.0, std::f64::NAN, None, None)]),
            Err(SplineError::NonFinite(0))
        );
    }
}
