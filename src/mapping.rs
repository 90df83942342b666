//! Raw ↔ logical angle mapping for AS5600 joint encoders
//!
//! The encoders report absolute angles in `[0, 360)` and wrap at the
//! boundary, so a joint whose working range crosses 0°/360° (e.g.
//! ref=305°, max=9.2°) produces raw readings that are useless to
//! compare numerically. All conversion goes through an unwrapped delta
//! relative to the calibrated reference pose:
//!
//! ```text
//! delta   = unwrap(raw - ref_raw)          // shortest path, [-180, 180)
//! logical = delta * direction + ref_offset
//! raw     = wrap_360(ref_raw + (logical - ref_offset) / direction)
//! ```
//!
//! The unwrap is unambiguous because no joint on this arm travels more
//! than 180° from its reference pose in either direction.
//!
//! Logical limits are never stored; they are derived from the raw
//! calibration endpoints on every query so that a calibration capture
//! takes effect immediately.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Number of joints on the arm
pub const NUM_JOINTS: usize = 6;

/// Per-joint calibration parameters
///
/// `min_raw`/`max_raw` are the raw encoder values at the logical
/// minimum/maximum poses. `max_raw` may be numerically *smaller* than
/// `min_raw` when the range crosses the 0°/360° boundary.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JointCalibration {
    /// Display label ("Joint 2 shoulder")
    pub label: String,
    /// Whether this joint is driven (JOINT_EN default)
    #[serde(default)]
    pub enabled: bool,
    /// Raw encoder value at the reference/neutral pose
    pub ref_raw: f64,
    /// Logical angle assigned to the reference pose
    pub ref_offset: f64,
    /// +1 or -1, applied after unwrapping (inverted magnet mounting)
    pub direction: i8,
    /// Raw encoder value at the logical minimum pose
    pub min_raw: f64,
    /// Raw encoder value at the logical maximum pose
    pub max_raw: f64,
}

/// Unwrap an angular difference to the shortest path in `[-180, 180)`.
///
/// A raw jump from 305° to 9° is a +64° move, not -296°.
pub fn unwrap_delta(mut delta: f64) -> f64 {
    while delta >= 180.0 {
        delta -= 360.0;
    }
    while delta < -180.0 {
        delta += 360.0;
    }
    delta
}

/// Wrap an absolute angle to `[0, 360)` for raw encoder space.
pub fn wrap_360(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(360.0);
    // rem_euclid(360.0) of e.g. -1e-15 can round to exactly 360.0
    if wrapped >= 360.0 {
        wrapped - 360.0
    } else {
        wrapped
    }
}

impl JointCalibration {
    /// Reject configurations the inverse mapping cannot handle.
    ///
    /// A zero direction would divide by zero in `logical_to_raw`; this
    /// is a configuration error caught at load time, not per call.
    pub fn validate(&self, joint: usize) -> Result<()> {
        if self.direction != 1 && self.direction != -1 {
            return Err(Error::InvalidCalibration {
                joint,
                reason: format!("direction must be +1 or -1, got {}", self.direction),
            });
        }
        for (name, value) in [
            ("ref_raw", self.ref_raw),
            ("min_raw", self.min_raw),
            ("max_raw", self.max_raw),
        ] {
            if !value.is_finite() {
                return Err(Error::InvalidCalibration {
                    joint,
                    reason: format!("{} is not finite: {}", name, value),
                });
            }
        }
        Ok(())
    }

    /// Compute logical `(min_deg, max_deg)` from the raw endpoints.
    ///
    /// Always returns `min < max`: a negative direction swaps which raw
    /// endpoint produces the numerically larger logical angle, so the
    /// two candidates are ordered before returning.
    pub fn logical_limits(&self) -> (f64, f64) {
        let dir = self.direction as f64;
        let delta_min = unwrap_delta(self.min_raw - self.ref_raw);
        let delta_max = unwrap_delta(self.max_raw - self.ref_raw);

        let from_min = delta_min * dir + self.ref_offset;
        let from_max = delta_max * dir + self.ref_offset;

        (from_min.min(from_max), from_min.max(from_max))
    }

    /// Convert a raw encoder angle to a logical angle for display/IK.
    ///
    /// Result is clamped to the derived logical limits.
    pub fn raw_to_logical(&self, raw: f64) -> f64 {
        let delta = unwrap_delta(raw - self.ref_raw);
        let logical = delta * self.direction as f64 + self.ref_offset;

        let (min_deg, max_deg) = self.logical_limits();
        logical.clamp(min_deg, max_deg)
    }

    /// Convert a logical angle to a raw encoder angle for the wire.
    ///
    /// The input is clamped to the derived limits *before* inverting,
    /// so out-of-range requests land on the nearest endpoint.
    pub fn logical_to_raw(&self, logical: f64) -> f64 {
        let (min_deg, max_deg) = self.logical_limits();
        let logical = logical.clamp(min_deg, max_deg);

        let delta = (logical - self.ref_offset) / self.direction as f64;
        wrap_360(self.ref_raw + delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Joint 2 (shoulder) from the real arm: range crosses 0°/360°.
    fn shoulder() -> JointCalibration {
        JointCalibration {
            label: "Joint 2 shoulder".to_string(),
            enabled: true,
            ref_raw: 305.0,
            ref_offset: 90.0,
            direction: 1,
            min_raw: 256.0,
            max_raw: 9.2,
        }
    }

    /// Joint 4 from the real arm: inverted direction.
    fn wrist() -> JointCalibration {
        JointCalibration {
            label: "Joint 4".to_string(),
            enabled: true,
            ref_raw: 264.3,
            ref_offset: 0.0,
            direction: -1,
            min_raw: 356.0,
            max_raw: 175.0,
        }
    }

    #[test]
    fn test_unwrap_delta_shortest_path() {
        assert_eq!(unwrap_delta(50.0), 50.0);
        assert_eq!(unwrap_delta(-50.0), -50.0);
        assert_eq!(unwrap_delta(200.0), -160.0);
        assert_eq!(unwrap_delta(-200.0), 160.0);
        // Joint 2 endpoints
        assert!((unwrap_delta(9.2 - 305.0) - 64.2).abs() < 1e-9);
        assert!((unwrap_delta(256.0 - 305.0) - (-49.0)).abs() < 1e-9);
        // Boundary: 180 maps to -180, -180 stays
        assert_eq!(unwrap_delta(180.0), -180.0);
        assert_eq!(unwrap_delta(-180.0), -180.0);
    }

    #[test]
    fn test_unwrap_delta_range_invariant() {
        let mut d = -1000.0;
        while d < 1000.0 {
            let u = unwrap_delta(d);
            assert!((-180.0..180.0).contains(&u), "unwrap({}) = {}", d, u);
            d += 7.3;
        }
    }

    #[test]
    fn test_wrap_360() {
        assert_eq!(wrap_360(0.0), 0.0);
        assert_eq!(wrap_360(360.0), 0.0);
        assert_eq!(wrap_360(365.0), 5.0);
        assert_eq!(wrap_360(-5.0), 355.0);
        assert_eq!(wrap_360(725.0), 5.0);
    }

    #[test]
    fn test_shoulder_limits_cross_wrap() {
        let j = shoulder();
        let (min_deg, max_deg) = j.logical_limits();
        assert!((min_deg - 41.0).abs() < 1e-9);
        assert!((max_deg - 154.2).abs() < 1e-9);
    }

    #[test]
    fn test_shoulder_raw_to_logical() {
        let j = shoulder();
        assert!((j.raw_to_logical(305.0) - 90.0).abs() < 1e-9);
        assert!((j.raw_to_logical(9.2) - 154.2).abs() < 1e-9);
        assert!((j.raw_to_logical(256.0) - 41.0).abs() < 1e-9);
        // 340 is 35° past ref
        assert!((j.raw_to_logical(340.0) - 125.0).abs() < 1e-9);
        // 0° sits between 360° and max_raw=9.2°
        assert!((j.raw_to_logical(0.0) - 145.0).abs() < 1e-9);
    }

    #[test]
    fn test_shoulder_logical_to_raw() {
        let j = shoulder();
        assert!((j.logical_to_raw(90.0) - 305.0).abs() < 1e-9);
        assert!((j.logical_to_raw(154.2) - 9.2).abs() < 1e-9);
        assert!((j.logical_to_raw(41.0) - 256.0).abs() < 1e-9);
        // Out-of-range input clamps to the nearest endpoint
        assert!((j.logical_to_raw(500.0) - 9.2).abs() < 1e-9);
        assert!((j.logical_to_raw(-500.0) - 256.0).abs() < 1e-9);
    }

    #[test]
    fn test_inverted_direction_limits_ordered() {
        let j = wrist();
        let (min_deg, max_deg) = j.logical_limits();
        assert!(min_deg < max_deg);
        // min_raw=356 is +91.7° of raw travel, inverted to -91.7 logical
        assert!((min_deg - (-91.7)).abs() < 1e-9);
        assert!((max_deg - 89.3).abs() < 1e-9);
    }

    #[test]
    fn test_round_trip_all_joints() {
        for j in [shoulder(), wrist()] {
            for raw_in in [j.min_raw, j.ref_raw, j.max_raw] {
                let logical = j.raw_to_logical(raw_in);
                let raw_out = j.logical_to_raw(logical);
                let error = unwrap_delta(raw_out - raw_in).abs();
                assert!(error < 1e-9, "{}: raw {} -> {} -> {}", j.label, raw_in, logical, raw_out);
            }
        }
    }

    #[test]
    fn test_raw_to_logical_idempotent_after_clamp() {
        let j = shoulder();
        // A raw reading outside the calibrated range clamps; mapping the
        // clamped logical back and forth must then be a fixed point.
        for raw in [100.0, 200.0, 250.0, 20.0] {
            let l1 = j.raw_to_logical(raw);
            let l2 = j.raw_to_logical(j.logical_to_raw(l1));
            assert!((l1 - l2).abs() < 1e-9);
        }
    }

    #[test]
    fn test_validate_rejects_zero_direction() {
        let mut j = shoulder();
        j.direction = 0;
        assert!(j.validate(1).is_err());
        j.direction = -1;
        assert!(j.validate(1).is_ok());
    }
}
