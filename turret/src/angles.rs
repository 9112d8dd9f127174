//! Polar center-of-mass coordinates and small time helpers.
//!
//! A tracked person lives in mixed polar coordinates relative to the camera:
//! a yaw angle off the optical axis, a height above the camera centre, and a
//! ground range. Velocities use the same axes, which keeps the ballistics
//! one-dimensional per axis.

use std::ops::{Add, Div, Mul, Sub};
use std::time::{Duration, Instant};

use nalgebra::Vector3;

/// Center-of-mass position (or rate of change) in the camera frame:
/// yaw in radians, height in metres, ground range in metres.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PolarCom {
    pub yaw: f64,
    pub height: f64,
    pub range: f64,
}

impl PolarCom {
    pub fn new(yaw: f64, height: f64, range: f64) -> Self {
        Self { yaw, height, range }
    }

    /// Convert a cartesian camera-frame position (metres, after origin
    /// offset) to polar. `yaw = atan2(x, z)`, `range = sqrt(x² + z²)`;
    /// range is non-negative by construction.
    pub fn from_cartesian(v: Vector3<f64>) -> Self {
        Self {
            yaw: v.x.atan2(v.z),
            height: v.y,
            range: (v.x * v.x + v.z * v.z).sqrt(),
        }
    }

    /// Zero every component whose magnitude is below the matching component
    /// of `floor`. Used to suppress tracker velocity noise.
    pub fn apply_noise_floor(mut self, floor: &PolarCom) -> Self {
        if self.yaw.abs() < floor.yaw {
            self.yaw = 0.0;
        }
        if self.height.abs() < floor.height {
            self.height = 0.0;
        }
        if self.range.abs() < floor.range {
            self.range = 0.0;
        }
        self
    }
}

impl Add for PolarCom {
    type Output = PolarCom;
    fn add(self, rhs: PolarCom) -> PolarCom {
        PolarCom::new(
            self.yaw + rhs.yaw,
            self.height + rhs.height,
            self.range + rhs.range,
        )
    }
}

impl Sub for PolarCom {
    type Output = PolarCom;
    fn sub(self, rhs: PolarCom) -> PolarCom {
        PolarCom::new(
            self.yaw - rhs.yaw,
            self.height - rhs.height,
            self.range - rhs.range,
        )
    }
}

impl Mul<f64> for PolarCom {
    type Output = PolarCom;
    fn mul(self, scale: f64) -> PolarCom {
        PolarCom::new(self.yaw * scale, self.height * scale, self.range * scale)
    }
}

impl Div<f64> for PolarCom {
    type Output = PolarCom;
    fn div(self, scale: f64) -> PolarCom {
        PolarCom::new(self.yaw / scale, self.height / scale, self.range / scale)
    }
}

/// A duration as floating-point seconds.
pub fn secs(d: Duration) -> f64 {
    d.as_secs_f64()
}

/// Seconds from `from` to `to`, negative when `to` is earlier.
pub fn signed_secs(from: Instant, to: Instant) -> f64 {
    match to.checked_duration_since(from) {
        Some(d) => d.as_secs_f64(),
        None => -from.saturating_duration_since(to).as_secs_f64(),
    }
}
