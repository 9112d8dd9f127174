//! Kinematic and turret-compensated projection of tracked users.
//!
//! A user's polar coordinates are camera-relative, and the camera rides the
//! turret. Projecting a user across time therefore has two parts: the
//! user's own motion (kinematic, from the smoothed velocity) and the
//! turret's motion over the same interval, supplied by a
//! [`MotionCompensator`]. The tracker takes the compensator by injection so
//! it never needs to know what a motion plan is; the controller provides
//! the plan-backed implementation.

use std::time::Instant;

use crate::angles::signed_secs;
use crate::tracker::TrackedUser;

/// Project a user to `timestamp` assuming constant velocity.
pub fn project(user: &TrackedUser, timestamp: Instant) -> TrackedUser {
    let dt = signed_secs(user.timestamp, timestamp);
    TrackedUser {
        id: user.id,
        timestamp,
        com: user.com + user.com_rate * dt,
        com_rate: user.com_rate,
    }
}

/// Source of the turret's own yaw motion over a time interval.
pub trait MotionCompensator: Send + Sync {
    /// Signed yaw the turret swept between `early` and `late`
    /// (`early <= late`), radians.
    fn yaw_travel(&self, early: Instant, late: Instant) -> f64;
}

/// Compensator for a turret that never moves.
pub struct NoCompensation;

impl MotionCompensator for NoCompensation {
    fn yaw_travel(&self, _early: Instant, _late: Instant) -> f64 {
        0.0
    }
}

/// Project a user to `timestamp`, correcting for turret motion in between.
///
/// Projecting forward in time the turret's sweep is subtracted from the
/// user's camera-relative yaw (the camera turned towards a positive sweep,
/// so the user appears further the other way); projecting backward it is
/// added.
pub fn project_compensated(
    user: &TrackedUser,
    timestamp: Instant,
    compensator: &dyn MotionCompensator,
) -> TrackedUser {
    let mut projected = project(user, timestamp);
    if timestamp >= user.timestamp {
        projected.com.yaw -= compensator.yaw_travel(user.timestamp, timestamp);
    } else {
        projected.com.yaw += compensator.yaw_travel(timestamp, user.timestamp);
    }
    projected
}
