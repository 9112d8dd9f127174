//! Control stack for a self-aiming water turret.
//!
//! A depth camera with skeleton tracking watches the scene; this crate
//! turns its frames into motor pulses:
//!
//! 1. [`tracker`] maintains a live table of tracked users in polar camera
//!    coordinates, with smoothed velocities and frame-sequenced wait
//!    primitives.
//! 2. [`aimer`] solves the ballistics (a quartic in the time of flight) and
//!    scores candidate targets.
//! 3. [`planner`] and [`lp`] turn the chosen target's predicted bearing
//!    into a rate- and acceleration-limited yaw trajectory plus per-period
//!    pitch set-points.
//! 4. [`controller`] owns the resulting [`plan`], walks it in real time,
//!    drives the steppers from the `hardware` crate, and compensates user
//!    reprojection for the turret's own motion.
//!
//! The camera SDK and the GPIO/PWM surface are consumed behind narrow
//! traits ([`camera::SkeletonCamera`], `hardware::DriverBackend`), so the
//! whole stack runs unmodified against mocks.

pub mod aimer;
pub mod angles;
pub mod camera;
pub mod config;
pub mod controller;
pub mod error;
pub mod lp;
pub mod plan;
pub mod planner;
pub mod projection;
pub mod quartic;
pub mod tracker;

pub use aimer::{Aimer, GunPosition, GRAVITY};
pub use angles::PolarCom;
pub use camera::{CameraInfo, MockCamera, RawUser, SkeletonCamera, SkeletonFrame};
pub use config::TurretConfig;
pub use controller::{ControlParams, Controller};
pub use error::{Result, TurretError};
pub use plan::{MovementPlan, SingleMovement};
pub use planner::MotionPlanner;
pub use projection::{project, MotionCompensator, NoCompensation};
pub use tracker::{Tracker, TrackedUser};
