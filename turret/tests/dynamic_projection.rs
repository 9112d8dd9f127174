//! Dynamic projection against a live movement plan: the tracker-side
//! reprojection must see exactly the yaw the plan says the turret swept.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use approx::assert_relative_eq;

use turret::plan::{MovementPlan, SingleMovement};
use turret::projection::{project_compensated, MotionCompensator};
use turret::{PolarCom, TrackedUser};

struct PlanSweep {
    plan: Arc<Mutex<MovementPlan>>,
}

impl MotionCompensator for PlanSweep {
    fn yaw_travel(&self, early: Instant, late: Instant) -> f64 {
        self.plan.lock().unwrap().yaw_travel(early, late)
    }
}

fn plan_with_segment(t0: Instant, yaw_rate: f64, millis: u64) -> PlanSweep {
    let mut plan = MovementPlan::new(t0, 0.5);
    plan.replace_future(
        t0,
        vec![SingleMovement {
            start: None,
            duration: Duration::from_millis(millis),
            yaw_rate,
            ending_pitch: 0.0,
        }],
        0.5,
    );
    plan.advance(t0);
    PlanSweep {
        plan: Arc::new(Mutex::new(plan)),
    }
}

fn user_at(timestamp: Instant, yaw: f64, yaw_rate: f64) -> TrackedUser {
    TrackedUser {
        id: 1,
        timestamp,
        com: PolarCom::new(yaw, 0.0, 4.0),
        com_rate: PolarCom::new(yaw_rate, 0.0, 0.0),
    }
}

#[test]
fn test_forward_projection_subtracts_turret_sweep() {
    // Plan: 1.0 rad/s starting at t0 for 100 ms. A user recorded at t0
    // with yaw 0.5 and no motion of their own appears at yaw 0.4 by the
    // time the segment ends.
    let t0 = Instant::now();
    let sweep = plan_with_segment(t0, 1.0, 100);

    let user = user_at(t0, 0.5, 0.0);
    let projected = project_compensated(&user, t0 + Duration::from_millis(100), &sweep);
    assert_relative_eq!(projected.com.yaw, 0.4, epsilon = 1e-9);
    // Height and range are untouched by turret yaw.
    assert_relative_eq!(projected.com.height, 0.0);
    assert_relative_eq!(projected.com.range, 4.0);
}

#[test]
fn test_backward_projection_adds_turret_sweep() {
    // The same geometry reversed: a user recorded after the sweep, asked
    // about before it.
    let t0 = Instant::now();
    let sweep = plan_with_segment(t0, 1.0, 100);

    let user = user_at(t0 + Duration::from_millis(100), 0.4, 0.0);
    let back = project_compensated(&user, t0, &sweep);
    assert_relative_eq!(back.com.yaw, 0.5, epsilon = 1e-9);
}

#[test]
fn test_user_motion_and_turret_motion_compose() {
    // User walks in yaw at 0.2 rad/s while the turret sweeps at 1.0:
    // kinematics add 0.02 rad over 100 ms, the sweep removes 0.1.
    let t0 = Instant::now();
    let sweep = plan_with_segment(t0, 1.0, 100);

    let user = user_at(t0, 0.5, 0.2);
    let projected = project_compensated(&user, t0 + Duration::from_millis(100), &sweep);
    assert_relative_eq!(projected.com.yaw, 0.5 + 0.02 - 0.1, epsilon = 1e-9);
}

#[test]
fn test_partial_overlap_counts_partial_sweep() {
    // Asking about half the segment sees half the sweep; the unstarted
    // search segment beyond the forecast contributes nothing.
    let t0 = Instant::now();
    let sweep = plan_with_segment(t0, 1.0, 100);

    let user = user_at(t0, 0.0, 0.0);
    let projected = project_compensated(&user, t0 + Duration::from_millis(50), &sweep);
    assert_relative_eq!(projected.com.yaw, -0.05, epsilon = 1e-9);

    // Beyond the forecast end the sweep stops accumulating.
    let projected = project_compensated(&user, t0 + Duration::from_millis(300), &sweep);
    assert_relative_eq!(projected.com.yaw, -0.1, epsilon = 1e-9);
}
