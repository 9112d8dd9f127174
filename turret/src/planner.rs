//! Builds movement forecasts for a chosen target.
//!
//! For each future aim period the target is projected forward, the aimer
//! produces the intercept bearing and pitch, and the motion LP turns the
//! bearing sequence into rate-limited yaw rates. If the LP cannot land on
//! target within the requested horizon the planner retries once with a
//! longer one (more periods give the turret room to accelerate), and if
//! that is still infeasible the caller keeps its current plan.

use std::time::Duration;

use tracing::debug;

use crate::aimer::Aimer;
use crate::angles::secs;
use crate::lp::{LpRequest, MotionLp};
use crate::plan::SingleMovement;
use crate::projection::project;
use crate::tracker::TrackedUser;

/// Horizon multiplier applied when the requested horizon is infeasible.
const HORIZON_GROWTH: usize = 4;

/// Turns a chosen target into a forecast of [`SingleMovement`]s.
pub struct MotionPlanner {
    aimer: Aimer,
    lp: MotionLp,
    max_yaw_velocity: f64,
    max_yaw_acceleration: f64,
    aim_period: Duration,
}

impl MotionPlanner {
    pub fn new(
        aimer: Aimer,
        max_yaw_velocity: f64,
        max_yaw_acceleration: f64,
        aim_period: Duration,
    ) -> Self {
        Self {
            aimer,
            lp: MotionLp::new(),
            max_yaw_velocity,
            max_yaw_acceleration,
            aim_period,
        }
    }

    pub fn aimer(&self) -> &Aimer {
        &self.aimer
    }

    pub fn aim_period(&self) -> Duration {
        self.aim_period
    }

    /// Plan the next `periods` aim periods for `user`, entering at
    /// `current`'s yaw rate.
    ///
    /// The forecast may be longer than `periods` when only a grown horizon
    /// is feasible, and shorter when the target becomes unreachable partway
    /// through (the horizon is cut at the last reachable period). `None`
    /// means no feasible plan exists and the existing plan should keep
    /// running.
    pub fn future_movements(
        &self,
        user: &TrackedUser,
        current: &SingleMovement,
        periods: usize,
    ) -> Option<Vec<SingleMovement>> {
        let periods = periods.max(1);
        for horizon in [periods, periods * HORIZON_GROWTH] {
            let mut target_yaws = Vec::with_capacity(horizon);
            let mut pitches = Vec::with_capacity(horizon);
            for i in 0..horizon {
                let at = user.timestamp + self.aim_period * (i as u32 + 1);
                let aim = self.aimer.calculate_aim(&project(user, at));
                match aim {
                    Some(aim) => {
                        target_yaws.push(aim.yaw);
                        pitches.push(aim.pitch);
                    }
                    // Unreachable from here on; plan what is plannable.
                    None => break,
                }
            }
            if target_yaws.is_empty() {
                return None;
            }

            let request = LpRequest {
                target_yaws: &target_yaws,
                initial_rate: current.yaw_rate,
                exit_rate: user.com_rate.yaw,
                period: secs(self.aim_period),
                max_velocity: self.max_yaw_velocity,
                max_acceleration: self.max_yaw_acceleration,
            };
            if let Some(rates) = self.lp.solve(&request) {
                let movements = rates
                    .iter()
                    .zip(pitches)
                    .enumerate()
                    .map(|(i, (&yaw_rate, ending_pitch))| SingleMovement {
                        start: Some(user.timestamp + self.aim_period * i as u32),
                        duration: self.aim_period,
                        yaw_rate,
                        ending_pitch,
                    })
                    .collect();
                return Some(movements);
            }
        }
        debug!("no feasible yaw plan for user {}; keeping current plan", user.id);
        None
    }
}
