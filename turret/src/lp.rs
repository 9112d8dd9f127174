//! Linear-program formulation of the yaw trajectory.
//!
//! For the next `n` aim periods the planner needs yaw rates `x[0..n)` that
//! respect the velocity and acceleration limits, end the horizon dead on
//! target, and track the target's predicted bearing in between. Tracking
//! error enters through slack variables `t[i] >= |Δ·Σ_{j<=i} x[j] − y_i|`
//! whose weights grow with the period index, so late-horizon error
//! dominates the objective and the solver prefers trajectories that
//! converge rather than ones that are briefly close.
//!
//! The solver itself is a black box behind this module; infeasibility is
//! reported as `None` and handled by the caller (a longer horizon, or
//! keeping the previous plan).

use minilp::{ComparisonOp, OptimizationDirection, Problem};
use tracing::{debug, warn};

/// One trajectory-solve request.
#[derive(Debug, Clone, Copy)]
pub struct LpRequest<'a> {
    /// Predicted aim yaw at the end of each period, radians, relative to
    /// the turret's bearing at the start of the horizon.
    pub target_yaws: &'a [f64],
    /// Yaw rate the turret enters the horizon with, rad/s.
    pub initial_rate: f64,
    /// Yaw rate the target will have at the end of the horizon, rad/s; the
    /// exit velocity must be within one period's acceleration of it.
    pub exit_rate: f64,
    /// Aim period, seconds.
    pub period: f64,
    pub max_velocity: f64,
    pub max_acceleration: f64,
}

/// The motion LP. Owns the formulation; stateless between solves apart
/// from logging.
#[derive(Debug, Default, Clone)]
pub struct MotionLp;

impl MotionLp {
    pub fn new() -> Self {
        Self
    }

    /// Solve for the yaw rates, one per target yaw. `None` when the
    /// program is infeasible for this horizon.
    pub fn solve(&self, req: &LpRequest) -> Option<Vec<f64>> {
        let n = req.target_yaws.len();
        assert!(n > 0, "motion LP needs at least one period");

        let mut problem = Problem::new(OptimizationDirection::Minimize);
        let rates: Vec<_> = (0..n)
            .map(|_| problem.add_var(0.0, (-req.max_velocity, req.max_velocity)))
            .collect();
        let slacks: Vec<_> = (0..n)
            .map(|i| problem.add_var(1000.0 * (i as f64 + 1.0), (0.0, f64::INFINITY)))
            .collect();

        let accel = req.max_acceleration * req.period;

        // Acceleration between consecutive periods, with the current
        // movement's rate as the entry condition.
        problem.add_constraint(
            [(rates[0], 1.0)].as_slice(),
            ComparisonOp::Le,
            req.initial_rate + accel,
        );
        problem.add_constraint(
            [(rates[0], 1.0)].as_slice(),
            ComparisonOp::Ge,
            req.initial_rate - accel,
        );
        for i in 1..n {
            problem.add_constraint(
                [(rates[i], 1.0), (rates[i - 1], -1.0)].as_slice(),
                ComparisonOp::Le,
                accel,
            );
            problem.add_constraint(
                [(rates[i], 1.0), (rates[i - 1], -1.0)].as_slice(),
                ComparisonOp::Ge,
                -accel,
            );
        }
        // The turret must leave the horizon matching the target's own
        // angular rate to within one period of acceleration.
        problem.add_constraint(
            [(rates[n - 1], 1.0)].as_slice(),
            ComparisonOp::Le,
            req.exit_rate + accel,
        );
        problem.add_constraint(
            [(rates[n - 1], 1.0)].as_slice(),
            ComparisonOp::Ge,
            req.exit_rate - accel,
        );

        // Tracking slack per period: both signs of
        // Δ·Σ_{j<=i} x[j] − y_i <= t_i.
        for i in 0..n {
            let mut le: Vec<_> = rates[..=i].iter().map(|&v| (v, req.period)).collect();
            let mut ge = le.clone();
            le.push((slacks[i], -1.0));
            ge.push((slacks[i], 1.0));
            problem.add_constraint(le.as_slice(), ComparisonOp::Le, req.target_yaws[i]);
            problem.add_constraint(ge.as_slice(), ComparisonOp::Ge, req.target_yaws[i]);
        }

        // Terminal alignment: the horizon ends exactly on target.
        let cover: Vec<_> = rates.iter().map(|&v| (v, req.period)).collect();
        problem.add_constraint(cover.as_slice(), ComparisonOp::Eq, req.target_yaws[n - 1]);

        match problem.solve() {
            Ok(solution) => Some(rates.iter().map(|&v| solution[v]).collect()),
            Err(minilp::Error::Infeasible) => {
                debug!("motion LP infeasible over {n} periods");
                None
            }
            Err(e) => {
                warn!("motion LP failed over {n} periods: {e}");
                None
            }
        }
    }
}
