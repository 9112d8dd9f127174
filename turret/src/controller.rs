//! The controller: owns the motion plan and the motors, runs the planner
//! loop, and feeds the tracker a plan-backed motion compensator so user
//! reprojections account for the turret's own travel.
//!
//! One thread does the planning and the servo advancement: it waits for
//! fresh tracked users, replans the yaw trajectory, then walks the plan
//! segment by segment, programming the yaw rate and pitch target at each
//! boundary, until fresher user data interrupts the walk. The water valve
//! opens while a target is engaged and closes when the plan falls back to
//! searching.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use hardware::{PositionStepper, RateStepper, Solenoid};
use nalgebra::Vector3;
use tracing::{info, warn};

use crate::aimer::Aimer;
use crate::angles::secs;
use crate::camera::SkeletonCamera;
use crate::error::{Result, TurretError};
use crate::plan::{MovementPlan, SingleMovement};
use crate::planner::MotionPlanner;
use crate::projection::MotionCompensator;
use crate::tracker::Tracker;

/// Construction parameters for the control stack.
#[derive(Debug, Clone)]
pub struct ControlParams {
    /// Muzzle speed of the water, m/s.
    pub water_rate: f64,
    /// Horizontal deceleration of the water, m/s².
    pub air_resistance: f64,
    /// Yaw limits, rad/s and rad/s².
    pub max_yaw_velocity: f64,
    pub max_yaw_acceleration: f64,
    /// Planner discretisation step. `None` = one camera frame period.
    pub aim_period: Option<Duration>,
    /// Slew speed while no target is engaged, rad/s (magnitude).
    pub search_yaw_velocity: f64,
    /// Camera position relative to the turret origin, metres.
    pub camera_offset: Vector3<f64>,
}

/// The plan plus the condition variable signalling cursor advances.
struct PlanCell {
    plan: Mutex<MovementPlan>,
    changed: Condvar,
}

/// Motion compensator backed by the live movement plan.
struct PlanCompensator {
    cell: Arc<PlanCell>,
}

impl MotionCompensator for PlanCompensator {
    fn yaw_travel(&self, early: Instant, late: Instant) -> f64 {
        self.cell.plan.lock().unwrap().yaw_travel(early, late)
    }
}

/// The assembled turret: tracker, planner thread, motors, valve.
pub struct Controller {
    tracker: Arc<Tracker>,
    cell: Arc<PlanCell>,
    shutdown: Arc<AtomicBool>,
    planner_thread: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller").finish_non_exhaustive()
    }
}

impl Controller {
    /// Build the full stack and start the planner thread.
    ///
    /// Fails on invalid parameters or if the camera session cannot be
    /// opened. The steppers and valve are consumed; they belong to the
    /// planner thread from here on.
    pub fn new(
        camera: Arc<dyn SkeletonCamera>,
        yaw_stepper: RateStepper,
        pitch_stepper: PositionStepper,
        valve: Solenoid,
        params: ControlParams,
    ) -> Result<Self> {
        if params.water_rate <= 0.0 {
            return Err(TurretError::Config("water rate must be positive".into()));
        }
        if params.max_yaw_velocity <= 0.0 || params.max_yaw_acceleration <= 0.0 {
            return Err(TurretError::Config("yaw limits must be positive".into()));
        }
        if params.search_yaw_velocity < 0.0 {
            return Err(TurretError::Config(
                "search yaw velocity is a magnitude and cannot be negative".into(),
            ));
        }

        let camera_info = camera.info();
        let aim_period = match params.aim_period {
            Some(period) if period > Duration::ZERO => period,
            Some(_) => {
                return Err(TurretError::Config("aim period must be positive".into()));
            }
            None if camera_info.fps > 0.0 => Duration::from_secs_f64(1.0 / camera_info.fps),
            None => {
                return Err(TurretError::Config(
                    "camera reports no frame rate; aim period required".into(),
                ));
            }
        };
        // Keep roughly one second of trajectory planned ahead.
        let num_future = (1.0 / secs(aim_period)).ceil().max(1.0) as usize;

        let cell = Arc::new(PlanCell {
            plan: Mutex::new(MovementPlan::new(
                Instant::now(),
                params.search_yaw_velocity,
            )),
            changed: Condvar::new(),
        });
        let compensator = Arc::new(PlanCompensator { cell: cell.clone() });
        let tracker = Arc::new(Tracker::new(
            camera,
            params.camera_offset,
            compensator,
        )?);

        let aimer = Aimer::new(params.water_rate, params.air_resistance, &camera_info);
        let planner = MotionPlanner::new(
            aimer,
            params.max_yaw_velocity,
            params.max_yaw_acceleration,
            aim_period,
        );

        let shutdown = Arc::new(AtomicBool::new(false));
        let planner_loop = PlannerLoop {
            tracker: tracker.clone(),
            cell: cell.clone(),
            planner,
            yaw_stepper,
            pitch_stepper,
            valve,
            search_yaw_velocity: params.search_yaw_velocity,
            num_future,
            shutdown: shutdown.clone(),
        };
        let planner_thread = thread::Builder::new()
            .name("motion-planner".into())
            .spawn(move || planner_loop.run())
            .map_err(|e| TurretError::Config(format!("failed to spawn planner: {e}")))?;

        info!(
            "controller started: aim period {}ms, {num_future} future movements",
            aim_period.as_millis()
        );
        Ok(Self {
            tracker,
            cell,
            shutdown,
            planner_thread: Some(planner_thread),
        })
    }

    pub fn tracker(&self) -> &Arc<Tracker> {
        &self.tracker
    }

    /// The movement currently being executed.
    pub fn current_movement(&self) -> SingleMovement {
        *self.cell.plan.lock().unwrap().current()
    }

    /// Block until the current movement changes (the cursor advances),
    /// then return the new movement. `None` on timeout or shutdown.
    pub fn wait_current_movement(&self, timeout: Option<Duration>) -> Option<SingleMovement> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut plan = self.cell.plan.lock().unwrap();
        let seen = plan.generation();
        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                return None;
            }
            if plan.generation() != seen {
                return Some(*plan.current());
            }
            plan = match deadline {
                None => self.cell.changed.wait(plan).unwrap(),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return None;
                    }
                    self.cell.changed.wait_timeout(plan, deadline - now).unwrap().0
                }
            };
        }
    }

    /// Copy of the whole plan, history included. Primarily for
    /// introspection and tests.
    pub fn snapshot_plan(&self) -> Vec<SingleMovement> {
        self.cell.plan.lock().unwrap().segments().copied().collect()
    }

    /// Stop planning and motion. Idempotent; also runs on drop.
    pub fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        // Waking the tracker's waiters unblocks the planner thread; waking
        // the plan condvar unblocks movement waiters.
        self.tracker.shutdown();
        {
            let _plan = self.cell.plan.lock().unwrap();
            self.cell.changed.notify_all();
        }
        if let Some(thread) = self.planner_thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct PlannerLoop {
    tracker: Arc<Tracker>,
    cell: Arc<PlanCell>,
    planner: MotionPlanner,
    yaw_stepper: RateStepper,
    pitch_stepper: PositionStepper,
    valve: Solenoid,
    search_yaw_velocity: f64,
    num_future: usize,
    shutdown: Arc<AtomicBool>,
}

impl PlannerLoop {
    fn run(mut self) {
        info!("movement planner running");
        let mut frame_id = 0u64;

        // Nothing to do until somebody shows up.
        if !self.tracker.wait_detected_frame(&mut frame_id, None) {
            self.park();
            return;
        }

        while !self.shutdown.load(Ordering::SeqCst) {
            let users = self.tracker.users();
            let Some(target) = self.planner.aimer().choose_target(&users) else {
                if !self.tracker.wait_detected_frame(&mut frame_id, None) {
                    break;
                }
                continue;
            };

            let current = *self.cell.plan.lock().unwrap().current();
            let future = self
                .planner
                .future_movements(&target, &current, self.num_future);
            if let Some(future) = future {
                // Erase the not-yet-started tail, splice in the forecast,
                // and cap it with a fresh search segment, atomically.
                self.cell.plan.lock().unwrap().replace_future(
                    Instant::now(),
                    future,
                    self.search_yaw_velocity,
                );
            }

            // Walk the plan until fresher user data interrupts.
            loop {
                let (movement, searching) = {
                    let mut plan = self.cell.plan.lock().unwrap();
                    match plan.advance(Instant::now()) {
                        Some(movement) => {
                            self.cell.changed.notify_all();
                            (Some(movement), plan.cursor_on_search())
                        }
                        None => (None, true),
                    }
                };
                if let Some(movement) = movement {
                    self.apply(&movement);
                }
                let _ = if searching {
                    self.valve.power_off()
                } else {
                    self.valve.power_on()
                };

                let timeout = movement
                    .filter(|m| !m.is_search())
                    .map(|m| m.duration);
                if self.tracker.wait_detected_frame(&mut frame_id, timeout) {
                    break; // fresh users: replan
                }
                if self.shutdown.load(Ordering::SeqCst) {
                    self.park();
                    return;
                }
                // Timeout: the segment ran its course, advance to the next.
            }
        }
        self.park();
    }

    fn apply(&mut self, movement: &SingleMovement) {
        if let Err(e) = self.yaw_stepper.set_velocity(movement.yaw_rate) {
            warn!("yaw stepper update failed: {e}");
        }
        self.pitch_stepper
            .set_position(movement.ending_pitch, movement.duration);
    }

    fn park(&mut self) {
        if let Err(e) = self.yaw_stepper.set_velocity(0.0) {
            warn!("yaw stepper park failed: {e}");
        }
        if let Err(e) = self.valve.power_off() {
            warn!("valve close failed: {e}");
        }
        info!("movement planner stopped");
    }
}
