//! Live table of tracked users.
//!
//! The tracker owns the camera session. Every skeleton frame is translated
//! into a fresh set of [`TrackedUser`] records (positions in polar camera
//! coordinates, velocities smoothed across frames and corrected for the
//! turret's own motion) and the table is replaced atomically. Consumers
//! never see a half-updated table.
//!
//! Frames are numbered: `global_frame_id` increments on every callback,
//! `detected_frame_id` only when the new table is non-empty. Waiters pass
//! their last-seen id and block until the tracker has seen a newer frame,
//! with optional timeout and shutdown cancellation.
//!
//! Camera timestamps arrive as ticks of the camera clock; a synchronisation
//! snapshot taken at startup and refreshed every `clock_sync_period` frames
//! maps them onto the system's monotonic clock, which silently absorbs
//! camera clock drift.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use nalgebra::Vector3;
use tracing::{debug, info};

use crate::angles::{secs, signed_secs, PolarCom};
use crate::camera::{CameraInfo, CameraTicks, SkeletonCamera, SkeletonFrame};
use crate::error::Result;
use crate::projection::{project_compensated, MotionCompensator};

/// Frames between clock-synchronisation snapshots.
pub const DEFAULT_CLOCK_SYNC_PERIOD: u64 = 900;

/// Per-axis velocity noise floor: 0.75°/s yaw, 10 cm/s height, 5 cm/s range.
/// Components smaller than this are measurement noise, not motion.
const MIN_COM_RATE: PolarCom = PolarCom {
    yaw: 0.013089969389957472,
    height: 0.10,
    range: 0.05,
};

/// Weight of the previous estimate in the generation-time EWMA.
const GENERATION_EWMA: f64 = 0.95;

/// One person, as of one frame. Records are immutable: every frame builds
/// new ones. `id` is stable for as long as the camera keeps re-identifying
/// the same skeleton.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackedUser {
    pub id: u32,
    /// System-clock time the frame was taken (after camera clock sync).
    pub timestamp: Instant,
    pub com: PolarCom,
    /// Smoothed rate of change of `com`, per second.
    pub com_rate: PolarCom,
}

#[derive(Debug, Clone, Copy)]
struct ClockSync {
    ticks: CameraTicks,
    at: Instant,
}

impl ClockSync {
    fn instant_for(&self, ticks: CameraTicks) -> Instant {
        if ticks >= self.ticks {
            self.at + Duration::from_micros(ticks - self.ticks)
        } else {
            self.at
                .checked_sub(Duration::from_micros(self.ticks - ticks))
                .unwrap_or(self.at)
        }
    }
}

struct TrackerState {
    users: Vec<TrackedUser>,
    global_frame_id: u64,
    detected_frame_id: u64,
    average_generation: Duration,
    sync: Option<ClockSync>,
    frames_since_sync: u64,
}

struct TrackerInner {
    state: Mutex<TrackerState>,
    any_frame: Condvar,
    detected_frame: Condvar,
    camera: Arc<dyn SkeletonCamera>,
    camera_offset: Vector3<f64>,
    compensator: Arc<dyn MotionCompensator>,
    clock_sync_period: u64,
    shutdown: AtomicBool,
}

/// Owns the camera session and the user table.
pub struct Tracker {
    inner: Arc<TrackerInner>,
}

impl Tracker {
    /// Open the camera session and start receiving frames.
    ///
    /// `camera_offset` is the camera's position relative to the turret
    /// origin, metres. The `compensator` corrects reprojections for turret
    /// motion; pass [`crate::projection::NoCompensation`] for a fixed rig.
    pub fn new(
        camera: Arc<dyn SkeletonCamera>,
        camera_offset: Vector3<f64>,
        compensator: Arc<dyn MotionCompensator>,
    ) -> Result<Self> {
        Self::with_clock_sync_period(camera, camera_offset, compensator, DEFAULT_CLOCK_SYNC_PERIOD)
    }

    pub fn with_clock_sync_period(
        camera: Arc<dyn SkeletonCamera>,
        camera_offset: Vector3<f64>,
        compensator: Arc<dyn MotionCompensator>,
        clock_sync_period: u64,
    ) -> Result<Self> {
        let inner = Arc::new(TrackerInner {
            state: Mutex::new(TrackerState {
                users: Vec::new(),
                global_frame_id: 0,
                detected_frame_id: 0,
                average_generation: Duration::ZERO,
                sync: None,
                frames_since_sync: 0,
            }),
            any_frame: Condvar::new(),
            detected_frame: Condvar::new(),
            camera: camera.clone(),
            camera_offset,
            compensator,
            clock_sync_period: clock_sync_period.max(1),
            shutdown: AtomicBool::new(false),
        });

        let callback_inner = inner.clone();
        camera.start(Box::new(move |frame| callback_inner.on_frame(frame)))?;
        info!("tracker started");
        Ok(Self { inner })
    }

    pub fn info(&self) -> CameraInfo {
        self.inner.camera.info()
    }

    /// Snapshot of the user table, every record dynamically projected to
    /// now.
    pub fn users(&self) -> Vec<TrackedUser> {
        let snapshot = {
            let state = self.inner.state.lock().unwrap();
            state.users.clone()
        };
        let now = Instant::now();
        snapshot
            .iter()
            .map(|user| self.project_dynamic(user, now))
            .collect()
    }

    /// Snapshot of the user table exactly as recorded, no projection.
    pub fn raw_users(&self) -> Vec<TrackedUser> {
        self.inner.state.lock().unwrap().users.clone()
    }

    /// Project a user to `timestamp`, compensating for turret motion.
    pub fn project_dynamic(&self, user: &TrackedUser, timestamp: Instant) -> TrackedUser {
        project_compensated(user, timestamp, &*self.inner.compensator)
    }

    /// Block until the tracker has processed a frame newer than
    /// `*last_seen`. Returns `true` (and updates `last_seen`) when a
    /// fresher frame exists, `false` on timeout or shutdown.
    pub fn wait_any_frame(&self, last_seen: &mut u64, timeout: Option<Duration>) -> bool {
        self.wait_counter(false, last_seen, timeout)
    }

    /// Like [`wait_any_frame`](Self::wait_any_frame), but only frames whose
    /// user table is non-empty count.
    pub fn wait_detected_frame(&self, last_seen: &mut u64, timeout: Option<Duration>) -> bool {
        self.wait_counter(true, last_seen, timeout)
    }

    pub fn global_frame_id(&self) -> u64 {
        self.inner.state.lock().unwrap().global_frame_id
    }

    pub fn detected_frame_id(&self) -> u64 {
        self.inner.state.lock().unwrap().detected_frame_id
    }

    /// Exponentially smoothed delay between frame capture and callback.
    pub fn average_generation_time(&self) -> Duration {
        self.inner.state.lock().unwrap().average_generation
    }

    /// Cancel all waiters and stop accepting frames. Idempotent; also runs
    /// on drop.
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::SeqCst);
        let _state = self.inner.state.lock().unwrap();
        self.inner.any_frame.notify_all();
        self.inner.detected_frame.notify_all();
    }

    fn wait_counter(&self, detected: bool, last_seen: &mut u64, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        let cv = if detected {
            &self.inner.detected_frame
        } else {
            &self.inner.any_frame
        };
        let mut state = self.inner.state.lock().unwrap();
        loop {
            if self.inner.shutdown.load(Ordering::SeqCst) {
                return false;
            }
            let current = if detected {
                state.detected_frame_id
            } else {
                state.global_frame_id
            };
            if current > *last_seen {
                *last_seen = current;
                return true;
            }
            state = match deadline {
                None => cv.wait(state).unwrap(),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    cv.wait_timeout(state, deadline - now).unwrap().0
                }
            };
        }
    }
}

impl Drop for Tracker {
    fn drop(&mut self) {
        self.shutdown();
        self.inner.camera.stop();
    }
}

impl TrackerInner {
    fn on_frame(&self, frame: SkeletonFrame) {
        if self.shutdown.load(Ordering::SeqCst) {
            return;
        }
        let now = Instant::now();
        let mut state = self.state.lock().unwrap();

        let need_sync = match state.sync {
            None => true,
            Some(_) => state.frames_since_sync >= self.clock_sync_period,
        };
        if need_sync {
            let sync = ClockSync {
                ticks: self.camera.timestamp_now(),
                at: Instant::now(),
            };
            debug!("camera clock synchronised at {} ticks", sync.ticks);
            state.sync = Some(sync);
            state.frames_since_sync = 0;
        }
        state.frames_since_sync += 1;

        let sync = state.sync.expect("sync established above");
        let timestamp = sync.instant_for(frame.timestamp_ticks);

        let generation = now.saturating_duration_since(timestamp);
        state.average_generation = Duration::from_secs_f64(
            GENERATION_EWMA * secs(state.average_generation)
                + (1.0 - GENERATION_EWMA) * secs(generation),
        );

        let mut new_users = Vec::with_capacity(frame.users.len());
        for raw in &frame.users {
            // A zero depth means the camera lost the user this frame.
            if raw.com_mm.z == 0.0 {
                continue;
            }
            let com = PolarCom::from_cartesian(raw.com_mm / 1000.0 + self.camera_offset);
            let mut user = TrackedUser {
                id: raw.id,
                timestamp,
                com,
                com_rate: PolarCom::default(),
            };

            if let Some(prev) = state.users.iter().find(|u| u.id == raw.id) {
                let dt = signed_secs(prev.timestamp, timestamp);
                if dt > 0.0 {
                    // Reproject the new position back to the previous
                    // frame's time (correcting for turret motion in
                    // between) to observe the displacement, then blend
                    // with the previous estimate.
                    let back = project_compensated(&user, prev.timestamp, &*self.compensator);
                    let observed = (back.com - prev.com) / dt;
                    user.com_rate = (prev.com_rate * 0.5 + observed * 0.5)
                        .apply_noise_floor(&MIN_COM_RATE);
                } else {
                    user.com_rate = prev.com_rate;
                }
            }
            new_users.push(user);
        }

        let detected = !new_users.is_empty();
        state.users = new_users;
        state.global_frame_id += 1;
        if detected {
            state.detected_frame_id += 1;
        }
        drop(state);

        self.any_frame.notify_all();
        if detected {
            self.detected_frame.notify_all();
        }
    }
}
