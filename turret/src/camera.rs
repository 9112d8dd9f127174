//! The consumed depth-camera / skeleton-tracker surface.
//!
//! The real SDK adapter lives outside this crate; everything here is the
//! narrow interface the tracker consumes, plus [`MockCamera`], which replays
//! scripted skeleton frames for tests and dry runs.
//!
//! Timestamps from the camera are ticks of its own clock (microseconds in
//! the camera time domain); the tracker translates them to `Instant`s via a
//! periodically refreshed synchronisation snapshot.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use nalgebra::Vector3;
use tracing::debug;

use crate::error::{Result, TurretError};

/// Microseconds on the camera's own clock.
pub type CameraTicks = u64;

/// One skeleton as reported by the camera: a session-stable id and the
/// centre of mass in cartesian camera coordinates, millimetres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawUser {
    pub id: u32,
    pub com_mm: Vector3<f64>,
}

/// One skeleton-tracker frame.
#[derive(Debug, Clone, PartialEq)]
pub struct SkeletonFrame {
    pub timestamp_ticks: CameraTicks,
    pub users: Vec<RawUser>,
}

/// Static camera properties.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraInfo {
    /// Horizontal field of view, radians.
    pub h_fov: f64,
    /// Vertical field of view, radians.
    pub v_fov: f64,
    /// Maximum reported depth, metres.
    pub max_depth: f64,
    /// Frame rate, frames per second.
    pub fps: f64,
}

/// Callback invoked on the camera's own thread for every frame.
pub type FrameHandler = Box<dyn Fn(SkeletonFrame) + Send + Sync>;

/// A depth camera with skeleton tracking.
///
/// `start` registers the frame handler and begins delivery; `stop` halts
/// delivery and is idempotent. Implementations deliver frames from a single
/// thread of their own and never call back into the handler after `stop`
/// returns.
pub trait SkeletonCamera: Send + Sync {
    fn info(&self) -> CameraInfo;

    /// The camera clock right now, for clock synchronisation.
    fn timestamp_now(&self) -> CameraTicks;

    fn start(&self, handler: FrameHandler) -> Result<()>;

    fn stop(&self);
}

enum MockMode {
    /// Frames pushed explicitly with [`MockCamera::emit`].
    Manual,
    /// Frames replayed cyclically at the camera frame rate.
    Scripted(Vec<Vec<RawUser>>),
}

struct MockShared {
    handler: Mutex<Option<Arc<FrameHandler>>>,
    stop: AtomicBool,
}

/// Scripted stand-in for the camera SDK.
///
/// In manual mode the test calls [`emit`](Self::emit) and the handler runs
/// synchronously on the caller's thread, which keeps tests deterministic.
/// In scripted mode `start` spawns a delivery thread that replays the
/// script at the configured frame rate, looping.
pub struct MockCamera {
    info: CameraInfo,
    epoch: Instant,
    mode: MockMode,
    shared: Arc<MockShared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl MockCamera {
    pub fn new(info: CameraInfo) -> Self {
        Self {
            info,
            epoch: Instant::now(),
            mode: MockMode::Manual,
            shared: Arc::new(MockShared {
                handler: Mutex::new(None),
                stop: AtomicBool::new(false),
            }),
            thread: Mutex::new(None),
        }
    }

    pub fn scripted(info: CameraInfo, frames: Vec<Vec<RawUser>>) -> Self {
        let mut camera = Self::new(info);
        camera.mode = MockMode::Scripted(frames);
        camera
    }

    /// Deliver one frame, stamped with the current camera clock. Manual
    /// mode only; a no-op before `start` or after `stop`.
    pub fn emit(&self, users: Vec<RawUser>) {
        let handler = self.shared.handler.lock().unwrap().clone();
        if let Some(handler) = handler {
            if !self.shared.stop.load(Ordering::SeqCst) {
                handler(SkeletonFrame {
                    timestamp_ticks: self.timestamp_now(),
                    users,
                });
            }
        }
    }
}

impl SkeletonCamera for MockCamera {
    fn info(&self) -> CameraInfo {
        self.info
    }

    fn timestamp_now(&self) -> CameraTicks {
        self.epoch.elapsed().as_micros() as CameraTicks
    }

    fn start(&self, handler: FrameHandler) -> Result<()> {
        let mut slot = self.shared.handler.lock().unwrap();
        if slot.is_some() {
            return Err(TurretError::Camera("mock camera already started".into()));
        }
        let handler = Arc::new(handler);
        *slot = Some(handler.clone());
        drop(slot);

        if let MockMode::Scripted(frames) = &self.mode {
            let frames = frames.clone();
            let shared = self.shared.clone();
            let epoch = self.epoch;
            let interval = Duration::from_secs_f64(1.0 / self.info.fps);
            let thread = thread::Builder::new()
                .name("mock-camera".into())
                .spawn(move || {
                    debug!("mock camera streaming {} scripted frames", frames.len());
                    let mut index = 0usize;
                    while !shared.stop.load(Ordering::SeqCst) {
                        thread::sleep(interval);
                        if shared.stop.load(Ordering::SeqCst) {
                            break;
                        }
                        handler(SkeletonFrame {
                            timestamp_ticks: epoch.elapsed().as_micros() as CameraTicks,
                            users: frames[index % frames.len()].clone(),
                        });
                        index += 1;
                    }
                })
                .map_err(|e| TurretError::Camera(e.to_string()))?;
            *self.thread.lock().unwrap() = Some(thread);
        }
        Ok(())
    }

    fn stop(&self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.lock().unwrap().take() {
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn test_info() -> CameraInfo {
        CameraInfo {
            h_fov: 1.0,
            v_fov: 0.8,
            max_depth: 10.0,
            fps: 100.0,
        }
    }

    #[test]
    fn test_manual_emit_reaches_handler() {
        let camera = MockCamera::new(test_info());
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();
        camera
            .start(Box::new(move |frame| {
                assert_eq!(frame.users.len(), 1);
                seen_clone.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();

        camera.emit(vec![RawUser {
            id: 1,
            com_mm: Vector3::new(0.0, 0.0, 3000.0),
        }]);
        camera.emit(vec![RawUser {
            id: 1,
            com_mm: Vector3::new(10.0, 0.0, 3000.0),
        }]);
        assert_eq!(seen.load(Ordering::SeqCst), 2);

        camera.stop();
        camera.emit(vec![]);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_scripted_replays_frames() {
        let camera = MockCamera::scripted(
            test_info(),
            vec![vec![RawUser {
                id: 7,
                com_mm: Vector3::new(0.0, 0.0, 2000.0),
            }]],
        );
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();
        camera
            .start(Box::new(move |_| {
                seen_clone.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        thread::sleep(Duration::from_millis(100));
        camera.stop();
        assert!(seen.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn test_double_start_rejected() {
        let camera = MockCamera::new(test_info());
        camera.start(Box::new(|_| {})).unwrap();
        assert!(camera.start(Box::new(|_| {})).is_err());
    }

    #[test]
    fn test_camera_ticks_advance() {
        let camera = MockCamera::new(test_info());
        let t0 = camera.timestamp_now();
        thread::sleep(Duration::from_millis(5));
        assert!(camera.timestamp_now() > t0);
    }
}
