//! End-to-end tests: the full control stack against a scripted camera and
//! the mock pin board.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use nalgebra::Vector3;

use hardware::{Level, MockBackend, PositionStepper, RateStepper, Solenoid};
use turret::{
    CameraInfo, ControlParams, Controller, MockCamera, RawUser, SkeletonCamera, TurretConfig,
};

fn camera_info() -> CameraInfo {
    CameraInfo {
        h_fov: 1.0,
        v_fov: 0.8,
        max_depth: 10.0,
        fps: 30.0,
    }
}

fn control_params() -> ControlParams {
    ControlParams {
        water_rate: 10.0,
        air_resistance: 0.0,
        max_yaw_velocity: std::f64::consts::FRAC_PI_2,
        max_yaw_acceleration: std::f64::consts::PI,
        aim_period: None,
        search_yaw_velocity: 0.5,
        camera_offset: Vector3::zeros(),
    }
}

/// Build the mock motor stack on the example pin assignment.
fn build_drivers(backend: &mut MockBackend) -> (RateStepper, PositionStepper, Solenoid) {
    let config = TurretConfig::example();
    let yaw = RateStepper::new(
        config.yaw_stepper.step_size_rad(),
        config.yaw_stepper.min_step_freq,
        &config.yaw_stepper.pins(),
        backend,
    )
    .unwrap();
    let pitch = PositionStepper::new(
        config.pitch_stepper.step_size_rad(),
        config.pitch_stepper.min_step_freq,
        &config.pitch_stepper.pins(),
        backend,
    )
    .unwrap();
    let valve = Solenoid::new(config.solenoid_pin, backend).unwrap();
    (yaw, pitch, valve)
}

#[test]
fn test_tracks_plans_and_fires() {
    let camera = Arc::new(MockCamera::new(camera_info()));
    let mut backend = MockBackend::new();
    let (yaw, pitch, valve) = build_drivers(&mut backend);

    let controller = Controller::new(
        camera.clone() as Arc<dyn SkeletonCamera>,
        yaw,
        pitch,
        valve,
        control_params(),
    )
    .unwrap();

    // A user 30 cm left of centre at 3 m, standing still.
    for _ in 0..15 {
        camera.emit(vec![RawUser {
            id: 1,
            com_mm: Vector3::new(300.0, 0.0, 3000.0),
        }]);
        thread::sleep(Duration::from_millis(33));
    }

    // The valve opened while a target was engaged.
    assert_eq!(backend.pin(5).level, Level::High);

    // Frame accounting: every emit was a detected frame.
    assert_eq!(controller.tracker().global_frame_id(), 15);
    assert_eq!(controller.tracker().detected_frame_id(), 15);

    let plan = controller.snapshot_plan();
    let params = control_params();

    // The plan always ends with a search segment.
    assert!(plan.last().unwrap().is_search());

    // Every planned rate respects the velocity limit, and consecutive
    // forecast periods respect the acceleration limit.
    let aim_period = Duration::from_secs_f64(1.0 / camera_info().fps);
    let accel_bound =
        params.max_yaw_acceleration * aim_period.as_secs_f64() * (1.0 + 1e-6);
    for m in &plan {
        if !m.is_search() {
            assert!(
                m.yaw_rate.abs() <= params.max_yaw_velocity * (1.0 + 1e-6),
                "rate {} over limit",
                m.yaw_rate
            );
        }
    }
    for pair in plan.windows(2) {
        if pair[0].duration == aim_period && pair[1].duration == aim_period {
            assert!(
                (pair[1].yaw_rate - pair[0].yaw_rate).abs() <= accel_bound,
                "acceleration violated: {} -> {}",
                pair[0].yaw_rate,
                pair[1].yaw_rate
            );
        }
    }

    drop(controller);
    // After shutdown the turret is parked: no pulses, valve closed.
    assert!(!backend.pwm(18).enabled);
    assert_eq!(backend.pin(5).level, Level::Low);
}

#[test]
fn test_idle_without_detections() {
    let camera = Arc::new(MockCamera::new(camera_info()));
    let mut backend = MockBackend::new();
    let (yaw, pitch, valve) = build_drivers(&mut backend);

    let controller = Controller::new(
        camera.clone() as Arc<dyn SkeletonCamera>,
        yaw,
        pitch,
        valve,
        control_params(),
    )
    .unwrap();

    // Frames keep coming but nobody is in them.
    for _ in 0..5 {
        camera.emit(vec![]);
        thread::sleep(Duration::from_millis(20));
    }

    assert_eq!(controller.tracker().global_frame_id(), 5);
    assert_eq!(controller.tracker().detected_frame_id(), 0);

    // No target was ever engaged: bootstrap plan intact, valve shut,
    // motors unprogrammed.
    assert_eq!(controller.snapshot_plan().len(), 2);
    assert_eq!(backend.pin(5).level, Level::Low);
    assert!(!backend.pwm(18).enabled);
}

#[test]
fn test_lost_target_falls_back_to_search() {
    let camera = Arc::new(MockCamera::new(camera_info()));
    let mut backend = MockBackend::new();
    let (yaw, pitch, valve) = build_drivers(&mut backend);

    let controller = Controller::new(
        camera.clone() as Arc<dyn SkeletonCamera>,
        yaw,
        pitch,
        valve,
        control_params(),
    )
    .unwrap();

    for _ in 0..6 {
        camera.emit(vec![RawUser {
            id: 1,
            com_mm: Vector3::new(500.0, 0.0, 2500.0),
        }]);
        thread::sleep(Duration::from_millis(33));
    }
    assert_eq!(backend.pin(5).level, Level::High);

    // The user vanishes; the forecast runs out and the plan's search
    // segment takes over, closing the valve.
    thread::sleep(Duration::from_millis(1500));
    let movement = controller.current_movement();
    assert!(movement.is_search(), "expected search, got {movement:?}");
    assert_eq!(backend.pin(5).level, Level::Low);
    // The search segment slews at the configured speed.
    assert_eq!(movement.yaw_rate.abs(), 0.5);
}

#[test]
fn test_wait_current_movement_sees_boundaries() {
    let camera = Arc::new(MockCamera::new(camera_info()));
    let mut backend = MockBackend::new();
    let (yaw, pitch, valve) = build_drivers(&mut backend);

    let controller = Arc::new(
        Controller::new(
            camera.clone() as Arc<dyn SkeletonCamera>,
            yaw,
            pitch,
            valve,
            control_params(),
        )
        .unwrap(),
    );

    let waiter = {
        let controller = controller.clone();
        thread::spawn(move || controller.wait_current_movement(Some(Duration::from_secs(2))))
    };

    thread::sleep(Duration::from_millis(50));
    camera.emit(vec![RawUser {
        id: 1,
        com_mm: Vector3::new(200.0, 0.0, 3000.0),
    }]);

    let movement = waiter.join().unwrap().expect("movement boundary observed");
    assert!(!movement.is_search());
}

#[test]
fn test_invalid_params_rejected() {
    let camera = Arc::new(MockCamera::new(camera_info()));
    let mut backend = MockBackend::new();
    let (yaw, pitch, valve) = build_drivers(&mut backend);

    let mut params = control_params();
    params.water_rate = 0.0;
    let err = Controller::new(
        camera as Arc<dyn SkeletonCamera>,
        yaw,
        pitch,
        valve,
        params,
    )
    .unwrap_err();
    assert!(matches!(err, turret::TurretError::Config(_)));
}
