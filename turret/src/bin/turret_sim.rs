//! Dry-run harness: the full control stack against a scripted camera and
//! the mock pin board.
//!
//! A simulated walker crosses the field of view; the controller tracks,
//! plans, and "fires". Useful for eyeballing planner behaviour and log
//! output without a turret on the desk.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use nalgebra::Vector3;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hardware::{MockBackend, PositionStepper, RateStepper, Solenoid};
use turret::{CameraInfo, Controller, MockCamera, RawUser, TurretConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Run the turret against a simulated walker")]
struct Args {
    /// JSON configuration file; built-in bench defaults when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// How long to run, seconds.
    #[arg(short, long, default_value = "5.0")]
    duration: f64,

    /// Walker lateral speed, mm per frame.
    #[arg(long, default_value = "40.0")]
    walker_speed: f64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => TurretConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => TurretConfig::example(),
    };

    let info = CameraInfo {
        h_fov: 1.023,
        v_fov: 0.796,
        max_depth: 10.0,
        fps: 30.0,
    };
    // A walker crossing left to right at 3.5 m, over and over.
    let frames: Vec<Vec<RawUser>> = (0..120)
        .map(|i| {
            vec![RawUser {
                id: 1,
                com_mm: Vector3::new(-1500.0 + args.walker_speed * i as f64, 200.0, 3500.0),
            }]
        })
        .collect();
    let camera = Arc::new(MockCamera::scripted(info, frames));

    let mut backend = MockBackend::new();
    let yaw = RateStepper::new(
        config.yaw_stepper.step_size_rad(),
        config.yaw_stepper.min_step_freq,
        &config.yaw_stepper.pins(),
        &mut backend,
    )?;
    let pitch = PositionStepper::new(
        config.pitch_stepper.step_size_rad(),
        config.pitch_stepper.min_step_freq,
        &config.pitch_stepper.pins(),
        &mut backend,
    )?;
    let valve = Solenoid::new(config.solenoid_pin, &mut backend)?;

    let controller = Controller::new(camera, yaw, pitch, valve, config.control_params())?;

    let deadline = std::time::Instant::now() + Duration::from_secs_f64(args.duration);
    while std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(500));
        let movement = controller.current_movement();
        let users = controller.tracker().users();
        let step_pwm = backend.pwm(config.yaw_stepper.step_pin as u32);
        let valve_open = backend.pin(config.solenoid_pin as u32).level == hardware::Level::High;
        info!(
            "tracking {} users: yaw rate {:.3} rad/s, pitch {:.3} rad, step pwm {}, valve {}",
            users.len(),
            movement.yaw_rate,
            movement.ending_pitch,
            if step_pwm.enabled { "on" } else { "off" },
            if valve_open { "open" } else { "shut" }
        );
    }

    let plan = controller.snapshot_plan();
    info!(
        "run complete: {} plan segments, {} camera frames",
        plan.len(),
        controller.tracker().global_frame_id()
    );
    drop(controller);
    Ok(())
}
