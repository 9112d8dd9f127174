//! On-disk runtime configuration.
//!
//! A single JSON document carries every construction parameter: ballistic
//! constants, yaw limits, the aim period, the camera offset, per-stepper
//! pin assignments, and the solenoid pin. The library only ever consumes
//! the parsed struct; loading and validation happen at the edge.

use std::fs;
use std::path::Path;
use std::time::Duration;

use hardware::StepperPins;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::controller::ControlParams;
use crate::error::{Result, TurretError};

fn absent_pin() -> i32 {
    -1
}

/// One stepper's drive parameters and pin assignment.
///
/// Pin conventions follow the driver layer: `-1` = hard-wired low, `-2` =
/// hard-wired high, `>= 0` = a real pin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepperConfig {
    /// Whole-step size, degrees (e.g. 1.8 for a 200-step motor).
    pub step_size_deg: f64,
    /// Minimum pulse rate before microstepping increases, Hz.
    pub min_step_freq: f64,
    pub step_pin: i32,
    pub dir_pin: i32,
    pub microstep_pins: [i32; 3],
    #[serde(default = "absent_pin")]
    pub sleep_pin: i32,
    #[serde(default = "absent_pin")]
    pub position_pin: i32,
}

impl StepperConfig {
    pub fn step_size_rad(&self) -> f64 {
        self.step_size_deg.to_radians()
    }

    pub fn pins(&self) -> StepperPins {
        StepperPins {
            step: self.step_pin,
            dir: self.dir_pin,
            microstep: self.microstep_pins,
            sleep: self.sleep_pin,
            position: self.position_pin,
        }
    }
}

/// Complete turret configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurretConfig {
    /// Muzzle speed, m/s.
    pub water_rate: f64,
    /// Horizontal water deceleration, m/s².
    #[serde(default)]
    pub air_resistance: f64,
    /// Yaw limits, rad/s and rad/s².
    pub max_yaw_velocity: f64,
    pub max_yaw_acceleration: f64,
    /// Aim period in seconds; 0 means one camera frame period.
    #[serde(default)]
    pub aim_period_secs: f64,
    /// Search slew speed, rad/s (magnitude).
    pub search_yaw_velocity: f64,
    /// Camera position relative to the turret origin, metres.
    #[serde(default)]
    pub camera_offset: [f64; 3],
    pub yaw_stepper: StepperConfig,
    pub pitch_stepper: StepperConfig,
    pub solenoid_pin: i32,
}

impl TurretConfig {
    /// Load and validate a JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            TurretError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: TurretConfig = serde_json::from_str(&text)
            .map_err(|e| TurretError::Config(format!("cannot parse {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.water_rate <= 0.0 {
            return Err(TurretError::Config("water_rate must be positive".into()));
        }
        if self.air_resistance < 0.0 {
            return Err(TurretError::Config("air_resistance cannot be negative".into()));
        }
        if self.max_yaw_velocity <= 0.0 || self.max_yaw_acceleration <= 0.0 {
            return Err(TurretError::Config("yaw limits must be positive".into()));
        }
        if self.aim_period_secs < 0.0 {
            return Err(TurretError::Config("aim_period_secs cannot be negative".into()));
        }
        if self.search_yaw_velocity < 0.0 {
            return Err(TurretError::Config(
                "search_yaw_velocity is a magnitude and cannot be negative".into(),
            ));
        }
        for (name, stepper) in [("yaw", &self.yaw_stepper), ("pitch", &self.pitch_stepper)] {
            if stepper.step_size_deg <= 0.0 || stepper.min_step_freq <= 0.0 {
                return Err(TurretError::Config(format!(
                    "{name} stepper step size and frequency must be positive"
                )));
            }
        }
        Ok(())
    }

    pub fn control_params(&self) -> ControlParams {
        ControlParams {
            water_rate: self.water_rate,
            air_resistance: self.air_resistance,
            max_yaw_velocity: self.max_yaw_velocity,
            max_yaw_acceleration: self.max_yaw_acceleration,
            aim_period: (self.aim_period_secs > 0.0)
                .then(|| Duration::from_secs_f64(self.aim_period_secs)),
            search_yaw_velocity: self.search_yaw_velocity,
            camera_offset: Vector3::from(self.camera_offset),
        }
    }

    /// A plausible bench configuration, used by the dry-run harness when no
    /// file is given.
    pub fn example() -> Self {
        Self {
            water_rate: 10.0,
            air_resistance: 0.5,
            max_yaw_velocity: std::f64::consts::FRAC_PI_2,
            max_yaw_acceleration: std::f64::consts::PI,
            aim_period_secs: 0.0,
            search_yaw_velocity: std::f64::consts::FRAC_PI_4,
            camera_offset: [0.0, 0.0, 0.0],
            yaw_stepper: StepperConfig {
                step_size_deg: 1.8,
                min_step_freq: 1000.0,
                step_pin: 18,
                dir_pin: 23,
                microstep_pins: [24, 25, 8],
                sleep_pin: 7,
                position_pin: -1,
            },
            pitch_stepper: StepperConfig {
                step_size_deg: 0.9,
                min_step_freq: 1000.0,
                step_pin: 12,
                dir_pin: 16,
                microstep_pins: [20, 21, 26],
                sleep_pin: 19,
                position_pin: 13,
            },
            solenoid_pin: 5,
        }
    }
}
