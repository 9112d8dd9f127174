//! Driver layer for the water turret.
//!
//! Everything that touches a physical pin lives here, behind the narrow
//! [`DriverBackend`] surface so the control stack can run against the mock
//! board in tests and dry runs:
//!
//! - [`stepper::RateStepper`]: yaw axis, continuous velocity via a PWM step
//!   output with adaptive microstepping.
//! - [`stepper::PositionStepper`]: pitch axis, software-timed pulse trains
//!   driving the motor to an absolute angle over a requested duration.
//! - [`solenoid::Solenoid`]: the water valve, a plain on/off output.
//!
//! Both steppers assume a DRV8825-style driver chip: STEP/DIR inputs, three
//! microstep-select lines, and an active-high sleep line.

pub mod error;
pub mod gpio;
pub mod pins;
pub mod solenoid;
pub mod stepper;

pub use error::{HardwareError, HwResult};
pub use gpio::{DriverBackend, GpioInput, GpioOutput, Level, MockBackend, Pull, PwmOutput};
pub use pins::{MicrostepWiring, PinSpec, StepperPins};
pub use solenoid::Solenoid;
pub use stepper::{choose_microstep_number, microstep_size, PositionStepper, RateStepper};
