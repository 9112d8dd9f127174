//! The consumed GPIO/PWM driver surface, plus the mock board used by tests.
//!
//! Drivers never talk to a pin-numbering library directly; they claim pins
//! from a [`DriverBackend`] and hold the returned trait objects. Each claimed
//! handle is owned by exactly one driver and programmed from exactly one
//! thread, so the traits take `&mut self` and require only `Send`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::{HardwareError, HwResult};

/// Logic level on a digital pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high {
            Level::High
        } else {
            Level::Low
        }
    }
}

/// Pull resistor configuration for input pins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pull {
    Up,
    Down,
}

/// An output pin claimed from the backend.
pub trait GpioOutput: Send {
    fn write(&mut self, level: Level) -> HwResult<()>;
}

impl std::fmt::Debug for dyn GpioOutput + '_ {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("dyn GpioOutput").finish_non_exhaustive()
    }
}

/// An input pin claimed from the backend.
pub trait GpioInput: Send {
    fn read(&mut self) -> HwResult<Level>;
}

/// A hardware-PWM-capable pin claimed from the backend.
///
/// Used for the yaw stepper's STEP line: the period is the full pulse
/// period in seconds and the duty cycle is a fraction in `[0, 1]`.
pub trait PwmOutput: Send {
    fn set_period(&mut self, seconds: f64) -> HwResult<()>;
    fn set_duty(&mut self, fraction: f64) -> HwResult<()>;
    fn enable(&mut self, on: bool) -> HwResult<()>;
}

/// Factory for pin handles.
///
/// A backend claims each pin at most once; claiming configures the pin
/// (outputs are driven low, PWM outputs are disabled at 50% duty) so drivers
/// start from a known state.
pub trait DriverBackend {
    fn claim_output(&mut self, pin: u32) -> HwResult<Box<dyn GpioOutput>>;
    fn claim_input(&mut self, pin: u32, pull: Pull) -> HwResult<Box<dyn GpioInput>>;
    fn claim_pwm(&mut self, pin: u32) -> HwResult<Box<dyn PwmOutput>>;
}

/// Snapshot of a mock digital pin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PinRecord {
    pub level: Level,
    /// Rising edges seen on the pin since claim. For a STEP line this is the
    /// number of pulses emitted.
    pub rising_edges: u64,
    pub pull: Option<Pull>,
}

impl Default for PinRecord {
    fn default() -> Self {
        Self {
            level: Level::Low,
            rising_edges: 0,
            pull: None,
        }
    }
}

/// Snapshot of a mock PWM pin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PwmRecord {
    pub period: f64,
    pub duty: f64,
    pub enabled: bool,
}

impl Default for PwmRecord {
    fn default() -> Self {
        Self {
            period: 0.0,
            duty: 0.5,
            enabled: false,
        }
    }
}

type SharedPin = Arc<Mutex<PinRecord>>;
type SharedPwm = Arc<Mutex<PwmRecord>>;

#[derive(Default)]
struct MockBoard {
    pins: HashMap<u32, SharedPin>,
    pwms: HashMap<u32, SharedPwm>,
    claimed: Vec<u32>,
}

/// An in-memory board: every claim succeeds, every write is recorded.
///
/// The backend is cheaply cloneable; clones share the same board state, so a
/// test can keep one handle for inspection while the drivers own the claimed
/// pins. Input pin levels are set from the outside with
/// [`set_input_level`](MockBackend::set_input_level).
#[derive(Clone, Default)]
pub struct MockBackend {
    board: Arc<Mutex<MockBoard>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the state of a digital pin. Panics if the pin was never
    /// claimed; a test asking about an unclaimed pin is a test bug.
    pub fn pin(&self, pin: u32) -> PinRecord {
        let board = self.board.lock().unwrap();
        let record = *board
            .pins
            .get(&pin)
            .unwrap_or_else(|| panic!("pin {pin} was never claimed"))
            .lock()
            .unwrap();
        record
    }

    /// Snapshot the state of a PWM pin. Panics if the pin was never claimed.
    pub fn pwm(&self, pin: u32) -> PwmRecord {
        let board = self.board.lock().unwrap();
        let record = *board
            .pwms
            .get(&pin)
            .unwrap_or_else(|| panic!("pwm pin {pin} was never claimed"))
            .lock()
            .unwrap();
        record
    }

    /// Drive the level seen by a claimed input pin (e.g. a homing switch).
    pub fn set_input_level(&self, pin: u32, level: Level) {
        let board = self.board.lock().unwrap();
        if let Some(rec) = board.pins.get(&pin) {
            rec.lock().unwrap().level = level;
        }
    }

    fn pin_entry(&self, pin: u32) -> HwResult<SharedPin> {
        let mut board = self.board.lock().unwrap();
        if board.claimed.contains(&pin) {
            return Err(HardwareError::PinBusy { pin });
        }
        board.claimed.push(pin);
        Ok(board.pins.entry(pin).or_default().clone())
    }
}

struct MockPin {
    record: SharedPin,
}

impl GpioOutput for MockPin {
    fn write(&mut self, level: Level) -> HwResult<()> {
        let mut rec = self.record.lock().unwrap();
        if rec.level == Level::Low && level == Level::High {
            rec.rising_edges += 1;
        }
        rec.level = level;
        Ok(())
    }
}

impl GpioInput for MockPin {
    fn read(&mut self) -> HwResult<Level> {
        Ok(self.record.lock().unwrap().level)
    }
}

struct MockPwm {
    record: SharedPwm,
}

impl PwmOutput for MockPwm {
    fn set_period(&mut self, seconds: f64) -> HwResult<()> {
        self.record.lock().unwrap().period = seconds;
        Ok(())
    }

    fn set_duty(&mut self, fraction: f64) -> HwResult<()> {
        self.record.lock().unwrap().duty = fraction;
        Ok(())
    }

    fn enable(&mut self, on: bool) -> HwResult<()> {
        self.record.lock().unwrap().enabled = on;
        Ok(())
    }
}

impl DriverBackend for MockBackend {
    fn claim_output(&mut self, pin: u32) -> HwResult<Box<dyn GpioOutput>> {
        let record = self.pin_entry(pin)?;
        record.lock().unwrap().level = Level::Low;
        Ok(Box::new(MockPin { record }))
    }

    fn claim_input(&mut self, pin: u32, pull: Pull) -> HwResult<Box<dyn GpioInput>> {
        let record = self.pin_entry(pin)?;
        record.lock().unwrap().pull = Some(pull);
        Ok(Box::new(MockPin { record }))
    }

    fn claim_pwm(&mut self, pin: u32) -> HwResult<Box<dyn PwmOutput>> {
        let mut board = self.board.lock().unwrap();
        if board.claimed.contains(&pin) {
            return Err(HardwareError::PinBusy { pin });
        }
        board.claimed.push(pin);
        let record = board.pwms.entry(pin).or_default().clone();
        Ok(Box::new(MockPwm { record }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_records_levels_and_edges() {
        let mut backend = MockBackend::new();
        let mut out = backend.claim_output(4).unwrap();

        out.write(Level::High).unwrap();
        out.write(Level::High).unwrap();
        out.write(Level::Low).unwrap();
        out.write(Level::High).unwrap();

        let rec = backend.pin(4);
        assert_eq!(rec.level, Level::High);
        assert_eq!(rec.rising_edges, 2);
    }

    #[test]
    fn test_double_claim_rejected() {
        let mut backend = MockBackend::new();
        backend.claim_output(7).unwrap();
        let err = backend.claim_output(7).unwrap_err();
        assert!(matches!(err, HardwareError::PinBusy { pin: 7 }));
    }

    #[test]
    fn test_input_level_driven_externally() {
        let mut backend = MockBackend::new();
        let mut input = backend.claim_input(12, Pull::Up).unwrap();

        assert_eq!(input.read().unwrap(), Level::Low);
        backend.set_input_level(12, Level::High);
        assert_eq!(input.read().unwrap(), Level::High);
        assert_eq!(backend.pin(12).pull, Some(Pull::Up));
    }

    #[test]
    fn test_pwm_records_programming() {
        let mut backend = MockBackend::new();
        let mut pwm = backend.claim_pwm(18).unwrap();

        pwm.set_period(0.002).unwrap();
        pwm.set_duty(0.5).unwrap();
        pwm.enable(true).unwrap();

        let rec = backend.pwm(18);
        assert!((rec.period - 0.002).abs() < 1e-12);
        assert!(rec.enabled);
    }
}
