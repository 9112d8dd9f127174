//! Pin-assignment conventions for the stepper drivers.
//!
//! Microstep-select lines on a DRV8825 board are often hard-wired instead of
//! driven, so a pin assignment is an `i32` with two sentinels:
//! `-1` = tied low, `-2` = tied high, `>= 0` = a real pin number.

use crate::error::{HardwareError, HwResult};

/// One microstep-select line as assigned in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinSpec {
    /// Driven from a real GPIO pin.
    Gpio(u32),
    /// Hard-wired low.
    Low,
    /// Hard-wired high.
    High,
}

impl PinSpec {
    /// Parse the raw `i32` convention.
    pub fn from_raw(raw: i32) -> HwResult<Self> {
        match raw {
            -1 => Ok(PinSpec::Low),
            -2 => Ok(PinSpec::High),
            n if n >= 0 => Ok(PinSpec::Gpio(n as u32)),
            n => Err(HardwareError::InvalidPin(format!(
                "pin value {n} is neither a pin number nor a wiring sentinel"
            ))),
        }
    }
}

/// Pin assignments for one stepper, as they appear in configuration.
///
/// `step` and `dir` must be real pins. `sleep` and `position` may be `-1`
/// when the line is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepperPins {
    pub step: i32,
    pub dir: i32,
    pub microstep: [i32; 3],
    pub sleep: i32,
    pub position: i32,
}

impl StepperPins {
    pub(crate) fn step_pin(&self) -> HwResult<u32> {
        if self.step < 0 {
            return Err(HardwareError::InvalidPin(
                "stepper step pin must be a real pin".into(),
            ));
        }
        Ok(self.step as u32)
    }

    pub(crate) fn dir_pin(&self) -> HwResult<u32> {
        if self.dir < 0 {
            return Err(HardwareError::InvalidPin(
                "stepper dir pin must be a real pin".into(),
            ));
        }
        Ok(self.dir as u32)
    }

    pub(crate) fn sleep_pin(&self) -> Option<u32> {
        (self.sleep >= 0).then_some(self.sleep as u32)
    }

    pub(crate) fn position_pin(&self) -> Option<u32> {
        (self.position >= 0).then_some(self.position as u32)
    }

    pub(crate) fn microstep_specs(&self) -> HwResult<[PinSpec; 3]> {
        Ok([
            PinSpec::from_raw(self.microstep[0])?,
            PinSpec::from_raw(self.microstep[1])?,
            PinSpec::from_raw(self.microstep[2])?,
        ])
    }
}

/// The set of microstep numbers a given wiring can express.
///
/// Microstep number `m` selects `2^m` subdivisions and is encoded in binary
/// on the three select lines. A line tied low removes every `m` with that
/// bit set; a line tied high removes every `m` with that bit clear.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MicrostepWiring {
    available: Vec<u8>,
}

impl MicrostepWiring {
    pub fn from_specs(specs: &[PinSpec; 3]) -> HwResult<Self> {
        let mut available: Vec<u8> = (0..=5).collect();
        for (bit, spec) in specs.iter().enumerate() {
            let mask = 1u8 << bit;
            match spec {
                PinSpec::Low => available.retain(|m| m & mask == 0),
                PinSpec::High => available.retain(|m| m & mask != 0),
                PinSpec::Gpio(_) => {}
            }
        }
        if available.is_empty() {
            return Err(HardwareError::InvalidPin(
                "microstep wiring leaves no usable microstep number".into(),
            ));
        }
        Ok(Self { available })
    }

    /// Microstep numbers expressible with this wiring, ascending.
    pub fn available(&self) -> &[u8] {
        &self.available
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pin_spec_conventions() {
        assert_eq!(PinSpec::from_raw(-1).unwrap(), PinSpec::Low);
        assert_eq!(PinSpec::from_raw(-2).unwrap(), PinSpec::High);
        assert_eq!(PinSpec::from_raw(17).unwrap(), PinSpec::Gpio(17));
        assert!(PinSpec::from_raw(-3).is_err());
    }

    #[test]
    fn test_all_driven_gives_full_set() {
        let wiring = MicrostepWiring::from_specs(&[
            PinSpec::Gpio(1),
            PinSpec::Gpio(2),
            PinSpec::Gpio(3),
        ])
        .unwrap();
        assert_eq!(wiring.available(), &[0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_low_wired_bit_removes_set_members() {
        // ms0 tied low: only even microstep numbers remain.
        let wiring =
            MicrostepWiring::from_specs(&[PinSpec::Low, PinSpec::Gpio(2), PinSpec::Gpio(3)])
                .unwrap();
        assert_eq!(wiring.available(), &[0, 2, 4]);
    }

    #[test]
    fn test_high_wired_bit_removes_clear_members() {
        // ms1 tied high: m must have bit 1 set.
        let wiring =
            MicrostepWiring::from_specs(&[PinSpec::Gpio(1), PinSpec::High, PinSpec::Gpio(3)])
                .unwrap();
        assert_eq!(wiring.available(), &[2, 3]);
    }

    #[test]
    fn test_contradictory_wiring_rejected() {
        // All three lines tied high would demand m = 7, which does not exist.
        let err = MicrostepWiring::from_specs(&[PinSpec::High, PinSpec::High, PinSpec::High])
            .unwrap_err();
        assert!(matches!(err, HardwareError::InvalidPin(_)));
    }
}
