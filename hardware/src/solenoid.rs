//! Solenoid valve control.

use tracing::debug;

use crate::error::{HardwareError, HwResult};
use crate::gpio::{DriverBackend, GpioOutput, Level};

/// The water valve: one output pin, powered or not.
///
/// Both power operations are idempotent; the pin is only written on an
/// actual state change.
pub struct Solenoid {
    line: Box<dyn GpioOutput>,
    powered: bool,
}

impl Solenoid {
    /// Claim the valve pin. The valve starts unpowered.
    pub fn new(pin: i32, backend: &mut dyn DriverBackend) -> HwResult<Self> {
        if pin < 0 {
            return Err(HardwareError::InvalidPin(
                "solenoid pin must be a real pin".into(),
            ));
        }
        let line = backend.claim_output(pin as u32)?;
        Ok(Self {
            line,
            powered: false,
        })
    }

    pub fn power_on(&mut self) -> HwResult<()> {
        if !self.powered {
            debug!("solenoid on");
            self.line.write(Level::High)?;
            self.powered = true;
        }
        Ok(())
    }

    pub fn power_off(&mut self) -> HwResult<()> {
        if self.powered {
            debug!("solenoid off");
            self.line.write(Level::Low)?;
            self.powered = false;
        }
        Ok(())
    }

    pub fn is_powered(&self) -> bool {
        self.powered
    }
}
