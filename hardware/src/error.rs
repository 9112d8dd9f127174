use thiserror::Error;

/// Errors raised by the driver layer.
///
/// Construction-time problems (bad pin assignments, a pin claimed twice) are
/// fatal for the object being built. Runtime driver failures carry the name
/// of the operation that failed so logs stay readable.
#[derive(Error, Debug)]
pub enum HardwareError {
    /// A pin assignment that cannot be honoured (e.g. a required pin marked
    /// as hard-wired, or a negative pin number where a real pin is needed).
    #[error("invalid pin assignment: {0}")]
    InvalidPin(String),

    /// The backend has already handed this pin to another driver.
    #[error("pin {pin} is already claimed")]
    PinBusy { pin: u32 },

    /// An underlying GPIO/PWM call returned non-OK.
    #[error("{op} failed: {msg}")]
    Driver { op: &'static str, msg: String },
}

pub type HwResult<T> = Result<T, HardwareError>;
