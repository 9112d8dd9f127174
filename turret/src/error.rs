use thiserror::Error;

/// Errors surfaced by the turret control stack.
///
/// The taxonomy is deliberately narrow: configuration problems and failed
/// driver/SDK calls abort construction; everything else (unreachable
/// targets, infeasible plans, dropped frames) is handled in-band and never
/// becomes an error value.
#[derive(Error, Debug)]
pub enum TurretError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("camera error: {0}")]
    Camera(String),

    #[error(transparent)]
    Hardware(#[from] hardware::HardwareError),
}

pub type Result<T> = std::result::Result<T, TurretError>;
