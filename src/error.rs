// Construction-time failures
//
// Per-tick commands never fail at the component boundary. The only fatal
// class is a configuration step that was not confirmed while building a
// component, which aborts startup.

use crate::motor::feetech::FeetechError;

#[derive(Debug, thiserror::Error)]
pub enum ActuatorError {
    #[error("Configuration of {device} rejected: {reason}")]
    ConfigRejected { device: String, reason: String },

    #[error("Servo bus error: {0}")]
    Bus(#[from] FeetechError),

    #[error("Servo bus lock poisoned")]
    BusPoisoned,
}

pub type Result<T> = std::result::Result<T, ActuatorError>;
