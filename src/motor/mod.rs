// Hardware capability layer for the actuators
//
// Provides:
// - Motor / absolute encoder / limit switch capability traits
// - Feetech STS serial protocol implementation
// - Feetech-backed motor and absolute encoder handles
// - Simulated hardware for tests and bench runs

mod driver;
pub mod feetech;
pub mod sim;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use driver::{FeetechAbsoluteEncoder, FeetechMotor, SharedBus, STEPS_PER_REVOLUTION};
pub use feetech::{FeetechBus, FeetechError};
pub use sim::{SimAbsoluteEncoder, SimMotor, SimMotorProbe, SimWorld};

/// Closed-loop reference kinds understood by a motor controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlMode {
    Position,
    Velocity,
}

/// Behaviour of the motor when no output is commanded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdleMode {
    Brake,
    Coast,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    pub kff: f64,
}

impl PidGains {
    pub const fn new(kp: f64, ki: f64, kd: f64, kff: f64) -> Self {
        Self { kp, ki, kd, kff }
    }
}

/// One-time motor configuration applied at construction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotorConfig {
    /// Continuous current limit (A)
    pub current_limit: f64,
    pub inverted: bool,
    pub idle_mode: IdleMode,
    /// Encoder position units per motor revolution
    pub position_factor: f64,
    /// Encoder velocity units per motor RPM
    pub velocity_factor: f64,
    pub gains: PidGains,
    /// Nominal bus voltage for output compensation (V)
    pub voltage_compensation: f64,
}

/// Relative encoder snapshot, in configured units
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EncoderReading {
    pub position: f64,
    pub velocity: f64,
}

/// A motor with an integrated controller and relative encoder
pub trait Motor {
    /// Apply configuration; called once while the owning component is built
    fn configure(&mut self, config: &MotorConfig) -> Result<()>;

    /// Open-loop output as a fraction of full scale, clamped to [-1, 1]
    fn set_duty_cycle(&mut self, fraction: f64);

    /// Closed-loop reference with an additive feed-forward term
    fn set_reference(&mut self, mode: ControlMode, value: f64, feed_forward: f64);

    fn encoder(&self) -> EncoderReading;

    /// Overwrite the relative encoder position
    fn set_encoder_position(&mut self, position: f64);
}

/// A sensor whose reading is valid right after power-up
pub trait AbsoluteEncoder {
    /// Bake the magnet offset into the sensor; called once at construction
    fn configure(&mut self, magnet_offset: f64) -> Result<()>;

    fn absolute_degrees(&self) -> f64;
}

pub trait LimitSwitch {
    fn is_triggered(&self) -> bool;
}

impl<T: Motor + ?Sized> Motor for Box<T> {
    fn configure(&mut self, config: &MotorConfig) -> Result<()> {
        (**self).configure(config)
    }

    fn set_duty_cycle(&mut self, fraction: f64) {
        (**self).set_duty_cycle(fraction)
    }

    fn set_reference(&mut self, mode: ControlMode, value: f64, feed_forward: f64) {
        (**self).set_reference(mode, value, feed_forward)
    }

    fn encoder(&self) -> EncoderReading {
        (**self).encoder()
    }

    fn set_encoder_position(&mut self, position: f64) {
        (**self).set_encoder_position(position)
    }
}

impl<T: AbsoluteEncoder + ?Sized> AbsoluteEncoder for Box<T> {
    fn configure(&mut self, magnet_offset: f64) -> Result<()> {
        (**self).configure(magnet_offset)
    }

    fn absolute_degrees(&self) -> f64 {
        (**self).absolute_degrees()
    }
}

/// Latched switch state fed from outside the control loop
///
/// Clones share the same latch: the runtime (or the simulation) writes it,
/// the lift reads it.
#[derive(Debug, Clone, Default)]
pub struct SharedSwitch {
    state: Arc<AtomicBool>,
}

impl SharedSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, triggered: bool) {
        self.state.store(triggered, Ordering::Relaxed);
    }
}

impl LimitSwitch for SharedSwitch {
    fn is_triggered(&self) -> bool {
        self.state.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_switch_clones_share_latch() {
        let switch = SharedSwitch::new();
        let reader = switch.clone();
        assert!(!reader.is_triggered());

        switch.set(true);
        assert!(reader.is_triggered());

        switch.set(false);
        assert!(!reader.is_triggered());
    }

    #[test]
    fn test_boxed_motor_forwards() {
        let motor = SimMotor::new("boxed");
        let probe = motor.probe();
        let mut boxed: Box<dyn Motor> = Box::new(motor);

        boxed.set_reference(ControlMode::Velocity, 1.5, 0.2);
        assert_eq!(probe.reference(), Some((ControlMode::Velocity, 1.5, 0.2)));

        boxed.set_encoder_position(42.0);
        assert_eq!(boxed.encoder().position, 42.0);
    }
}
