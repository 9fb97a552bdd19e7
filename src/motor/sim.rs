// Simulated hardware for tests and bench runs
//
// Motors track their references ideally: position mode jumps to the
// reference, velocity mode runs at the reference, duty cycle runs at
// `duty * free_speed`. Probes share state with the handle they came from so
// a test can inspect a motor after the component took ownership of it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{AbsoluteEncoder, ControlMode, EncoderReading, Motor, MotorConfig, SharedSwitch};
use crate::error::{ActuatorError, Result};

/// Last output applied to a simulated motor
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimOutput {
    Idle,
    DutyCycle(f64),
    Reference {
        mode: ControlMode,
        value: f64,
        feed_forward: f64,
    },
}

#[derive(Debug)]
struct SimMotorState {
    name: String,
    config: Option<MotorConfig>,
    reject_config: bool,
    output: SimOutput,
    free_speed: f64,
    reading: EncoderReading,
    commands: usize,
}

fn lock<T>(state: &Mutex<T>) -> MutexGuard<'_, T> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct SimMotor {
    state: Arc<Mutex<SimMotorState>>,
}

impl SimMotor {
    pub fn new(name: &str) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimMotorState {
                name: name.to_string(),
                config: None,
                reject_config: false,
                output: SimOutput::Idle,
                free_speed: 1.0,
                reading: EncoderReading::default(),
                commands: 0,
            })),
        }
    }

    /// Speed reached at full duty cycle, in encoder units per second
    pub fn with_free_speed(self, free_speed: f64) -> Self {
        lock(&self.state).free_speed = free_speed;
        self
    }

    /// Makes `configure` fail, as a controller that never acknowledges would
    pub fn rejecting_config(self) -> Self {
        lock(&self.state).reject_config = true;
        self
    }

    pub fn probe(&self) -> SimMotorProbe {
        SimMotorProbe {
            state: Arc::clone(&self.state),
        }
    }
}

impl Motor for SimMotor {
    fn configure(&mut self, config: &MotorConfig) -> Result<()> {
        let mut state = lock(&self.state);
        if state.reject_config {
            return Err(ActuatorError::ConfigRejected {
                device: state.name.clone(),
                reason: "controller did not acknowledge".to_string(),
            });
        }
        state.config = Some(config.clone());
        Ok(())
    }

    fn set_duty_cycle(&mut self, fraction: f64) {
        let mut state = lock(&self.state);
        let fraction = fraction.clamp(-1.0, 1.0);
        state.output = SimOutput::DutyCycle(fraction);
        state.reading.velocity = fraction * state.free_speed;
        state.commands += 1;
    }

    fn set_reference(&mut self, mode: ControlMode, value: f64, feed_forward: f64) {
        let mut state = lock(&self.state);
        state.output = SimOutput::Reference {
            mode,
            value,
            feed_forward,
        };
        match mode {
            ControlMode::Position => {
                state.reading.position = value;
                state.reading.velocity = 0.0;
            }
            ControlMode::Velocity => state.reading.velocity = value,
        }
        state.commands += 1;
    }

    fn encoder(&self) -> EncoderReading {
        lock(&self.state).reading
    }

    fn set_encoder_position(&mut self, position: f64) {
        lock(&self.state).reading.position = position;
    }
}

/// Shared view of a [`SimMotor`]
#[derive(Debug, Clone)]
pub struct SimMotorProbe {
    state: Arc<Mutex<SimMotorState>>,
}

impl SimMotorProbe {
    pub fn output(&self) -> SimOutput {
        lock(&self.state).output
    }

    pub fn duty_cycle(&self) -> Option<f64> {
        match self.output() {
            SimOutput::DutyCycle(fraction) => Some(fraction),
            _ => None,
        }
    }

    /// (mode, value, feed_forward) of the last closed-loop command
    pub fn reference(&self) -> Option<(ControlMode, f64, f64)> {
        match self.output() {
            SimOutput::Reference {
                mode,
                value,
                feed_forward,
            } => Some((mode, value, feed_forward)),
            _ => None,
        }
    }

    pub fn config(&self) -> Option<MotorConfig> {
        lock(&self.state).config.clone()
    }

    pub fn reading(&self) -> EncoderReading {
        lock(&self.state).reading
    }

    pub fn set_reading(&self, reading: EncoderReading) {
        lock(&self.state).reading = reading;
    }

    /// Number of output commands received so far
    pub fn command_count(&self) -> usize {
        lock(&self.state).commands
    }

    /// Integrate position over `dt` seconds
    pub fn advance(&self, dt: f64) {
        let mut state = lock(&self.state);
        let holding = matches!(
            state.output,
            SimOutput::Reference {
                mode: ControlMode::Position,
                ..
            }
        );
        if !holding {
            state.reading.position += state.reading.velocity * dt;
        }
    }
}

#[derive(Debug, Default)]
struct SimEncoderState {
    /// Mechanical magnet angle before the offset
    raw_degrees: f64,
    magnet_offset: f64,
    configured: bool,
}

/// Absolute sensor reading `(raw - magnet_offset) mod 360`
#[derive(Debug, Clone, Default)]
pub struct SimAbsoluteEncoder {
    state: Arc<Mutex<SimEncoderState>>,
}

impl SimAbsoluteEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_raw_degrees(&self, raw: f64) {
        lock(&self.state).raw_degrees = raw;
    }

    /// Place the magnet so the sensor reports `degrees`
    pub fn set_reading(&self, degrees: f64) {
        let mut state = lock(&self.state);
        state.raw_degrees = degrees + state.magnet_offset;
    }

    pub fn magnet_offset(&self) -> Option<f64> {
        let state = lock(&self.state);
        state.configured.then_some(state.magnet_offset)
    }
}

impl AbsoluteEncoder for SimAbsoluteEncoder {
    fn configure(&mut self, magnet_offset: f64) -> Result<()> {
        let mut state = lock(&self.state);
        state.magnet_offset = magnet_offset;
        state.configured = true;
        Ok(())
    }

    fn absolute_degrees(&self) -> f64 {
        let state = lock(&self.state);
        (state.raw_degrees - state.magnet_offset).rem_euclid(360.0)
    }
}

/// Mechanical coupling between the simulated devices of a whole robot
pub struct SimWorld {
    steering: Vec<(SimMotorProbe, SimAbsoluteEncoder)>,
    drives: Vec<SimMotorProbe>,
    lift: SimMotorProbe,
    top_limit: SharedSwitch,
    bottom_limit: SharedSwitch,
    /// Lift encoder positions at which the bottom / top switches close
    lift_travel: (f64, f64),
}

impl SimWorld {
    pub fn new(
        lift: SimMotorProbe,
        top_limit: SharedSwitch,
        bottom_limit: SharedSwitch,
        lift_travel: (f64, f64),
    ) -> Self {
        Self {
            steering: Vec::new(),
            drives: Vec::new(),
            lift,
            top_limit,
            bottom_limit,
            lift_travel,
        }
    }

    pub fn add_module(&mut self, angle: SimMotorProbe, encoder: SimAbsoluteEncoder, drive: SimMotorProbe) {
        self.steering.push((angle, encoder));
        self.drives.push(drive);
    }

    pub fn lift_position(&self) -> f64 {
        self.lift.reading().position
    }

    pub fn step(&self, dt: f64) {
        for (angle, encoder) in &self.steering {
            angle.advance(dt);
            encoder.set_reading(angle.reading().position);
        }
        for drive in &self.drives {
            drive.advance(dt);
        }

        self.lift.advance(dt);
        let (bottom, top) = self.lift_travel;
        let position = self.lift_position();
        self.top_limit.set(position >= top);
        self.bottom_limit.set(position <= bottom);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motor::LimitSwitch;

    #[test]
    fn test_duty_cycle_integrates_position() {
        let motor = SimMotor::new("lift").with_free_speed(10.0);
        let probe = motor.probe();
        let mut motor = motor;

        motor.set_duty_cycle(0.5);
        probe.advance(0.1);
        assert!((probe.reading().position - 0.5).abs() < 1e-9);

        motor.set_duty_cycle(3.0);
        assert_eq!(probe.duty_cycle(), Some(1.0));
    }

    #[test]
    fn test_position_reference_holds() {
        let mut motor = SimMotor::new("angle");
        let probe = motor.probe();

        motor.set_reference(ControlMode::Position, 45.0, 0.0);
        probe.advance(1.0);
        assert_eq!(motor.encoder().position, 45.0);
    }

    #[test]
    fn test_absolute_encoder_applies_offset() {
        let mut encoder = SimAbsoluteEncoder::new();
        encoder.set_raw_degrees(100.0);
        encoder.configure(30.0).unwrap();
        assert!((encoder.absolute_degrees() - 70.0).abs() < 1e-9);

        encoder.set_raw_degrees(10.0);
        assert!((encoder.absolute_degrees() - 340.0).abs() < 1e-9);
        assert_eq!(encoder.magnet_offset(), Some(30.0));
    }

    #[test]
    fn test_world_raises_lift_limits() {
        let lift = SimMotor::new("lift").with_free_speed(4.0);
        let probe = lift.probe();
        let mut lift = lift;
        let top = SharedSwitch::new();
        let bottom = SharedSwitch::new();
        let world = SimWorld::new(probe, top.clone(), bottom.clone(), (0.0, 1.0));

        world.step(0.0);
        assert!(bottom.is_triggered());

        lift.set_duty_cycle(1.0);
        for _ in 0..13 {
            world.step(0.02);
        }
        assert!(top.is_triggered());
        assert!(!bottom.is_triggered());
    }
}
