// Feetech-backed hardware handles
//
// Maps the Motor / AbsoluteEncoder capabilities onto STS servos sharing one
// serial bus. Transport failures during per-tick commands are logged and the
// last good reading is returned, so the control loop keeps running.
//
// The present-position register spans one servo turn. Readings are unwrapped
// into a multi-turn count, which assumes the shaft moves less than half a turn
// between two reads. Position references are sent as relative step-mode moves
// from that count, so geared mechanisms can travel any number of turns.

use std::cell::Cell;
use std::sync::{Arc, Mutex};

use tracing::{debug, info, trace, warn};

use super::feetech::{self, FeetechBus, OperatingMode, Register};
use super::{AbsoluteEncoder, ControlMode, EncoderReading, Motor, MotorConfig};
use crate::error::{ActuatorError, Result};

/// Servo resolution: 4096 steps per revolution
pub const STEPS_PER_REVOLUTION: f64 = 4096.0;

/// Current drawn at 100% torque limit
const RATED_CURRENT_A: f64 = 3.0;

/// Full-scale open-loop output in PWM mode
const PWM_FULL_SCALE: f64 = 1000.0;

const FULL_TURN: i64 = 4096;
const HALF_TURN: i64 = FULL_TURN / 2;

/// Largest relative move a single step-mode write can carry
const MAX_STEP: i64 = i16::MAX as i64;

pub type SharedBus = Arc<Mutex<FeetechBus>>;

fn lock_bus(bus: &SharedBus) -> Result<std::sync::MutexGuard<'_, FeetechBus>> {
    bus.lock().map_err(|_| ActuatorError::BusPoisoned)
}

/// Runs `op` on the bus, logging instead of propagating failures
fn try_on_bus<T>(
    bus: &SharedBus,
    id: u8,
    op: impl FnOnce(&mut FeetechBus) -> feetech::Result<T>,
) -> Option<T> {
    let mut guard = match bus.lock() {
        Ok(guard) => guard,
        Err(_) => {
            warn!("Servo {}: bus lock poisoned", id);
            return None;
        }
    };
    match op(&mut guard) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Servo {}: {}", id, e);
            None
        }
    }
}

fn switch_mode(bus: &mut FeetechBus, id: u8, mode: OperatingMode) -> feetech::Result<()> {
    debug!("Servo {} switching to {:?} mode", id, mode);
    bus.disable_torque(id)?;
    bus.set_operating_mode(id, mode)?;
    bus.enable_torque(id)
}

/// Last raw reading and the multi-turn count it unwrapped to
#[derive(Debug, Clone, Copy)]
struct TurnCount {
    raw: u16,
    steps: i64,
}

/// A servo used as a motor with a relative encoder
pub struct FeetechMotor {
    bus: SharedBus,
    id: u8,
    mode: Option<OperatingMode>,
    sign: f64,
    position_factor: f64,
    velocity_factor: f64,
    /// Servo position registers are read-only, so re-zeroing happens here
    encoder_offset: f64,
    turns: Cell<Option<TurnCount>>,
    last_reading: Cell<EncoderReading>,
}

impl FeetechMotor {
    pub fn new(bus: SharedBus, id: u8) -> Self {
        Self {
            bus,
            id,
            mode: None,
            sign: 1.0,
            position_factor: 1.0,
            velocity_factor: 1.0,
            encoder_offset: 0.0,
            turns: Cell::new(None),
            last_reading: Cell::new(EncoderReading::default()),
        }
    }

    fn steps_to_units(&self, steps: f64) -> f64 {
        self.sign * steps / STEPS_PER_REVOLUTION * self.position_factor
    }

    fn units_to_steps(&self, units: f64) -> f64 {
        self.sign * units / self.position_factor * STEPS_PER_REVOLUTION
    }

    fn steps_per_sec_to_units(&self, steps_per_sec: f64) -> f64 {
        let rpm = steps_per_sec / STEPS_PER_REVOLUTION * 60.0;
        self.sign * rpm * self.velocity_factor
    }

    fn units_to_steps_per_sec(&self, units: f64) -> f64 {
        let rpm = units / self.velocity_factor;
        self.sign * rpm / 60.0 * STEPS_PER_REVOLUTION
    }

    fn unwrap_steps(&self, raw: u16) -> i64 {
        let steps = match self.turns.get() {
            Some(last) => {
                let delta = (i64::from(raw) - i64::from(last.raw) + HALF_TURN).rem_euclid(FULL_TURN) - HALF_TURN;
                last.steps + delta
            }
            None => i64::from(raw),
        };
        self.turns.set(Some(TurnCount { raw, steps }));
        steps
    }

    /// Fresh reading from the servo, `None` if the bus failed
    fn sample(&self) -> Option<EncoderReading> {
        let (raw, steps_per_sec) = try_on_bus(&self.bus, self.id, |bus| {
            Ok((bus.get_position(self.id)?, bus.get_velocity(self.id)?))
        })?;
        let steps = self.unwrap_steps(raw);
        let reading = EncoderReading {
            position: self.steps_to_units(steps as f64) + self.encoder_offset,
            velocity: self.steps_per_sec_to_units(f64::from(steps_per_sec)),
        };
        self.last_reading.set(reading);
        Some(reading)
    }

    /// Issue `write` in `mode`, switching the servo first if needed
    fn command(&mut self, mode: OperatingMode, write: impl FnOnce(&mut FeetechBus, u8) -> feetech::Result<()>) {
        let id = self.id;
        let needs_switch = self.mode != Some(mode);
        let done = try_on_bus(&self.bus, id, |bus| {
            if needs_switch {
                switch_mode(bus, id, mode)?;
            }
            write(bus, id)
        });
        if done.is_some() {
            self.mode = Some(mode);
        } else if needs_switch {
            self.mode = None;
        }
    }
}

impl Motor for FeetechMotor {
    fn configure(&mut self, config: &MotorConfig) -> Result<()> {
        let mut bus = lock_bus(&self.bus)?;
        if !bus.ping(self.id)? {
            return Err(ActuatorError::ConfigRejected {
                device: format!("servo {}", self.id),
                reason: "not responding to ping".to_string(),
            });
        }

        let torque_limit = (config.current_limit / RATED_CURRENT_A * 1000.0)
            .round()
            .clamp(0.0, 1000.0) as u16;

        bus.disable_torque(self.id)?;
        bus.set_torque_limit(self.id, torque_limit)?;
        bus.write_u16(self.id, Register::MaxTorque, torque_limit)?;
        bus.enable_torque(self.id)?;
        drop(bus);

        if config.position_factor == 0.0 || config.velocity_factor == 0.0 {
            return Err(ActuatorError::ConfigRejected {
                device: format!("servo {}", self.id),
                reason: "zero conversion factor".to_string(),
            });
        }

        self.sign = if config.inverted { -1.0 } else { 1.0 };
        self.position_factor = config.position_factor;
        self.velocity_factor = config.velocity_factor;
        self.mode = None;

        // The servo runs its own loop gains; idle behaviour follows torque enable
        debug!(
            "Servo {} configured: torque limit {}, idle {:?}, gains {:?}",
            self.id, torque_limit, config.idle_mode, config.gains
        );
        Ok(())
    }

    fn set_duty_cycle(&mut self, fraction: f64) {
        let output = (self.sign * fraction.clamp(-1.0, 1.0) * PWM_FULL_SCALE).round() as i16;
        self.command(OperatingMode::Pwm, |bus, id| bus.set_pwm(id, output));
    }

    fn set_reference(&mut self, mode: ControlMode, value: f64, feed_forward: f64) {
        if feed_forward != 0.0 {
            trace!("Servo {} has no feed-forward input, dropping {:.3}", self.id, feed_forward);
        }
        match mode {
            ControlMode::Position => {
                // A relative move needs a live position; skip the tick otherwise
                let Some(current) = self.sample().and(self.turns.get()) else {
                    return;
                };
                let target = self.units_to_steps(value - self.encoder_offset).round() as i64;
                let relative = (target - current.steps).clamp(-MAX_STEP, MAX_STEP) as i16;
                self.command(OperatingMode::Step, |bus, id| bus.step(id, relative));
            }
            ControlMode::Velocity => {
                let steps = self
                    .units_to_steps_per_sec(value)
                    .round()
                    .clamp(i16::MIN as f64 + 1.0, i16::MAX as f64) as i16;
                self.command(OperatingMode::Velocity, |bus, id| bus.set_velocity(id, steps));
            }
        }
    }

    fn encoder(&self) -> EncoderReading {
        self.sample().unwrap_or_else(|| self.last_reading.get())
    }

    fn set_encoder_position(&mut self, position: f64) {
        let measured = self.encoder().position - self.encoder_offset;
        self.encoder_offset = position - measured;
        self.last_reading.set(EncoderReading {
            position,
            ..self.last_reading.get()
        });
    }
}

/// The magnetic position sensor inside a servo, read as an absolute angle
pub struct FeetechAbsoluteEncoder {
    bus: SharedBus,
    id: u8,
    last_degrees: Cell<f64>,
}

impl FeetechAbsoluteEncoder {
    pub fn new(bus: SharedBus, id: u8) -> Self {
        Self {
            bus,
            id,
            last_degrees: Cell::new(0.0),
        }
    }
}

impl AbsoluteEncoder for FeetechAbsoluteEncoder {
    fn configure(&mut self, magnet_offset: f64) -> Result<()> {
        let wrapped = (magnet_offset + 180.0).rem_euclid(360.0) - 180.0;
        let steps = (wrapped / 360.0 * STEPS_PER_REVOLUTION).round() as i16;

        let mut bus = lock_bus(&self.bus)?;
        bus.disable_torque(self.id)?;
        bus.set_magnet_offset(self.id, steps)?;
        bus.write_u8(self.id, Register::Lock, 1)?;
        info!("Servo {} magnet offset set to {} steps ({:.2} deg)", self.id, steps, magnet_offset);
        Ok(())
    }

    fn absolute_degrees(&self) -> f64 {
        if let Some(steps) = try_on_bus(&self.bus, self.id, |bus| bus.get_position(self.id)) {
            self.last_degrees.set(f64::from(steps) / STEPS_PER_REVOLUTION * 360.0);
        }
        self.last_degrees.get()
    }
}
