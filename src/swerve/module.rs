// One steerable, independently driven wheel

use std::thread::sleep;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, trace};

use super::feedforward::SimpleMotorFeedforward;
use super::state::{ModulePosition, ModuleState, optimize};
use crate::config::{ModuleConstants, SwerveConstants};
use crate::error::Result;
use crate::motor::{AbsoluteEncoder, ControlMode, Motor};

/// Calibration readings published every tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ModuleTelemetry {
    pub index: usize,
    pub absolute_degrees: f64,
    pub angle_offset: f64,
    /// Absolute reading with the configured offset removed a second time
    pub corrected_degrees: f64,
    pub integrated_degrees: f64,
    pub last_angle: f64,
    pub speed: f64,
}

/// Closed-loop steer/drive controller for one swerve wheel
///
/// Owns the absolute sensor and both motors. The angle motor's relative
/// encoder is synchronized to the absolute sensor at construction and on
/// operator demand; `last_angle` is the reference for jitter suppression.
pub struct SwerveModule<M, E> {
    index: usize,
    angle_offset: f64,
    last_angle: f64,

    angle_motor: M,
    drive_motor: M,
    absolute_encoder: E,

    feedforward: SimpleMotorFeedforward,
    max_speed: f64,
    jitter_fraction: f64,
    settle_delay: Duration,
}

impl<M: Motor, E: AbsoluteEncoder> SwerveModule<M, E> {
    /// Configure the hardware and synchronize the angle encoder
    ///
    /// Blocks for the settle delay; call only at startup.
    pub fn new(
        index: usize,
        constants: &ModuleConstants,
        swerve: &SwerveConstants,
        angle_motor: M,
        drive_motor: M,
        absolute_encoder: E,
    ) -> Result<Self> {
        let mut module = Self {
            index,
            angle_offset: constants.angle_offset,
            last_angle: 0.0,
            angle_motor,
            drive_motor,
            absolute_encoder,
            feedforward: SimpleMotorFeedforward::new(swerve.drive_ks, swerve.drive_kv, swerve.drive_ka),
            max_speed: swerve.max_speed,
            jitter_fraction: swerve.jitter_fraction,
            settle_delay: swerve.settle_delay,
        };

        module.absolute_encoder.configure(module.angle_offset)?;
        module.angle_motor.configure(&swerve.angle_motor)?;
        module.drive_motor.configure(&swerve.drive_motor)?;
        module.drive_motor.set_encoder_position(0.0);

        module.reset_to_absolute(false);
        module.last_angle = module.state().angle;

        info!("Module {} ready at {:.2} deg", index, module.last_angle);
        Ok(module)
    }

    /// Angle most recently sent to the angle controller
    pub fn last_angle(&self) -> f64 {
        self.last_angle
    }

    /// Copy the absolute sensor reading into the angle motor's encoder
    ///
    /// Unless `quick`, first sleeps for the settle delay so a freshly
    /// written magnet offset is visible. The offset is already applied by
    /// the sensor and is not subtracted here.
    pub fn reset_to_absolute(&mut self, quick: bool) {
        if !quick {
            sleep(self.settle_delay);
        }
        let absolute = self.absolute_encoder.absolute_degrees();
        info!(
            "Module {} absolute {:.2} deg, offset {:.2} deg",
            self.index, absolute, self.angle_offset
        );
        self.angle_motor.set_encoder_position(absolute);
    }

    /// Recalibrate and hold the reference heading (0°)
    pub fn reset_to_absolute_north(&mut self) {
        self.reset_to_absolute(true);
        self.angle_motor.set_reference(ControlMode::Position, 0.0, 0.0);
        self.last_angle = 0.0;
    }

    pub fn set_desired_state(&mut self, desired: ModuleState, open_loop: bool) {
        self.set_desired_state_with_jitter_check(desired, open_loop, true);
    }

    /// Like [`set_desired_state`](Self::set_desired_state); `jitter_check =
    /// false` forces the angle through at any speed
    pub fn set_desired_state_with_jitter_check(&mut self, desired: ModuleState, open_loop: bool, jitter_check: bool) {
        let optimized = optimize(desired, self.internal_angle());
        trace!(
            "Module {} desired {:?} -> optimized {:?}",
            self.index, desired, optimized
        );
        self.set_angle(&optimized, jitter_check);
        self.set_speed(&optimized, open_loop);
    }

    fn set_angle(&mut self, state: &ModuleState, jitter_check: bool) {
        let creeping = state.speed.abs() <= self.max_speed * self.jitter_fraction;
        let angle = if jitter_check && creeping {
            self.last_angle
        } else {
            state.angle
        };

        self.angle_motor.set_reference(ControlMode::Position, angle, 0.0);
        self.last_angle = angle;
    }

    fn set_speed(&mut self, state: &ModuleState, open_loop: bool) {
        if open_loop {
            let percent_output = state.speed / self.max_speed;
            self.drive_motor.set_duty_cycle(percent_output);
        } else {
            let feed_forward = self.feedforward.calculate(state.speed);
            debug!(
                "Module {} velocity {:.3} m/s, feed-forward {:.3}",
                self.index, state.speed, feed_forward
            );
            self.drive_motor
                .set_reference(ControlMode::Velocity, state.speed, feed_forward);
        }
    }

    /// Relative angle encoder position (degrees)
    pub fn internal_angle(&self) -> f64 {
        self.angle_motor.encoder().position
    }

    pub fn absolute_angle(&self) -> f64 {
        self.absolute_encoder.absolute_degrees()
    }

    pub fn state(&self) -> ModuleState {
        ModuleState::new(self.drive_motor.encoder().velocity, self.internal_angle())
    }

    pub fn position(&self) -> ModulePosition {
        ModulePosition {
            distance: self.drive_motor.encoder().position,
            angle: self.absolute_angle(),
        }
    }

    pub fn telemetry(&self) -> ModuleTelemetry {
        let absolute = self.absolute_angle();
        ModuleTelemetry {
            index: self.index,
            absolute_degrees: absolute,
            angle_offset: self.angle_offset,
            corrected_degrees: absolute - self.angle_offset,
            integrated_degrees: self.internal_angle(),
            last_angle: self.last_angle,
            speed: self.drive_motor.encoder().velocity,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::config::MODULES;
    use crate::error::ActuatorError;
    use crate::motor::{EncoderReading, SimAbsoluteEncoder, SimMotor, SimMotorProbe};

    struct Rig {
        module: SwerveModule<SimMotor, SimAbsoluteEncoder>,
        angle: SimMotorProbe,
        drive: SimMotorProbe,
        encoder: SimAbsoluteEncoder,
    }

    fn constants() -> SwerveConstants {
        SwerveConstants {
            settle_delay: Duration::ZERO,
            ..SwerveConstants::default()
        }
    }

    fn rig_at(absolute_degrees: f64) -> Rig {
        let angle_motor = SimMotor::new("angle");
        let drive_motor = SimMotor::new("drive");
        let encoder = SimAbsoluteEncoder::new();
        encoder.set_raw_degrees(absolute_degrees + MODULES[0].angle_offset);

        let angle = angle_motor.probe();
        let drive = drive_motor.probe();
        let module = SwerveModule::new(0, &MODULES[0], &constants(), angle_motor, drive_motor, encoder.clone()).unwrap();
        Rig {
            module,
            angle,
            drive,
            encoder,
        }
    }

    fn sent_angle(probe: &SimMotorProbe) -> f64 {
        match probe.reference() {
            Some((ControlMode::Position, angle, _)) => angle,
            other => panic!("expected a position reference, got {other:?}"),
        }
    }

    #[test]
    fn test_construction_configures_and_calibrates() {
        let rig = rig_at(37.5);
        assert_eq!(rig.encoder.magnet_offset(), Some(MODULES[0].angle_offset));
        assert!(rig.angle.config().is_some());
        assert!(rig.drive.config().is_some());
        assert!((rig.module.internal_angle() - 37.5).abs() < 1e-9);
        assert!((rig.module.last_angle() - 37.5).abs() < 1e-9);
        assert_eq!(rig.drive.reading().position, 0.0);
    }

    #[test]
    fn test_construction_fails_on_rejected_config() {
        let result = SwerveModule::new(
            2,
            &MODULES[2],
            &constants(),
            SimMotor::new("angle"),
            SimMotor::new("drive").rejecting_config(),
            SimAbsoluteEncoder::new(),
        );
        assert!(matches!(result, Err(ActuatorError::ConfigRejected { .. })));
    }

    #[test]
    fn test_reset_to_absolute_matches_sensor() {
        let mut rig = rig_at(0.0);
        rig.encoder.set_reading(123.4);
        rig.module.reset_to_absolute(true);
        assert!((rig.module.internal_angle() - rig.module.absolute_angle()).abs() < 1e-9);
        assert!((rig.module.internal_angle() - 123.4).abs() < 1e-9);
    }

    #[test]
    fn test_reset_to_absolute_waits_for_settle() {
        let mut rig = rig_at(0.0);
        rig.module.settle_delay = Duration::from_millis(30);

        let started = Instant::now();
        rig.module.reset_to_absolute(false);
        assert!(started.elapsed() >= Duration::from_millis(30));

        let started = Instant::now();
        rig.module.reset_to_absolute(true);
        assert!(started.elapsed() < Duration::from_millis(30));
    }

    #[test]
    fn test_reset_to_north_holds_zero() {
        let mut rig = rig_at(80.0);
        rig.module.set_desired_state(ModuleState::new(2.0, 60.0), false);
        rig.encoder.set_reading(61.0);

        rig.module.reset_to_absolute_north();
        assert_eq!(sent_angle(&rig.angle), 0.0);
        assert_eq!(rig.module.last_angle(), 0.0);
    }

    #[test]
    fn test_flip_scenario_closed_loop() {
        let mut rig = rig_at(10.0);
        rig.module.set_desired_state(ModuleState::new(2.0, 170.0), false);

        let angle = sent_angle(&rig.angle);
        assert!((angle - -10.0).abs() < 1e-9);
        assert_eq!(rig.module.last_angle(), angle);

        let ff = SimpleMotorFeedforward::new(0.667, 2.44, 0.27).calculate(-2.0);
        assert_eq!(rig.drive.reference(), Some((ControlMode::Velocity, -2.0, ff)));
    }

    #[test]
    fn test_open_loop_sends_fraction_of_max_speed() {
        let mut rig = rig_at(0.0);
        rig.module.set_desired_state(ModuleState::new(2.25, 0.0), true);
        assert_eq!(rig.drive.duty_cycle(), Some(0.5));
        assert_eq!(rig.drive.reference(), None);
    }

    #[test]
    fn test_low_speed_keeps_previous_angle() {
        let mut rig = rig_at(0.0);
        rig.module.set_desired_state(ModuleState::new(1.0, 30.0), false);
        assert!((rig.module.last_angle() - 30.0).abs() < 1e-9);

        // below 1% of 4.5 m/s
        for target in [75.0, -60.0, 12.0, 89.0] {
            rig.module.set_desired_state(ModuleState::new(0.04, target), false);
            assert!((sent_angle(&rig.angle) - 30.0).abs() < 1e-9);
            assert!((rig.module.last_angle() - 30.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_low_speed_still_drives() {
        let mut rig = rig_at(0.0);
        rig.module.set_desired_state(ModuleState::new(0.01, 45.0), true);
        assert!((rig.drive.duty_cycle().unwrap() - 0.01 / 4.5).abs() < 1e-12);
    }

    #[test]
    fn test_jitter_check_bypass() {
        let mut rig = rig_at(0.0);
        rig.module
            .set_desired_state_with_jitter_check(ModuleState::new(0.0, 45.0), false, false);
        assert!((sent_angle(&rig.angle) - 45.0).abs() < 1e-9);
        assert!((rig.module.last_angle() - 45.0).abs() < 1e-9);
    }

    #[test]
    fn test_state_and_position() {
        let rig = rig_at(15.0);
        rig.drive.set_reading(EncoderReading {
            position: 3.2,
            velocity: 1.1,
        });
        assert_eq!(rig.module.state(), ModuleState::new(1.1, rig.module.internal_angle()));

        let position = rig.module.position();
        assert_eq!(position.distance, 3.2);
        assert!((position.angle - 15.0).abs() < 1e-9);

        let telemetry = rig.module.telemetry();
        assert_eq!(telemetry.index, 0);
        assert_eq!(telemetry.angle_offset, MODULES[0].angle_offset);
        assert!((telemetry.corrected_degrees - (15.0 - MODULES[0].angle_offset)).abs() < 1e-9);
    }
}
