// End-to-end actuation scenarios against the simulated backend

use std::time::Duration;

use swerve_lift_runtime::config::{LiftConstants, MODULES, SwerveConstants};
use swerve_lift_runtime::lift::{LinearLift, TravelDirection};
use swerve_lift_runtime::motor::{ControlMode, SharedSwitch, SimAbsoluteEncoder, SimMotor};
use swerve_lift_runtime::swerve::{ModuleState, SimpleMotorFeedforward, SwerveModule, normalize_degrees};

fn swerve_constants() -> SwerveConstants {
    SwerveConstants {
        settle_delay: Duration::ZERO,
        ..SwerveConstants::default()
    }
}

#[test]
fn module_reverses_instead_of_turning_past_quarter() {
    let swerve = swerve_constants();
    let angle_motor = SimMotor::new("angle");
    let drive_motor = SimMotor::new("drive");
    let angle = angle_motor.probe();
    let drive = drive_motor.probe();
    let encoder = SimAbsoluteEncoder::new();
    encoder.set_raw_degrees(10.0 + MODULES[1].angle_offset);

    let mut module = SwerveModule::new(1, &MODULES[1], &swerve, angle_motor, drive_motor, encoder).unwrap();
    assert!((module.internal_angle() - 10.0).abs() < 1e-9);

    module.set_desired_state(ModuleState::new(2.0, 170.0), false);

    let (mode, sent, _) = angle.reference().unwrap();
    assert_eq!(mode, ControlMode::Position);
    assert!((normalize_degrees(sent) - 350.0).abs() < 1e-9);

    let ff = SimpleMotorFeedforward::new(swerve.drive_ks, swerve.drive_kv, swerve.drive_ka);
    assert_eq!(drive.reference(), Some((ControlMode::Velocity, -2.0, ff.calculate(-2.0))));
}

#[test]
fn module_ignores_heading_noise_while_creeping() {
    let swerve = swerve_constants();
    let encoder = SimAbsoluteEncoder::new();
    let mut module = SwerveModule::new(
        0,
        &MODULES[0],
        &swerve,
        SimMotor::new("angle"),
        SimMotor::new("drive"),
        encoder.clone(),
    )
    .unwrap();

    encoder.set_reading(0.0);
    module.reset_to_absolute_north();
    for noise in [3.0, -2.5, 7.0, 1.0, -8.0] {
        module.set_desired_state(ModuleState::new(swerve.max_speed * 0.005, noise), true);
        assert_eq!(module.last_angle(), 0.0);
    }

    module.set_desired_state(ModuleState::new(1.0, 7.0), true);
    assert!((module.last_angle() - 7.0).abs() < 1e-9);
}

#[test]
fn lift_interlock_round_trip() {
    let motor = SimMotor::new("lift");
    let probe = motor.probe();
    let top = SharedSwitch::new();
    let bottom = SharedSwitch::new();
    let mut lift = LinearLift::new(motor, top.clone(), bottom.clone(), &LiftConstants::default()).unwrap();

    lift.extend();
    lift.check_limits();
    assert_eq!(lift.direction(), TravelDirection::Extending);

    top.set(true);
    lift.check_limits();
    assert_eq!(lift.direction(), TravelDirection::Idle);
    assert_eq!(probe.duty_cycle(), Some(0.0));

    lift.retract();
    top.set(false);
    bottom.set(true);
    lift.check_limits();
    assert_eq!(lift.direction(), TravelDirection::Idle);
    assert_eq!(probe.duty_cycle(), Some(0.0));
}
