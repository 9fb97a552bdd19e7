// Timeouts, topics, calibration table, motor configuration
use std::time::Duration;

use crate::motor::{IdleMode, MotorConfig, PidGains};

// Runtime loop frequency
pub const LOOP_HZ: u64 = 50;

// Drive command timeout for watchdog
pub const CMD_TIMEOUT: Duration = Duration::from_millis(250);

// Hardware limit samples older than this hold both lift limits
pub const LIMIT_TIMEOUT: Duration = Duration::from_millis(250);

// Zenoh topics
pub const TOPIC_CMD_DRIVE: &str = "robot/cmd/drive"; // per-module target states
pub const TOPIC_CMD_LIFT: &str = "robot/cmd/lift"; // lift direction / position
pub const TOPIC_CMD_OPERATOR: &str = "robot/cmd/operator"; // operator actions
pub const TOPIC_LIFT_LIMITS: &str = "robot/state/lift_limits"; // limit switch samples
pub const TOPIC_TELEMETRY: &str = "robot/state/telemetry"; // telemetry snapshot
pub const TOPIC_HEALTH: &str = "robot/state/health"; // health status

// Serial port for the Feetech servo bus
pub const MOTOR_PORT: &str = "/dev/ttyUSB0";

// Enable hardware motor control (set to false for simulation/testing)
pub const MOTOR_ENABLED: bool = false;

/// Number of swerve modules on the drivetrain
pub const MODULE_COUNT: usize = 4;

/// Per-module wiring and calibration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModuleConstants {
    pub drive_motor_id: u8,
    pub angle_motor_id: u8,
    pub encoder_id: u8,
    /// Magnet offset of the absolute sensor (degrees)
    pub angle_offset: f64,
}

impl ModuleConstants {
    pub const fn new(drive_motor_id: u8, angle_motor_id: u8, encoder_id: u8, angle_offset: f64) -> Self {
        Self {
            drive_motor_id,
            angle_motor_id,
            encoder_id,
            angle_offset,
        }
    }
}

/// Front left, front right, back left, back right
///
/// Steering servos sit behind the steering gearbox, so each module reads its
/// heading from a separate sensor servo on the steering shaft.
pub const MODULES: [ModuleConstants; MODULE_COUNT] = [
    ModuleConstants::new(1, 2, 11, 39.99),
    ModuleConstants::new(3, 4, 12, 160.31),
    ModuleConstants::new(5, 6, 13, 271.14),
    ModuleConstants::new(7, 8, 14, 287.22),
];

/// Drivetrain-wide tuning shared by every module
#[derive(Debug, Clone, PartialEq)]
pub struct SwerveConstants {
    /// Maximum module speed (m/s)
    pub max_speed: f64,
    /// Fraction of `max_speed` at or below which angle updates are suppressed
    pub jitter_fraction: f64,
    /// Wait for the absolute sensor to expose its new magnet offset
    pub settle_delay: Duration,

    pub drive_ks: f64,
    pub drive_kv: f64,
    pub drive_ka: f64,

    pub angle_motor: MotorConfig,
    pub drive_motor: MotorConfig,
}

const WHEEL_CIRCUMFERENCE: f64 = 0.1016 * std::f64::consts::PI; // meters
const DRIVE_GEAR_RATIO: f64 = 6.75;
const ANGLE_GEAR_RATIO: f64 = 150.0 / 7.0;

impl Default for SwerveConstants {
    fn default() -> Self {
        let drive_position_factor = WHEEL_CIRCUMFERENCE / DRIVE_GEAR_RATIO;
        Self {
            max_speed: 4.5,
            jitter_fraction: 0.01,
            settle_delay: Duration::from_secs(1),

            drive_ks: 0.667,
            drive_kv: 2.44,
            drive_ka: 0.27,

            angle_motor: MotorConfig {
                current_limit: 20.0,
                inverted: false,
                idle_mode: IdleMode::Coast,
                position_factor: 360.0 / ANGLE_GEAR_RATIO,
                velocity_factor: 360.0 / ANGLE_GEAR_RATIO / 60.0,
                gains: PidGains::new(0.01, 0.0, 0.0, 0.0),
                voltage_compensation: 12.0,
            },
            drive_motor: MotorConfig {
                current_limit: 80.0,
                inverted: false,
                idle_mode: IdleMode::Brake,
                position_factor: drive_position_factor,
                velocity_factor: drive_position_factor / 60.0,
                gains: PidGains::new(0.1, 0.0, 0.0, 0.0),
                voltage_compensation: 12.0,
            },
        }
    }
}

/// Lift mechanism tuning
#[derive(Debug, Clone, PartialEq)]
pub struct LiftConstants {
    pub lift_motor_id: u8,
    /// Duty cycle magnitude used by extend / retract
    pub duty_cycle: f64,
    /// Carriage travel per motor output unit
    pub pulley_ratio: f64,
    pub motor: MotorConfig,
}

impl Default for LiftConstants {
    fn default() -> Self {
        Self {
            lift_motor_id: 10,
            duty_cycle: 0.25,
            pulley_ratio: 0.5,
            motor: MotorConfig {
                current_limit: 40.0,
                inverted: false,
                idle_mode: IdleMode::Brake,
                position_factor: 1.0,
                velocity_factor: 1.0 / 60.0,
                gains: PidGains::new(0.1, 0.0, 0.0, 0.0),
                voltage_compensation: 12.0,
            },
        }
    }
}

/// Operator lift presets (carriage units)
pub const LIFT_PRESETS: [f64; 3] = [4.0, 6.0, 8.0];
