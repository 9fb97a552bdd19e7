// Wire message types for the runtime

use serde::{Deserialize, Serialize};

use crate::config::MODULE_COUNT;
use crate::lift::LiftTelemetry;
use crate::swerve::{ModuleState, ModuleTelemetry};

// Per-module targets from the kinematics solver -> runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveCommand {
    pub states: [ModuleState; MODULE_COUNT],
    #[serde(default)]
    pub open_loop: bool,
}

impl DriveCommand {
    /// Zero speed on every module; headings hold through jitter suppression
    pub fn stopped() -> Self {
        Self {
            states: [ModuleState::default(); MODULE_COUNT],
            open_loop: true,
        }
    }
}

// Lift intents from teleop / scripts -> runtime
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum LiftCommand {
    Extend,
    Retract,
    Stop,
    GoTo { position: f64 },
}

// Operator actions -> runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum OperatorCommand {
    /// Recalibrate every module and hold the reference heading
    ResetToNorth,
}

// Limit switch states from the I/O board -> runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitSample {
    pub top: bool,
    pub bottom: bool,
}

/// Telemetry snapshot published every tick
#[derive(Debug, Clone, Serialize)]
pub struct Telemetry {
    pub modules: Vec<ModuleTelemetry>,
    pub lift: LiftTelemetry,
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
    /// Hardware limit switch samples stopped arriving
    LimitsStale,
}
