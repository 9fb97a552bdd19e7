// Actuation layer for a swerve-drive robot with a linear lift
//
// - `swerve`: per-wheel steer/drive closed-loop control and calibration
// - `lift`: lift direction/position commands with limit-switch interlock
// - `motor`: hardware capability traits with Feetech and simulated backends
// - `runtime`: fixed-rate loop wiring the components to zenoh topics

pub mod config;
pub mod error;
pub mod lift;
pub mod messages;
pub mod motor;
pub mod robot;
pub mod runtime;
pub mod swerve;
