// Swerve module control
//
// Provides:
// - Module state types and the <=90° rotation optimization
// - Drive feed-forward model
// - The per-wheel steer/drive controller

mod feedforward;
mod module;
pub mod state;

pub use feedforward::SimpleMotorFeedforward;
pub use module::{ModuleTelemetry, SwerveModule};
pub use state::{ModulePosition, ModuleState, angular_delta, normalize_degrees, optimize};
