use clap::Parser;
use tracing_subscriber::EnvFilter;

use swerve_lift_runtime::config::{MOTOR_ENABLED, MOTOR_PORT};
use swerve_lift_runtime::runtime::{self, Backend};

/// Swerve drive and lift actuation runtime
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Drive the Feetech servo bus instead of the simulation
    #[arg(long)]
    hardware: bool,

    /// Serial port of the servo bus
    #[arg(long, default_value = MOTOR_PORT)]
    port: String,
}

impl Args {
    fn backend(self) -> Backend {
        if self.hardware || MOTOR_ENABLED {
            Backend::Feetech { port: self.port }
        } else {
            Backend::Simulated
        }
    }
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init(); // installs the subscriber globally

    let args = Args::parse();
    if let Err(e) = runtime::run(args.backend()).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulation_is_default_backend() {
        let args = Args::try_parse_from(["swerve-lift-runtime"]).unwrap();
        assert!(matches!(args.backend(), Backend::Simulated));
    }

    #[test]
    fn test_hardware_flag_selects_servo_bus() {
        let args = Args::try_parse_from(["swerve-lift-runtime", "--hardware", "--port", "/dev/ttyACM0"]).unwrap();
        match args.backend() {
            Backend::Feetech { port } => assert_eq!(port, "/dev/ttyACM0"),
            other => panic!("expected servo bus, got {:?}", other),
        }
    }
}
