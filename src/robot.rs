// Actuator groups of the robot, built against one hardware backend

use std::sync::{Arc, Mutex};

use tracing::info;

use crate::config::{LiftConstants, MODULE_COUNT, MODULES, SwerveConstants};
use crate::error::Result;
use crate::lift::LinearLift;
use crate::messages::{LimitSample, Telemetry};
use crate::motor::{
    AbsoluteEncoder, FeetechAbsoluteEncoder, FeetechBus, FeetechMotor, Motor, SharedSwitch, SimAbsoluteEncoder,
    SimMotor, SimWorld,
};
use crate::swerve::{ModuleState, SwerveModule};

pub type DynMotor = Box<dyn Motor>;
pub type DynEncoder = Box<dyn AbsoluteEncoder>;

/// Simulated lift travel between the bottom and top switches (encoder units)
const SIM_LIFT_TRAVEL: (f64, f64) = (0.0, 20.0);
/// Simulated lift speed at full duty (encoder units per second)
const SIM_LIFT_FREE_SPEED: f64 = 40.0;

pub struct Robot {
    modules: Vec<SwerveModule<DynMotor, DynEncoder>>,
    lift: LinearLift<DynMotor, SharedSwitch>,
    top_limit: SharedSwitch,
    bottom_limit: SharedSwitch,
}

impl Robot {
    /// Build every component; blocks while the modules calibrate
    pub fn build(
        mut module_hardware: impl FnMut(usize) -> (DynMotor, DynMotor, DynEncoder),
        lift_motor: DynMotor,
        swerve: &SwerveConstants,
        lift: &LiftConstants,
    ) -> Result<Self> {
        let modules = MODULES
            .iter()
            .enumerate()
            .map(|(index, constants)| {
                let (angle, drive, encoder) = module_hardware(index);
                SwerveModule::new(index, constants, swerve, angle, drive, encoder)
            })
            .collect::<Result<Vec<_>>>()?;

        let top_limit = SharedSwitch::new();
        let bottom_limit = SharedSwitch::new();
        let lift = LinearLift::new(lift_motor, top_limit.clone(), bottom_limit.clone(), lift)?;

        Ok(Self {
            modules,
            lift,
            top_limit,
            bottom_limit,
        })
    }

    /// Servos on one Feetech bus
    pub fn feetech(port: &str, swerve: &SwerveConstants, lift: &LiftConstants) -> Result<Self> {
        info!("Opening servo bus on {}", port);
        let bus = Arc::new(Mutex::new(FeetechBus::open(port)?));

        Self::build(
            |index| {
                let ids = &MODULES[index];
                (
                    Box::new(FeetechMotor::new(Arc::clone(&bus), ids.angle_motor_id)) as DynMotor,
                    Box::new(FeetechMotor::new(Arc::clone(&bus), ids.drive_motor_id)) as DynMotor,
                    Box::new(FeetechAbsoluteEncoder::new(Arc::clone(&bus), ids.encoder_id)) as DynEncoder,
                )
            },
            Box::new(FeetechMotor::new(Arc::clone(&bus), lift.lift_motor_id)),
            swerve,
            lift,
        )
    }

    /// Simulated hardware plus the world that couples it
    pub fn simulated(swerve: &SwerveConstants, lift: &LiftConstants) -> Result<(Self, SimWorld)> {
        let lift_motor = SimMotor::new("lift").with_free_speed(SIM_LIFT_FREE_SPEED);
        let lift_probe = lift_motor.probe();
        let mut parts = Vec::with_capacity(MODULE_COUNT);

        let robot = Self::build(
            |index| {
                let angle = SimMotor::new(&format!("angle {index}"));
                let drive = SimMotor::new(&format!("drive {index}"));
                let encoder = SimAbsoluteEncoder::new();
                parts.push((angle.probe(), encoder.clone(), drive.probe()));
                (Box::new(angle) as DynMotor, Box::new(drive) as DynMotor, Box::new(encoder) as DynEncoder)
            },
            Box::new(lift_motor),
            swerve,
            lift,
        )?;

        let mut world = SimWorld::new(
            lift_probe,
            robot.top_limit.clone(),
            robot.bottom_limit.clone(),
            SIM_LIFT_TRAVEL,
        );
        for (angle, encoder, drive) in parts {
            world.add_module(angle, encoder, drive);
        }
        world.step(0.0);

        Ok((robot, world))
    }

    pub fn modules(&self) -> &[SwerveModule<DynMotor, DynEncoder>] {
        &self.modules
    }

    pub fn lift(&self) -> &LinearLift<DynMotor, SharedSwitch> {
        &self.lift
    }

    pub fn lift_mut(&mut self) -> &mut LinearLift<DynMotor, SharedSwitch> {
        &mut self.lift
    }

    /// One target per module, in module order
    pub fn set_module_states(&mut self, states: &[ModuleState; MODULE_COUNT], open_loop: bool) {
        for (module, state) in self.modules.iter_mut().zip(states) {
            module.set_desired_state(*state, open_loop);
        }
    }

    pub fn reset_to_absolute_north(&mut self) {
        info!("Resetting all modules to north");
        for module in &mut self.modules {
            module.reset_to_absolute_north();
        }
    }

    /// Latch limit switch states reported by the I/O board
    pub fn set_limits(&self, sample: &LimitSample) {
        self.top_limit.set(sample.top);
        self.bottom_limit.set(sample.bottom);
    }

    /// Per-tick interlock poll
    pub fn periodic(&mut self) {
        self.lift.check_limits();
    }

    pub fn telemetry(&self) -> Telemetry {
        Telemetry {
            modules: self.modules.iter().map(SwerveModule::telemetry).collect(),
            lift: self.lift.telemetry(),
        }
    }
}
