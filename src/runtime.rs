// 50 Hz control loop with drive and limit-feed watchdogs
//
// Every tick: drain pending commands, drive the modules (or stop them if the
// drive command went stale), poll the lift interlock exactly once, publish
// telemetry. On hardware a silent limit switch feed holds both limits, so
// duty-cycle lift moves stop. Publication problems are logged and never touch
// control.

use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::config::{
    CMD_TIMEOUT, LIMIT_TIMEOUT, LOOP_HZ, LiftConstants, SwerveConstants, TOPIC_CMD_DRIVE, TOPIC_CMD_LIFT, TOPIC_CMD_OPERATOR,
    TOPIC_HEALTH, TOPIC_LIFT_LIMITS, TOPIC_TELEMETRY,
};
use crate::messages::{DriveCommand, LiftCommand, LimitSample, OperatorCommand, RuntimeHealth, Telemetry};
use crate::motor::SimWorld;
use crate::robot::Robot;

/// Hardware the runtime drives
#[derive(Debug, Clone)]
pub enum Backend {
    Simulated,
    Feetech { port: String },
}

pub struct Runtime {
    robot: Robot,
    world: Option<SimWorld>,
    latest_drive: Option<DriveCommand>,
    drive_received_at: Instant,
    limits_received_at: Option<Instant>,
    limits_stale: bool,
    health: RuntimeHealth,
}

impl Runtime {
    pub fn new(robot: Robot, world: Option<SimWorld>) -> Self {
        Self {
            robot,
            world,
            latest_drive: None,
            drive_received_at: Instant::now(),
            limits_received_at: None,
            limits_stale: false,
            health: RuntimeHealth::CmdStale, // Start stale until first cmd
        }
    }

    pub fn robot(&self) -> &Robot {
        &self.robot
    }

    pub fn health(&self) -> RuntimeHealth {
        self.health
    }

    pub fn on_drive_command(&mut self, cmd: DriveCommand) {
        debug!("Received drive command: {:?}", &cmd);
        self.latest_drive = Some(cmd);
        self.drive_received_at = Instant::now();
    }

    /// Lift commands persist until superseded; no watchdog applies
    pub fn on_lift_command(&mut self, cmd: LiftCommand) {
        info!("Received lift command: {:?}", cmd);
        let lift = self.robot.lift_mut();
        match cmd {
            LiftCommand::Extend => lift.extend(),
            LiftCommand::Retract => lift.retract(),
            LiftCommand::Stop => lift.stop(),
            LiftCommand::GoTo { position } => lift.go_to_position(position),
        }
    }

    pub fn on_operator_command(&mut self, cmd: OperatorCommand) {
        info!("Received operator command: {:?}", cmd);
        match cmd {
            OperatorCommand::ResetToNorth => self.robot.reset_to_absolute_north(),
        }
    }

    /// Hardware switch states; the simulation owns them when active
    pub fn on_limit_sample(&mut self, sample: LimitSample) {
        if self.world.is_some() {
            debug!("Ignoring limit sample while simulating");
            return;
        }
        self.robot.set_limits(&sample);
        self.limits_received_at = Some(Instant::now());
    }

    /// Without fresh hardware samples both switches read as pressed
    fn guard_limit_feed(&mut self) {
        if self.world.is_some() {
            return;
        }
        let fresh = self
            .limits_received_at
            .is_some_and(|at| at.elapsed() <= LIMIT_TIMEOUT);
        if fresh {
            if self.limits_stale {
                info!("Lift limit samples resumed");
            }
        } else {
            if !self.limits_stale {
                warn!("Lift limit samples stale, holding both limits");
            }
            self.robot.set_limits(&LimitSample { top: true, bottom: true });
        }
        self.limits_stale = !fresh;
    }

    /// Drive command for this tick, watchdog applied
    fn compute_drive(&mut self) -> DriveCommand {
        let cmd_age = self.drive_received_at.elapsed();

        match &self.latest_drive {
            Some(cmd) if cmd_age <= CMD_TIMEOUT => {
                self.health = RuntimeHealth::Ok;
                cmd.clone()
            }
            Some(_) => {
                // Watchdog triggered - stop the wheels
                if self.health != RuntimeHealth::CmdStale {
                    warn!("Drive command stale ({:?} old), stopping modules", cmd_age);
                }
                self.health = RuntimeHealth::CmdStale;
                DriveCommand::stopped()
            }
            None => {
                self.health = RuntimeHealth::CmdStale;
                DriveCommand::stopped()
            }
        }
    }

    /// One control tick
    pub fn tick(&mut self, dt: Duration) -> Telemetry {
        let drive = self.compute_drive();
        self.robot.set_module_states(&drive.states, drive.open_loop);

        self.guard_limit_feed();
        if self.limits_stale && self.health == RuntimeHealth::Ok {
            self.health = RuntimeHealth::LimitsStale;
        }
        self.robot.periodic();

        if let Some(world) = &self.world {
            world.step(dt.as_secs_f64());
        }

        self.robot.telemetry()
    }
}

fn parse<T: DeserializeOwned>(payload: &[u8], topic: &str) -> Option<T> {
    match serde_json::from_slice::<T>(payload) {
        Ok(msg) => Some(msg),
        Err(e) => {
            warn!("Failed to parse message on {}: {}", topic, e);
            None
        }
    }
}

fn build_runtime(backend: &Backend) -> crate::error::Result<Runtime> {
    let swerve = SwerveConstants::default();
    let lift = LiftConstants::default();
    match backend {
        Backend::Simulated => {
            let (robot, world) = Robot::simulated(&swerve, &lift)?;
            Ok(Runtime::new(robot, Some(world)))
        }
        Backend::Feetech { port } => Ok(Runtime::new(Robot::feetech(port, &swerve, &lift)?, None)),
    }
}

pub async fn run(backend: Backend) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!("Building actuators ({:?})...", backend);
    // Calibration blocks for the settle delay; keep it out of the tick
    let mut runtime = tokio::task::block_in_place(|| build_runtime(&backend))?;

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let sub_drive = session.declare_subscriber(TOPIC_CMD_DRIVE).await?;
    let sub_lift = session.declare_subscriber(TOPIC_CMD_LIFT).await?;
    let sub_operator = session.declare_subscriber(TOPIC_CMD_OPERATOR).await?;
    let sub_limits = session.declare_subscriber(TOPIC_LIFT_LIMITS).await?;
    let pub_telemetry = session.declare_publisher(TOPIC_TELEMETRY).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;

    let period = Duration::from_millis(1000 / LOOP_HZ);
    let mut tick = interval(period);

    info!(
        "Runtime started: {}Hz loop, {}ms drive watchdog, {}ms limit watchdog",
        LOOP_HZ,
        CMD_TIMEOUT.as_millis(),
        LIMIT_TIMEOUT.as_millis()
    );

    loop {
        tick.tick().await;

        // 1. Drain pending messages (non-blocking), keep latest drive command
        while let Ok(Some(sample)) = sub_drive.try_recv() {
            if let Some(cmd) = parse::<DriveCommand>(&sample.payload().to_bytes(), TOPIC_CMD_DRIVE) {
                runtime.on_drive_command(cmd);
            }
        }
        while let Ok(Some(sample)) = sub_lift.try_recv() {
            if let Some(cmd) = parse::<LiftCommand>(&sample.payload().to_bytes(), TOPIC_CMD_LIFT) {
                runtime.on_lift_command(cmd);
            }
        }
        while let Ok(Some(sample)) = sub_operator.try_recv() {
            if let Some(cmd) = parse::<OperatorCommand>(&sample.payload().to_bytes(), TOPIC_CMD_OPERATOR) {
                runtime.on_operator_command(cmd);
            }
        }
        while let Ok(Some(sample)) = sub_limits.try_recv() {
            if let Some(limits) = parse::<LimitSample>(&sample.payload().to_bytes(), TOPIC_LIFT_LIMITS) {
                runtime.on_limit_sample(limits);
            }
        }

        // 2. Actuate
        let telemetry = runtime.tick(period);

        // 3. Publish telemetry and health; failures never stop the loop
        match serde_json::to_string(&telemetry) {
            Ok(json) => {
                if let Err(e) = pub_telemetry.put(json).await {
                    warn!("Failed to publish telemetry: {}", e);
                }
            }
            Err(e) => warn!("Failed to encode telemetry: {}", e),
        }
        match serde_json::to_string(&runtime.health()) {
            Ok(json) => {
                if let Err(e) = pub_health.put(json).await {
                    warn!("Failed to publish health: {}", e);
                }
            }
            Err(e) => warn!("Failed to encode health: {}", e),
        }
    }
}
