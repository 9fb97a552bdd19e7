// Keyboard teleop: W/S drive, A/D steer, R/F speed, I/K lift (hold),
// 1/2/3 lift presets, N reset to north, Q quit
//
// All four modules get the same state (crab steering).
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::{Duration, Instant};
use tracing::info;

use swerve_lift_runtime::config::{
    LIFT_PRESETS, MODULE_COUNT, TOPIC_CMD_DRIVE, TOPIC_CMD_LIFT, TOPIC_CMD_OPERATOR,
};
use swerve_lift_runtime::messages::{DriveCommand, LiftCommand, OperatorCommand};
use swerve_lift_runtime::swerve::{ModuleState, normalize_degrees};

const SPEEDS: [f64; 3] = [0.5, 1.5, 3.0]; // m/s
const STEER_STEP: f64 = 15.0; // degrees per key press
const INPUT_TIMEOUT_MS: u64 = 100; // Release drive / lift after this much time with no input

type Publisher<'a> = zenoh::pubsub::Publisher<'a>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let pub_drive = session.declare_publisher(TOPIC_CMD_DRIVE).await?;
    let pub_lift = session.declare_publisher(TOPIC_CMD_LIFT).await?;
    let pub_operator = session.declare_publisher(TOPIC_CMD_OPERATOR).await?;

    info!("Controls: W/S=drive, A/D=steer, R/F=speed, I/K=lift, 1-3=lift presets, N=reset north, Q=quit");
    info!("Speed: LOW");

    enable_raw_mode()?;
    let result = run_teleop(&pub_drive, &pub_lift, &pub_operator).await;
    disable_raw_mode()?;

    result
}

async fn publish<T: serde::Serialize>(
    publisher: &Publisher<'_>,
    msg: &T,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    publisher.put(serde_json::to_string(msg)?).await?;
    Ok(())
}

async fn run_teleop(
    pub_drive: &Publisher<'_>,
    pub_lift: &Publisher<'_>,
    pub_operator: &Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut speed_idx: usize = 0;

    // Persistent drive state
    let mut speed = 0.0;
    let mut heading = 0.0;
    let mut last_drive_input = Instant::now();

    // Hold-to-run lift
    let mut lift_held = false;
    let mut last_lift_input = Instant::now();

    loop {
        // Poll for key with 20ms timeout (50Hz effective rate)
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;

                match code {
                    KeyCode::Char('w') if pressed => {
                        speed = SPEEDS[speed_idx];
                        last_drive_input = Instant::now();
                    }
                    KeyCode::Char('s') if pressed => {
                        speed = -SPEEDS[speed_idx];
                        last_drive_input = Instant::now();
                    }
                    KeyCode::Char('a') if pressed => {
                        heading = normalize_degrees(heading + STEER_STEP);
                        info!("Heading: {:.0} deg", heading);
                    }
                    KeyCode::Char('d') if pressed => {
                        heading = normalize_degrees(heading - STEER_STEP);
                        info!("Heading: {:.0} deg", heading);
                    }

                    // Speed control
                    KeyCode::Char('r') if pressed => {
                        speed_idx = (speed_idx + 1).min(2);
                        print_speed(speed_idx);
                    }
                    KeyCode::Char('f') if pressed => {
                        speed_idx = speed_idx.saturating_sub(1);
                        print_speed(speed_idx);
                    }

                    // Lift
                    KeyCode::Char('i') if pressed => {
                        if !lift_held {
                            publish(pub_lift, &LiftCommand::Extend).await?;
                        }
                        lift_held = true;
                        last_lift_input = Instant::now();
                    }
                    KeyCode::Char('k') if pressed => {
                        if !lift_held {
                            publish(pub_lift, &LiftCommand::Retract).await?;
                        }
                        lift_held = true;
                        last_lift_input = Instant::now();
                    }
                    KeyCode::Char(c @ '1'..='3') if pressed => {
                        let position = LIFT_PRESETS[c as usize - '1' as usize];
                        info!("Lift to {}", position);
                        publish(pub_lift, &LiftCommand::GoTo { position }).await?;
                    }

                    KeyCode::Char('n') if pressed => {
                        info!("Reset to north");
                        heading = 0.0;
                        publish(pub_operator, &OperatorCommand::ResetToNorth).await?;
                    }

                    // Quit
                    KeyCode::Char('q') | KeyCode::Esc if pressed => break,

                    _ => {}
                }
            }
        }

        // Release drive if no input for INPUT_TIMEOUT_MS
        if last_drive_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS) {
            speed = 0.0;
        }

        // Release lift: stop once the key is no longer held
        if lift_held && last_lift_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS) {
            lift_held = false;
            publish(pub_lift, &LiftCommand::Stop).await?;
        }

        // Always publish drive at ~50Hz
        let cmd = DriveCommand {
            states: [ModuleState::new(speed, heading); MODULE_COUNT],
            open_loop: true,
        };
        publish(pub_drive, &cmd).await?;
    }

    if lift_held {
        publish(pub_lift, &LiftCommand::Stop).await?;
    }
    Ok(())
}

fn print_speed(idx: usize) {
    let label = ["LOW", "MED", "HIGH"][idx];
    info!("Speed: {}", label);
}
