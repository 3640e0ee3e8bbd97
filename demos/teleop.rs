// Keyboard teleop: WASD move, Z/X rotate, R/F speed, T field-relative toggle,
// H/B reset heading to 0/180 deg, C cancel trajectory, Q quit
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::{Duration, Instant};
use tracing::info;

use swerve_zenoh_runtime::config::{TOPIC_CMD_CANCEL, TOPIC_CMD_DRIVE, TOPIC_CMD_RESET};
use swerve_zenoh_runtime::messages::{DriveCommand, ResetCommand};

const SPEEDS: [f64; 3] = [0.5, 1.5, 3.0]; // m/s
const OMEGA_SPEEDS: [f64; 3] = [0.5, 1.5, 3.0]; // rad/s
const INPUT_TIMEOUT_MS: u64 = 100; // Reset velocities after this much time with no input

type BoxError = Box<dyn std::error::Error + Send + Sync>;

struct Publishers<'a> {
    drive: zenoh::pubsub::Publisher<'a>,
    reset: zenoh::pubsub::Publisher<'a>,
    cancel: zenoh::pubsub::Publisher<'a>,
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let publishers = Publishers {
        drive: session.declare_publisher(TOPIC_CMD_DRIVE).await?,
        reset: session.declare_publisher(TOPIC_CMD_RESET).await?,
        cancel: session.declare_publisher(TOPIC_CMD_CANCEL).await?,
    };

    info!("Controls: WASD=move, Z/X=rotate, R/F=speed, T=field-relative, H/B=heading 0/180, C=cancel, Q=quit");
    info!("Speed: LOW, field-relative: on");

    enable_raw_mode()?;
    let result = run_teleop(&publishers).await;
    disable_raw_mode()?;

    result
}

async fn run_teleop(publishers: &Publishers<'_>) -> Result<(), BoxError> {
    let mut speed_idx: usize = 0;
    let mut field_relative = true;

    // Persistent velocity state
    let mut vx = 0.0;
    let mut vy = 0.0;
    let mut omega = 0.0;
    let mut last_movement_input = Instant::now();

    loop {
        // Poll for key with 20ms timeout (50Hz effective rate)
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;

                match code {
                    // Movement - update velocity and refresh timestamp
                    KeyCode::Char('w') if pressed => {
                        vx = SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('s') if pressed => {
                        vx = -SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('a') if pressed => {
                        vy = SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('d') if pressed => {
                        vy = -SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }

                    // Rotation
                    KeyCode::Char('z') if pressed => {
                        omega = OMEGA_SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('x') if pressed => {
                        omega = -OMEGA_SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
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

                    KeyCode::Char('t') if kind == KeyEventKind::Press => {
                        field_relative = !field_relative;
                        info!("Field-relative: {}", if field_relative { "on" } else { "off" });
                    }

                    // Heading recalibration, robot should be facing the chosen direction
                    KeyCode::Char('h') if kind == KeyEventKind::Press => {
                        publish_reset(publishers, 0.0).await?;
                    }
                    KeyCode::Char('b') if kind == KeyEventKind::Press => {
                        publish_reset(publishers, 180.0).await?;
                    }

                    KeyCode::Char('c') if kind == KeyEventKind::Press => {
                        info!("Cancelling trajectory");
                        publishers.cancel.put("{}".to_string()).await?;
                    }

                    // Quit
                    KeyCode::Char('q') | KeyCode::Esc if pressed => break,

                    _ => {}
                }
            }
        }

        // Reset velocities if no movement input for INPUT_TIMEOUT_MS
        if last_movement_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS) {
            vx = 0.0;
            vy = 0.0;
            omega = 0.0;
        }

        // Always publish at ~50Hz
        let cmd = DriveCommand {
            vx,
            vy,
            omega,
            field_relative,
        };
        publishers.drive.put(serde_json::to_string(&cmd)?).await?;
    }

    Ok(())
}

async fn publish_reset(publishers: &Publishers<'_>, offset_degrees: f64) -> Result<(), BoxError> {
    info!("Resetting heading to {} deg", offset_degrees);
    let cmd = ResetCommand::Heading { offset_degrees };
    publishers.reset.put(serde_json::to_string(&cmd)?).await?;
    Ok(())
}

fn print_speed(idx: usize) {
    let label = ["LOW", "MED", "HIGH"][idx];
    info!("Speed: {}", label);
}
