// 50 Hz drive loop with watchdog
// Each tick: read sensors -> odometry -> pick velocity source (operator or
// trajectory) -> kinematics -> desaturate -> module writes -> publish state.
// The watchdog stops the robot if operator commands go stale.

use std::time::{Duration, Instant};
use tokio::time::interval;
use tracing::{info, warn};

// local imports
use crate::config::{
    CMD_TIMEOUT, DriveConfig, LOOP_HZ, TOPIC_CMD_CANCEL, TOPIC_CMD_DRIVE, TOPIC_CMD_RESET, TOPIC_CMD_TRAJECTORY,
    TOPIC_HEALTH, TOPIC_POSE, TOPIC_RT_MODULES, TRAJECTORY_HEADING_TOLERANCE, TRAJECTORY_POSITION_TOLERANCE,
};
use crate::geometry::{ChassisSpeeds, Pose2d};
use crate::messages::{
    DriveCommand, ModuleSetpoints, PoseTelemetry, ResetCommand, RuntimeHealth, RuntimeStatus, TrajectoryRequest,
};
use crate::ownership::{ClaimError, OwnerTable, Priority};
use crate::sim::{SimPlant, sim_drivetrain};
use crate::swerve::{DriveReport, Drivetrain, HeadingSensor, ModuleActuator, OutputMode};
use crate::trajectory::{HolonomicController, TrajectoryFollower};

/// Control period in seconds
pub const PERIOD: f64 = 1.0 / LOOP_HZ as f64;

// Trajectory requests outrank the operator fallback
const TRAJECTORY_PRIORITY: Priority = 10;

/// Resources arbitrated by the owner table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subsystem {
    Drivetrain,
}

/// Who is in charge of the drivetrain
#[derive(Debug)]
pub enum DriveRequest {
    /// Latest operator command, subject to the watchdog (fallback)
    Teleop,
    FollowTrajectory(Box<ActiveTrajectory>),
}

#[derive(Debug)]
pub struct ActiveTrajectory {
    follower: TrajectoryFollower,
    reset_pose_on_finish: Option<Pose2d>,
}

/// Result of one control cycle
#[derive(Debug)]
pub struct TickOutput {
    pub pose: Pose2d,
    pub report: DriveReport,
    pub status: RuntimeStatus,
}

enum Action {
    Teleop,
    Follow(ChassisSpeeds),
    Finish,
}

pub struct Runtime<A, G> {
    drivetrain: Drivetrain<A, G>,
    owners: OwnerTable<Subsystem, DriveRequest>,
    latest_cmd: Option<DriveCommand>,
    cmd_received_at: f64,
    health: RuntimeHealth,
    halt_pending: bool,
    trajectory_finished: bool,
}

impl<A: ModuleActuator, G: HeadingSensor> Runtime<A, G> {
    pub fn new(drivetrain: Drivetrain<A, G>) -> Self {
        let mut owners = OwnerTable::new();
        owners.register(Subsystem::Drivetrain, DriveRequest::Teleop);
        Self {
            drivetrain,
            owners,
            latest_cmd: None,
            cmd_received_at: f64::NEG_INFINITY,
            health: RuntimeHealth::CmdStale, // Start stale until first cmd
            halt_pending: false,
            trajectory_finished: false,
        }
    }

    pub fn drivetrain(&self) -> &Drivetrain<A, G> {
        &self.drivetrain
    }

    pub fn drivetrain_mut(&mut self) -> &mut Drivetrain<A, G> {
        &mut self.drivetrain
    }

    pub fn health(&self) -> RuntimeHealth {
        self.health
    }

    pub fn trajectory_active(&self) -> bool {
        self.owners.is_claimed(&Subsystem::Drivetrain)
    }

    /// Polled by whoever requested the trajectory to know when it is done
    pub fn trajectory_finished(&self) -> bool {
        self.trajectory_finished
    }

    /// Process incoming operator command
    pub fn on_command(&mut self, cmd: DriveCommand, now: f64) {
        tracing::debug!("Received command: {:?}", &cmd);
        self.latest_cmd = Some(cmd);
        self.cmd_received_at = now;
    }

    /// Start following a trajectory, pre-empting any trajectory in progress
    pub fn on_trajectory(&mut self, request: TrajectoryRequest) -> Result<(), ClaimError<DriveRequest>> {
        let TrajectoryRequest {
            states,
            reset_to_initial_pose,
            reset_pose_on_finish,
        } = request;

        let initial_pose = states.initial_pose();
        let duration = states.duration();
        let controller = HolonomicController::new(states, self.drivetrain.config(), PERIOD);
        let active = ActiveTrajectory {
            follower: TrajectoryFollower::new(controller),
            reset_pose_on_finish,
        };

        let displaced = self.owners.claim(
            &Subsystem::Drivetrain,
            DriveRequest::FollowTrajectory(Box::new(active)),
            TRAJECTORY_PRIORITY,
            true,
        )?;
        if let Some(DriveRequest::FollowTrajectory(_)) = displaced {
            // Zero the outgoing command for one cycle before the new one starts
            info!("Previous trajectory pre-empted, stopping drivetrain");
            self.halt_pending = true;
        }

        if reset_to_initial_pose {
            self.drivetrain.reset_odometry(initial_pose);
        }
        self.trajectory_finished = false;
        info!("Following trajectory ({:.2} s)", duration);
        Ok(())
    }

    /// Cancel the active trajectory; the next tick commands zero speeds
    pub fn cancel_trajectory(&mut self) {
        if self.owners.release(&Subsystem::Drivetrain).is_some() {
            warn!("Trajectory cancelled, stopping drivetrain");
            self.halt_pending = true;
        }
    }

    pub fn on_reset(&mut self, cmd: ResetCommand) {
        match cmd {
            ResetCommand::Heading { offset_degrees } => self.drivetrain.reset(offset_degrees),
            ResetCommand::Odometry { pose } => self.drivetrain.reset_odometry(pose),
        }
    }

    /// Compute operator speeds based on watchdog state
    fn compute_teleop(&mut self, now: f64) -> (ChassisSpeeds, bool) {
        let cmd_age = now - self.cmd_received_at;

        if cmd_age > CMD_TIMEOUT.as_secs_f64() {
            // Watchdog triggered - stop the robot
            if self.health != RuntimeHealth::CmdStale && self.latest_cmd.is_some() {
                warn!("Command stale ({:.3} s old), stopping robot", cmd_age);
            }
            self.health = RuntimeHealth::CmdStale;
            (ChassisSpeeds::zero(), false)
        } else if let Some(ref cmd) = self.latest_cmd {
            self.health = RuntimeHealth::Ok;
            let speeds = ChassisSpeeds::from(cmd).clamp_translation(self.drivetrain.config().max_chassis_speed);
            (speeds, cmd.field_relative)
        } else {
            // No command ever received
            self.health = RuntimeHealth::CmdStale;
            (ChassisSpeeds::zero(), false)
        }
    }

    /// Run one control cycle at monotonic time `now` (seconds)
    pub fn tick(&mut self, now: f64) -> TickOutput {
        // 1. Sensors + odometry, every cycle without exception
        let pose = self.drivetrain.periodic(now);

        // 2. Pick the velocity source
        let action = if self.halt_pending {
            None
        } else {
            Some(match self.owners.active_mut(&Subsystem::Drivetrain) {
                Some(DriveRequest::FollowTrajectory(active)) => {
                    let speeds = active.follower.update(&pose, now);
                    if active.follower.is_finished(now) {
                        Action::Finish
                    } else {
                        Action::Follow(speeds)
                    }
                }
                _ => Action::Teleop,
            })
        };

        // 3. Kinematics, desaturation and module writes
        let report = match action {
            None => {
                self.halt_pending = false;
                self.drivetrain.stop()
            }
            Some(Action::Follow(speeds)) => {
                self.health = RuntimeHealth::Ok;
                self.drivetrain.drive(speeds, false, OutputMode::Velocity)
            }
            Some(Action::Finish) => {
                let report = self.drivetrain.stop();
                self.finish_trajectory();
                report
            }
            Some(Action::Teleop) => {
                let (speeds, field_relative) = self.compute_teleop(now);
                self.drivetrain.drive(speeds, field_relative, OutputMode::PercentOutput)
            }
        };

        if !report.is_ok() {
            self.health = RuntimeHealth::ActuatorFault;
        }

        TickOutput {
            pose: self.drivetrain.pose(),
            report,
            status: RuntimeStatus {
                health: self.health,
                trajectory_active: self.trajectory_active(),
                trajectory_finished: self.trajectory_finished,
            },
        }
    }

    fn finish_trajectory(&mut self) {
        let Some(DriveRequest::FollowTrajectory(active)) = self.owners.release(&Subsystem::Drivetrain) else {
            return;
        };

        let controller = active.follower.controller();
        let trajectory = controller.trajectory();
        let goal = trajectory.sample(trajectory.duration()).pose;
        let pose = self.drivetrain.pose();
        let distance = pose.distance_to(&goal);
        let heading_error = pose.heading_error_to(&goal);

        let at_goal = distance <= TRAJECTORY_POSITION_TOLERANCE && heading_error.abs() <= TRAJECTORY_HEADING_TOLERANCE;
        if at_goal && controller.at_reference(TRAJECTORY_POSITION_TOLERANCE, TRAJECTORY_HEADING_TOLERANCE) {
            info!("Trajectory finished on target");
        } else {
            let error = controller.last_error();
            warn!(
                "Trajectory finished off target: {:.3} m, {:.3} rad from goal (tracking error ({:.3}, {:.3}, {:.3}))",
                distance, heading_error, error.x, error.y, error.heading
            );
        }

        if let Some(pose) = active.reset_pose_on_finish {
            self.drivetrain.reset_odometry(pose);
        }
        self.trajectory_finished = true;
    }
}

pub async fn run(config: DriveConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let sub_drive = session.declare_subscriber(TOPIC_CMD_DRIVE).await?;
    let sub_trajectory = session.declare_subscriber(TOPIC_CMD_TRAJECTORY).await?;
    let sub_reset = session.declare_subscriber(TOPIC_CMD_RESET).await?;
    let sub_cancel = session.declare_subscriber(TOPIC_CMD_CANCEL).await?;
    let pub_pose = session.declare_publisher(TOPIC_POSE).await?;
    let pub_modules = session.declare_publisher(TOPIC_RT_MODULES).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;

    let mut runtime = Runtime::new(sim_drivetrain(config)?);
    let mut tick = interval(Duration::from_millis(1000 / LOOP_HZ));
    let start = Instant::now();

    info!(
        "Runtime started: {}Hz loop, {}ms watchdog timeout (simulated hardware)",
        LOOP_HZ,
        CMD_TIMEOUT.as_millis()
    );
    info!(
        "Subscribed to: {}, {}, {}, {}",
        TOPIC_CMD_DRIVE, TOPIC_CMD_TRAJECTORY, TOPIC_CMD_RESET, TOPIC_CMD_CANCEL
    );
    info!("Publishing to: {}, {}, {}", TOPIC_POSE, TOPIC_RT_MODULES, TOPIC_HEALTH);

    loop {
        tick.tick().await;
        let now = start.elapsed().as_secs_f64();

        // 1. Drain all pending messages (non-blocking), keep latest command
        while let Ok(Some(sample)) = sub_drive.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<DriveCommand>(&payload) {
                Ok(cmd) => runtime.on_command(cmd, now),
                Err(e) => warn!("Failed to parse drive command: {}", e),
            }
        }
        while let Ok(Some(_)) = sub_cancel.try_recv() {
            runtime.cancel_trajectory();
        }
        while let Ok(Some(sample)) = sub_reset.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<ResetCommand>(&payload) {
                Ok(cmd) => runtime.on_reset(cmd),
                Err(e) => warn!("Failed to parse reset command: {}", e),
            }
        }
        while let Ok(Some(sample)) = sub_trajectory.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<TrajectoryRequest>(&payload) {
                Ok(request) => {
                    if let Err(e) = runtime.on_trajectory(request) {
                        warn!("Trajectory rejected: {}", e);
                    }
                }
                Err(e) => warn!("Failed to parse trajectory: {}", e),
            }
        }

        // 2. Run the control cycle (includes watchdog logic)
        let output = runtime.tick(now);

        // 3. Advance the simulated hardware to the next cycle
        SimPlant::step(runtime.drivetrain_mut(), PERIOD);

        // 4. Publish pose, setpoints and health; a failed publish never stops the loop
        let pose_json = serde_json::to_string(&PoseTelemetry {
            timestamp: now,
            pose: output.pose,
        })?;
        if let Err(e) = pub_pose.put(pose_json).await {
            warn!("Failed to publish pose: {}", e);
        }

        let modules_json = serde_json::to_string(&ModuleSetpoints {
            timestamp: now,
            states: output.report.states,
            desaturation: output.report.scale,
            write_errors: output.report.errors.len(),
        })?;
        if let Err(e) = pub_modules.put(modules_json).await {
            warn!("Failed to publish module setpoints: {}", e);
        }

        let health_json = serde_json::to_string(&output.status)?;
        if let Err(e) = pub_health.put(health_json).await {
            warn!("Failed to publish health: {}", e);
        }
    }
}
