// Define message types for the runtime

use serde::{Deserialize, Serialize};

use crate::geometry::{ChassisSpeeds, Pose2d};
use crate::swerve::{MODULE_COUNT, ModuleState};
use crate::trajectory::Trajectory;

// Operator velocity command from teleop -> runtime
// Robot-relative unless field_relative is set
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DriveCommand {
    pub vx: f64,    // m/s
    pub vy: f64,    // m/s
    pub omega: f64, // rad/s
    #[serde(default)]
    pub field_relative: bool,
}

// Defines how to get chassis speeds from a borrowed DriveCommand
impl From<&DriveCommand> for ChassisSpeeds {
    fn from(cmd: &DriveCommand) -> Self {
        ChassisSpeeds::new(cmd.vx, cmd.vy, cmd.omega)
    }
}

// Trajectory to follow, supplied fully formed by a path planner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrajectoryRequest {
    pub states: Trajectory,
    // Reset odometry to the trajectory's first pose before starting
    #[serde(default)]
    pub reset_to_initial_pose: bool,
    // Pose to reset odometry to once the trajectory finishes
    #[serde(default)]
    pub reset_pose_on_finish: Option<Pose2d>,
}

// Recalibration requests
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResetCommand {
    // Current facing becomes offset_degrees in the field frame
    Heading { offset_degrees: f64 },
    // Overwrite the pose estimate; robot should be stationary
    Odometry { pose: Pose2d },
}

// Pose estimate published every cycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PoseTelemetry {
    pub timestamp: f64,
    pub pose: Pose2d,
}

// Module setpoints written this cycle (front-left, front-right, back-left, back-right)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleSetpoints {
    pub timestamp: f64,
    pub states: [ModuleState; MODULE_COUNT],
    pub desaturation: f64,
    pub write_errors: usize,
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
    ActuatorFault,
}

/// Runtime status published alongside health
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RuntimeStatus {
    pub health: RuntimeHealth,
    pub trajectory_active: bool,
    pub trajectory_finished: bool,
}
