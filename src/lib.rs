// Swerve drive motion-control core
//
// Kinematics, per-module control, odometry and trajectory following for a
// four-module swerve base, hosted by a fixed-rate zenoh runtime.

pub mod angle;
pub mod config;
pub mod error;
pub mod geometry;
pub mod messages;
pub mod ownership;
pub mod runtime;
pub mod sim;
pub mod swerve;
pub mod trajectory;

pub use error::DriveError;
pub use geometry::{ChassisSpeeds, Pose2d, Twist2d};
