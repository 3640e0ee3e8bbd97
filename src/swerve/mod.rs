// Swerve drive core for a four-module base
//
// Provides:
// - Module kinematics (chassis speeds <-> module states, least-squares inverse)
// - Per-module control with steering optimisation
// - Odometry from module encoders and the heading sensor
// - The drivetrain that ties them to the actuator traits

pub mod actuator;
mod drivetrain;
pub mod kinematics;
pub mod module;
pub mod odometry;

pub use actuator::{HeadingSensor, ModuleActuator, OutputMode};
pub use drivetrain::{DriveReport, Drivetrain};
pub use kinematics::{MODULE_COUNT, MODULE_NAMES, ModulePosition, ModuleState, SwerveKinematics};
pub use module::{SwerveModule, optimize};
pub use odometry::SwerveOdometry;
