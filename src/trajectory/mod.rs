// Trajectory sampling and holonomic trajectory following
//
// Trajectories arrive fully formed (time-indexed pose + velocity samples);
// nothing here generates or loads paths.

pub mod controller;
pub mod profile;
mod sampler;

pub use controller::{HolonomicController, PController, ProfiledHeadingController, TrajectoryFollower};
pub use profile::{Constraints, ProfileState, TrapezoidProfile};
pub use sampler::{Trajectory, TrajectoryError, TrajectoryState};
