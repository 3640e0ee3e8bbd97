// Holonomic trajectory following
//
// Each cycle the controller samples the trajectory, adds proportional
// position correction to the feedforward velocity on each axis, and steers
// the heading through a profiled controller with continuous input. The sum is
// field-relative and is rotated into the robot frame before it reaches the
// kinematics.

use std::f64::consts::PI;

use tracing::debug;

use super::profile::{Constraints, ProfileState, TrapezoidProfile};
use super::sampler::Trajectory;
use crate::angle::{angle_difference, input_modulus};
use crate::config::DriveConfig;
use crate::geometry::{ChassisSpeeds, Pose2d};

/// Proportional controller for one translational axis
#[derive(Debug, Clone, Copy)]
pub struct PController {
    kp: f64,
}

impl PController {
    pub fn new(kp: f64) -> Self {
        Self { kp }
    }

    pub fn calculate(&self, measurement: f64, setpoint: f64) -> f64 {
        self.kp * (setpoint - measurement)
    }
}

/// Proportional heading controller whose setpoint follows a trapezoidal
/// profile toward the goal
///
/// The input is continuous over [-PI, PI): goal and setpoint are always taken
/// on the short side of the measurement, so an error across the wrap is never
/// overstated.
#[derive(Debug, Clone)]
pub struct ProfiledHeadingController {
    kp: f64,
    profile: TrapezoidProfile,
    period: f64,
    setpoint: Option<ProfileState>,
    position_error: f64,
}

impl ProfiledHeadingController {
    pub fn new(kp: f64, constraints: Constraints, period: f64) -> Self {
        Self {
            kp,
            profile: TrapezoidProfile::new(constraints),
            period,
            setpoint: None,
            position_error: 0.0,
        }
    }

    /// Restart the profile from the measured heading at rest
    pub fn reset(&mut self, measurement: f64) {
        self.setpoint = Some(ProfileState::new(measurement, 0.0));
        self.position_error = 0.0;
    }

    /// Angular velocity command driving `measurement` toward `goal` (radians)
    pub fn calculate(&mut self, measurement: f64, goal: f64) -> f64 {
        let setpoint = self
            .setpoint
            .unwrap_or_else(|| ProfileState::new(measurement, 0.0));

        let goal_position = measurement + input_modulus(goal - measurement, -PI, PI);
        let setpoint_position = measurement + input_modulus(setpoint.position - measurement, -PI, PI);

        let next = self.profile.calculate(
            self.period,
            ProfileState::new(setpoint_position, setpoint.velocity),
            ProfileState::new(goal_position, 0.0),
        );
        self.setpoint = Some(next);

        self.position_error = angle_difference(measurement, next.position);
        self.kp * self.position_error
    }

    /// Heading error to the profiled setpoint from the last `calculate`
    pub fn position_error(&self) -> f64 {
        self.position_error
    }
}

/// Feedforward plus feedback controller for a holonomic base
#[derive(Debug, Clone)]
pub struct HolonomicController {
    trajectory: Trajectory,
    x: PController,
    y: PController,
    heading: ProfiledHeadingController,
    last_error: Pose2d,
}

impl HolonomicController {
    pub fn new(trajectory: Trajectory, config: &DriveConfig, period: f64) -> Self {
        let gains = config.heading;
        Self {
            trajectory,
            x: PController::new(config.x_kp),
            y: PController::new(config.y_kp),
            heading: ProfiledHeadingController::new(
                gains.kp,
                Constraints::new(gains.max_velocity, gains.max_acceleration),
                period,
            ),
            last_error: Pose2d::origin(),
        }
    }

    pub fn trajectory(&self) -> &Trajectory {
        &self.trajectory
    }

    /// Start the heading profile from the robot's current heading
    pub fn reset(&mut self, pose: &Pose2d) {
        self.heading.reset(pose.heading);
        self.last_error = Pose2d::origin();
    }

    /// Corrected field-relative speeds at `t` seconds into the trajectory
    pub fn calculate_field_relative(&mut self, pose: &Pose2d, t: f64) -> ChassisSpeeds {
        let target = self.trajectory.sample(t);

        self.last_error = Pose2d::new(
            target.pose.x - pose.x,
            target.pose.y - pose.y,
            angle_difference(pose.heading, target.pose.heading),
        );

        let vx = target.velocity.vx + self.x.calculate(pose.x, target.pose.x);
        let vy = target.velocity.vy + self.y.calculate(pose.y, target.pose.y);
        let omega = target.velocity.omega + self.heading.calculate(pose.heading, target.pose.heading);

        debug!(
            "Trajectory t={:.2}: error=({:.3}, {:.3}, {:.3}) cmd=({:.3}, {:.3}, {:.3})",
            t, self.last_error.x, self.last_error.y, self.last_error.heading, vx, vy, omega
        );

        ChassisSpeeds::new(vx, vy, omega)
    }

    /// Corrected robot-relative speeds, ready for the kinematics
    pub fn calculate(&mut self, pose: &Pose2d, t: f64) -> ChassisSpeeds {
        let field = self.calculate_field_relative(pose, t);
        ChassisSpeeds::from_field_relative(field, pose.heading)
    }

    /// Finished once the nominal trajectory time has elapsed
    pub fn is_finished(&self, t: f64) -> bool {
        t >= self.trajectory.duration()
    }

    /// Whether the last computed error is within tolerance
    pub fn at_reference(&self, position_tolerance: f64, heading_tolerance: f64) -> bool {
        self.last_error.x.hypot(self.last_error.y) <= position_tolerance
            && self.last_error.heading.abs() <= heading_tolerance
    }

    /// Last (x, y, heading) error, field frame
    pub fn last_error(&self) -> Pose2d {
        self.last_error
    }
}

/// A holonomic controller bound to the time its first cycle ran
#[derive(Debug, Clone)]
pub struct TrajectoryFollower {
    controller: HolonomicController,
    started_at: Option<f64>,
}

impl TrajectoryFollower {
    pub fn new(controller: HolonomicController) -> Self {
        Self {
            controller,
            started_at: None,
        }
    }

    /// Seconds since the first `update`, zero before it
    pub fn elapsed(&self, now: f64) -> f64 {
        self.started_at.map_or(0.0, |start| now - start)
    }

    /// Robot-relative command for this cycle
    pub fn update(&mut self, pose: &Pose2d, now: f64) -> ChassisSpeeds {
        if self.started_at.is_none() {
            self.started_at = Some(now);
            self.controller.reset(pose);
        }
        let t = self.elapsed(now);
        self.controller.calculate(pose, t)
    }

    pub fn is_finished(&self, now: f64) -> bool {
        self.started_at.is_some() && self.controller.is_finished(self.elapsed(now))
    }

    pub fn controller(&self) -> &HolonomicController {
        &self.controller
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trajectory::TrajectoryState;

    const EPS: f64 = 1e-9;
    const PERIOD: f64 = 0.02;

    fn straight() -> Trajectory {
        Trajectory::new(vec![
            TrajectoryState::new(0.0, Pose2d::origin(), ChassisSpeeds::new(1.0, 0.0, 0.0)),
            TrajectoryState::new(2.0, Pose2d::new(2.0, 0.0, 0.0), ChassisSpeeds::new(1.0, 0.0, 0.0)),
        ])
        .unwrap()
    }

    fn config() -> DriveConfig {
        DriveConfig {
            x_kp: 2.0,
            y_kp: 3.0,
            ..DriveConfig::default()
        }
    }

    #[test]
    fn test_on_path_is_pure_feedforward() {
        let mut controller = HolonomicController::new(straight(), &config(), PERIOD);
        let speeds = controller.calculate(&Pose2d::new(1.0, 0.0, 0.0), 1.0);
        assert!((speeds.vx - 1.0).abs() < EPS);
        assert!(speeds.vy.abs() < EPS);
        assert!(speeds.omega.abs() < EPS);
        assert!(controller.at_reference(1e-6, 1e-6));
    }

    #[test]
    fn test_corrects_position_error() {
        let mut controller = HolonomicController::new(straight(), &config(), PERIOD);
        let speeds = controller.calculate_field_relative(&Pose2d::new(0.9, 0.1, 0.0), 1.0);
        // ff 1.0 + 2.0 * 0.1 ; 0 + 3.0 * -0.1
        assert!((speeds.vx - 1.2).abs() < EPS);
        assert!((speeds.vy + 0.3).abs() < EPS);
        assert!(!controller.at_reference(0.05, 0.05));
    }

    #[test]
    fn test_output_is_robot_relative() {
        let mut controller = HolonomicController::new(straight(), &config(), PERIOD);
        // Robot on the path but facing +Y: field +X is robot-right
        let pose = Pose2d::new(1.0, 0.0, PI / 2.0);
        controller.reset(&pose);
        let speeds = controller.calculate(&pose, 1.0);
        assert!(speeds.vx.abs() < 1e-9);
        assert!((speeds.vy + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_heading_error_takes_short_way() {
        let mut heading = ProfiledHeadingController::new(1.0, Constraints::new(100.0, 1e6), PERIOD);
        let current = 179f64.to_radians();
        heading.reset(current);
        let output = heading.calculate(current, (-179f64).to_radians());
        // Setpoint reaches the goal in one step; error is +2 degrees
        assert!(output > 0.0);
        assert!((heading.position_error().to_degrees() - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_heading_rate_is_profiled() {
        let constraints = Constraints::new(1.0, 2.0);
        let mut heading = ProfiledHeadingController::new(1.0, constraints, PERIOD);
        heading.reset(0.0);
        // One period at 2 rad/s^2 from rest moves the setpoint 0.0004 rad
        let output = heading.calculate(0.0, 3.0);
        assert!((output - 0.0004).abs() < 1e-9);
    }

    #[test]
    fn test_finished_after_duration() {
        let controller = HolonomicController::new(straight(), &config(), PERIOD);
        assert!(!controller.is_finished(1.99));
        assert!(controller.is_finished(2.0));
    }

    #[test]
    fn test_empty_trajectory_finishes_immediately() {
        let mut follower = TrajectoryFollower::new(HolonomicController::new(
            Trajectory::default(),
            &config(),
            PERIOD,
        ));
        assert!(!follower.is_finished(5.0));
        follower.update(&Pose2d::origin(), 5.0);
        assert!(follower.is_finished(5.0));
    }

    #[test]
    fn test_follower_time_starts_on_first_update() {
        let mut follower = TrajectoryFollower::new(HolonomicController::new(straight(), &config(), PERIOD));
        follower.update(&Pose2d::origin(), 10.0);
        assert!((follower.elapsed(11.0) - 1.0).abs() < EPS);
        assert!(!follower.is_finished(11.9));
        assert!(follower.is_finished(12.0));
    }
}
