// Pose estimation from module encoders and the heading sensor
//
// Each update solves the least-squares robot-frame twist from the change in
// module distances, takes the rotation from the heading sensor, and integrates
// along the arc. The heading sensor is trusted for rotation; module-derived
// rotation is discarded.

use tracing::{debug, warn};

use super::kinematics::{MODULE_COUNT, ModulePosition, SwerveKinematics};
use crate::angle::angle_difference;
use crate::geometry::Pose2d;

/// Running pose estimate for a swerve base
#[derive(Debug, Clone)]
pub struct SwerveOdometry {
    kinematics: SwerveKinematics,
    pose: Pose2d,
    // Added to the raw sensor heading to get the field heading
    heading_offset: f64,
    previous_heading: f64,
    previous_positions: [ModulePosition; MODULE_COUNT],
    last_timestamp: Option<f64>,
}

impl SwerveOdometry {
    /// Start estimating from `initial_pose` given the current raw sensor values
    pub fn new(
        kinematics: SwerveKinematics,
        sensor_heading: f64,
        positions: [ModulePosition; MODULE_COUNT],
        initial_pose: Pose2d,
    ) -> Self {
        Self {
            kinematics,
            pose: initial_pose,
            heading_offset: initial_pose.heading - sensor_heading,
            previous_heading: sensor_heading,
            previous_positions: positions,
            last_timestamp: None,
        }
    }

    pub fn pose(&self) -> Pose2d {
        self.pose
    }

    /// Integrate one control cycle of motion
    ///
    /// `sensor_heading` is the raw heading sensor value in radians and
    /// `positions` the cumulative module readings. Must be called once per
    /// cycle; a non-increasing timestamp is logged but still integrated so the
    /// update rate stays constant.
    pub fn update(
        &mut self,
        sensor_heading: f64,
        positions: &[ModulePosition; MODULE_COUNT],
        timestamp: f64,
    ) -> Pose2d {
        if let Some(last) = self.last_timestamp {
            if timestamp <= last {
                warn!("Odometry timestamp did not increase ({} -> {})", last, timestamp);
            }
        }
        self.last_timestamp = Some(timestamp);

        let mut deltas = [ModulePosition::default(); MODULE_COUNT];
        for (delta, (now, before)) in deltas
            .iter_mut()
            .zip(positions.iter().zip(self.previous_positions.iter()))
        {
            *delta = ModulePosition::new(now.distance - before.distance, now.angle);
        }

        let mut twist = self.kinematics.to_twist(&deltas);
        twist.dtheta = angle_difference(self.previous_heading, sensor_heading);

        let mut pose = self.pose.exp(&twist);
        pose.heading = sensor_heading + self.heading_offset;

        debug!(
            "Odometry: twist=({:.4}, {:.4}, {:.4}) pose=({:.3}, {:.3}, {:.3})",
            twist.dx, twist.dy, twist.dtheta, pose.x, pose.y, pose.heading
        );

        self.pose = pose;
        self.previous_heading = sensor_heading;
        self.previous_positions = *positions;
        pose
    }

    /// Replace the pose unconditionally
    ///
    /// Later headings continue from `pose.heading`. The caller is responsible
    /// for the robot being stationary when this is called; it is not checked.
    pub fn reset(&mut self, pose: Pose2d) {
        self.heading_offset = pose.heading - self.previous_heading;
        self.pose = pose;
    }

    /// Replace the pose and re-base on fresh sensor values
    pub fn reset_position(
        &mut self,
        pose: Pose2d,
        sensor_heading: f64,
        positions: [ModulePosition; MODULE_COUNT],
    ) {
        self.previous_heading = sensor_heading;
        self.previous_positions = positions;
        self.reset(pose);
    }

    pub fn kinematics(&self) -> &SwerveKinematics {
        &self.kinematics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DriveConfig;
    use crate::geometry::ChassisSpeeds;
    use std::f64::consts::{FRAC_PI_2, PI};

    const EPS: f64 = 1e-9;

    fn odometry_at_origin() -> SwerveOdometry {
        let kinematics = SwerveKinematics::from_config(&DriveConfig::default()).unwrap();
        SwerveOdometry::new(kinematics, 0.0, [ModulePosition::default(); 4], Pose2d::origin())
    }

    #[test]
    fn test_straight_line() {
        let mut odometry = odometry_at_origin();
        let pose = odometry.update(0.0, &[ModulePosition::new(1.0, 0.0); 4], 0.02);

        assert!((pose.x - 1.0).abs() < EPS);
        assert!(pose.y.abs() < EPS);
        assert!(pose.heading.abs() < EPS);
    }

    #[test]
    fn test_field_frame_uses_heading() {
        let kinematics = SwerveKinematics::from_config(&DriveConfig::default()).unwrap();
        let mut odometry =
            SwerveOdometry::new(kinematics, FRAC_PI_2, [ModulePosition::default(); 4], Pose2d::new(0.0, 0.0, FRAC_PI_2));

        // Robot faces +Y; driving robot-forward moves along field +Y
        let pose = odometry.update(FRAC_PI_2, &[ModulePosition::new(0.5, 0.0); 4], 0.02);
        assert!(pose.x.abs() < EPS);
        assert!((pose.y - 0.5).abs() < EPS);
    }

    #[test]
    fn test_accumulates_deltas() {
        let mut odometry = odometry_at_origin();
        odometry.update(0.0, &[ModulePosition::new(0.25, FRAC_PI_2); 4], 0.02);
        let pose = odometry.update(0.0, &[ModulePosition::new(0.75, FRAC_PI_2); 4], 0.04);
        assert!(pose.x.abs() < EPS);
        assert!((pose.y - 0.75).abs() < EPS);
    }

    #[test]
    fn test_heading_comes_from_sensor() {
        let mut odometry = odometry_at_origin();
        // Modules report no rotation but the sensor does
        let pose = odometry.update(0.3, &[ModulePosition::default(); 4], 0.02);
        assert!((pose.heading - 0.3).abs() < EPS);
        assert!(pose.x.abs() < EPS && pose.y.abs() < EPS);
    }

    #[test]
    fn test_rotation_in_place_stays_put() {
        let mut odometry = odometry_at_origin();
        let kinematics = odometry.kinematics().clone();
        let states = kinematics.to_module_states(&ChassisSpeeds::new(0.0, 0.0, PI));

        // Half a second of spinning at PI rad/s
        let positions = states.map(|s| ModulePosition::new(s.speed * 0.5, s.angle));
        let pose = odometry.update(FRAC_PI_2, &positions, 0.5);
        assert!(pose.x.abs() < 1e-9);
        assert!(pose.y.abs() < 1e-9);
        assert!((pose.heading - FRAC_PI_2).abs() < EPS);
    }

    #[test]
    fn test_reset_rebases_heading() {
        let mut odometry = odometry_at_origin();
        odometry.update(0.4, &[ModulePosition::new(1.0, 0.0); 4], 0.02);

        odometry.reset(Pose2d::new(2.0, 3.0, PI));
        assert_eq!(odometry.pose(), Pose2d::new(2.0, 3.0, PI));

        // Sensor unchanged, robot drives 1 m forward facing PI -> -X
        let pose = odometry.update(0.4, &[ModulePosition::new(2.0, 0.0); 4], 0.04);
        assert!((pose.x - 1.0).abs() < 1e-9);
        assert!((pose.y - 3.0).abs() < 1e-9);
        assert!((pose.heading - PI).abs() < EPS);
    }

    #[test]
    fn test_stale_timestamp_still_integrates() {
        let mut odometry = odometry_at_origin();
        odometry.update(0.0, &[ModulePosition::new(0.1, 0.0); 4], 1.0);
        let pose = odometry.update(0.0, &[ModulePosition::new(0.2, 0.0); 4], 1.0);
        assert!((pose.x - 0.2).abs() < EPS);
    }
}
