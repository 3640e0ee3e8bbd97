// Swerve kinematics for a four-module base
// Converts chassis velocities into per-module (speed, angle) pairs and solves
// the over-determined inverse for odometry.

use nalgebra::{Matrix3, SMatrix, SVector, Vector2};
use serde::{Deserialize, Serialize};

use crate::angle::wrap_angle;
use crate::config::DriveConfig;
use crate::error::{DriveError, Result};
use crate::geometry::{ChassisSpeeds, Twist2d};

/// Number of swerve modules on the base
pub const MODULE_COUNT: usize = 4;

/// Module names in configuration order
pub const MODULE_NAMES: [&str; MODULE_COUNT] = ["front_left", "front_right", "back_left", "back_right"];

// Rows 2i and 2i+1 map chassis (vx, vy, omega) to module i's (x, y) velocity
type InverseMatrix = SMatrix<f64, 8, 3>;
type ForwardMatrix = SMatrix<f64, 3, 8>;

/// Commanded or measured velocity of one module
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleState {
    pub speed: f64, // m/s, signed
    pub angle: f64, // rad, wrapped to (-PI, PI]
}

impl ModuleState {
    pub fn new(speed: f64, angle: f64) -> Self {
        Self {
            speed,
            angle: wrap_angle(angle),
        }
    }
}

/// Cumulative drive distance and steering angle of one module
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModulePosition {
    pub distance: f64, // m
    pub angle: f64,    // rad
}

impl ModulePosition {
    pub fn new(distance: f64, angle: f64) -> Self {
        Self { distance, angle }
    }
}

/// Geometry of the four modules plus the precomputed least-squares inverse
#[derive(Debug, Clone)]
pub struct SwerveKinematics {
    offsets: [Vector2<f64>; MODULE_COUNT],
    forward: ForwardMatrix,
}

impl SwerveKinematics {
    /// Build kinematics from module offsets (x forward, y left, meters)
    ///
    /// Fails if the offsets do not constrain rotation, e.g. all modules at the
    /// robot center.
    pub fn new(offsets: [[f64; 2]; MODULE_COUNT]) -> Result<Self> {
        if offsets.iter().flatten().any(|v| !v.is_finite()) {
            return Err(DriveError::Geometry(format!("non-finite offsets {:?}", offsets)));
        }

        let offsets = offsets.map(|[x, y]| Vector2::new(x, y));

        let mut inverse = InverseMatrix::zeros();
        for (i, offset) in offsets.iter().enumerate() {
            inverse[(2 * i, 0)] = 1.0;
            inverse[(2 * i, 2)] = -offset.y;
            inverse[(2 * i + 1, 1)] = 1.0;
            inverse[(2 * i + 1, 2)] = offset.x;
        }

        // Pseudo-inverse (A^T A)^-1 A^T; four modules give eight equations for
        // three unknowns
        let normal: Matrix3<f64> = inverse.transpose() * inverse;
        if normal.determinant().abs() < 1e-9 {
            return Err(DriveError::Geometry(
                "module offsets are degenerate (singular normal matrix)".to_string(),
            ));
        }
        let normal_inv = normal.try_inverse().ok_or_else(|| {
            DriveError::Geometry("module offsets are degenerate (not invertible)".to_string())
        })?;
        let forward: ForwardMatrix = normal_inv * inverse.transpose();

        Ok(Self { offsets, forward })
    }

    pub fn from_config(config: &DriveConfig) -> Result<Self> {
        Self::new(config.module_offsets)
    }

    /// Module offset of module `index` as (x, y)
    pub fn offset(&self, index: usize) -> (f64, f64) {
        let offset = self.offsets[index];
        (offset.x, offset.y)
    }

    /// Convert robot-relative chassis speeds into the four module states
    ///
    /// module velocity = (vx, vy) + omega x offset
    pub fn to_module_states(&self, speeds: &ChassisSpeeds) -> [ModuleState; MODULE_COUNT] {
        self.offsets.map(|offset| {
            let vx = speeds.vx - speeds.omega * offset.y;
            let vy = speeds.vy + speeds.omega * offset.x;
            let speed = vx.hypot(vy);
            let angle = if speed > 0.0 { vy.atan2(vx) } else { 0.0 };
            ModuleState::new(speed, angle)
        })
    }

    /// Least-squares chassis speeds from measured module states
    pub fn to_chassis_speeds(&self, states: &[ModuleState; MODULE_COUNT]) -> ChassisSpeeds {
        let solved = self.solve(states.map(|s| (s.speed, s.angle)));
        ChassisSpeeds::new(solved.x, solved.y, solved.z)
    }

    /// Least-squares robot-frame displacement from per-module distance deltas
    pub fn to_twist(&self, deltas: &[ModulePosition; MODULE_COUNT]) -> Twist2d {
        let solved = self.solve(deltas.map(|d| (d.distance, d.angle)));
        Twist2d {
            dx: solved.x,
            dy: solved.y,
            dtheta: solved.z,
        }
    }

    fn solve(&self, magnitudes: [(f64, f64); MODULE_COUNT]) -> nalgebra::Vector3<f64> {
        let mut measured = SVector::<f64, 8>::zeros();
        for (i, (magnitude, angle)) in magnitudes.iter().enumerate() {
            let (sin, cos) = angle.sin_cos();
            measured[2 * i] = magnitude * cos;
            measured[2 * i + 1] = magnitude * sin;
        }
        self.forward * measured
    }

    /// Uniformly scale module speeds so none exceeds `max_speed`
    ///
    /// All four speeds are scaled by the same factor so the ratio between
    /// translation and rotation is preserved. Returns the scale applied.
    pub fn desaturate(states: &mut [ModuleState; MODULE_COUNT], max_speed: f64) -> f64 {
        let fastest = states.iter().map(|s| s.speed.abs()).fold(0.0f64, f64::max);

        if fastest > max_speed && fastest > 0.0 {
            let scale = max_speed / fastest;
            for state in states.iter_mut() {
                state.speed *= scale;
            }
            scale
        } else {
            1.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    const EPS: f64 = 1e-9;

    fn square() -> SwerveKinematics {
        SwerveKinematics::from_config(&DriveConfig::default()).unwrap()
    }

    #[test]
    fn test_zero_velocity() {
        let states = square().to_module_states(&ChassisSpeeds::zero());
        for state in states {
            assert_eq!(state.speed, 0.0);
            assert_eq!(state.angle, 0.0);
        }
    }

    #[test]
    fn test_strafe_left() {
        let states = square().to_module_states(&ChassisSpeeds::new(0.0, 1.5, 0.0));
        for state in states {
            assert!((state.speed - 1.5).abs() < EPS);
            assert!((state.angle - PI / 2.0).abs() < EPS);
        }
    }

    #[test]
    fn test_pure_rotation() {
        let kinematics = square();
        let states = kinematics.to_module_states(&ChassisSpeeds::new(0.0, 0.0, PI));

        for (i, state) in states.iter().enumerate() {
            let (x, y) = kinematics.offset(i);
            let radius = x.hypot(y);
            assert!((radius - 0.424).abs() < 1e-3);
            assert!((state.speed - radius * PI).abs() < EPS);
            assert!((state.speed - 1.333).abs() < 1e-3);

            // Tangential: direction of travel is perpendicular to the radius
            let dot = state.angle.cos() * x + state.angle.sin() * y;
            assert!(dot.abs() < EPS, "module {} not tangential", i);
        }

        // Front-left module travels toward 135 degrees for counter-clockwise spin
        assert!((states[0].angle - 3.0 * PI / 4.0).abs() < EPS);
    }

    #[test]
    fn test_round_trip() {
        let kinematics = square();
        let cases = [
            ChassisSpeeds::new(1.2, -0.7, 0.9),
            ChassisSpeeds::new(-2.0, 0.0, -1.5),
            ChassisSpeeds::new(0.0, 0.3, 0.0),
            ChassisSpeeds::new(0.5, 0.5, 3.0),
        ];

        for speeds in cases {
            let states = kinematics.to_module_states(&speeds);
            let back = kinematics.to_chassis_speeds(&states);
            assert!((back.vx - speeds.vx).abs() < 1e-9, "{:?} -> {:?}", speeds, back);
            assert!((back.vy - speeds.vy).abs() < 1e-9, "{:?} -> {:?}", speeds, back);
            assert!((back.omega - speeds.omega).abs() < 1e-9, "{:?} -> {:?}", speeds, back);
        }
    }

    #[test]
    fn test_least_squares_spreads_single_wheel_noise() {
        // One wheel reading 0.4 m/s too fast should bias translation by far
        // less than the error itself
        let kinematics = square();
        let mut states = kinematics.to_module_states(&ChassisSpeeds::new(1.0, 0.0, 0.0));
        states[0].speed += 0.4;

        let speeds = kinematics.to_chassis_speeds(&states);
        assert!((speeds.vx - 1.1).abs() < 1e-9);
    }

    #[test]
    fn test_desaturate_preserves_ratios() {
        let mut states = [5.0, 3.0, 6.0, 4.0].map(|speed| ModuleState::new(speed, 0.0));
        let scale = SwerveKinematics::desaturate(&mut states, 4.0);

        assert!((scale - 4.0 / 6.0).abs() < EPS);
        let rounded: Vec<f64> = states
            .iter()
            .map(|s| (s.speed * 100.0).round() / 100.0)
            .collect();
        assert_eq!(rounded, vec![3.33, 2.0, 4.0, 2.67]);
        assert!((states[0].speed / states[1].speed - 5.0 / 3.0).abs() < EPS);
    }

    #[test]
    fn test_desaturate_uses_magnitude() {
        let mut states = [-8.0, 2.0, 4.0, -2.0].map(|speed| ModuleState::new(speed, 0.0));
        SwerveKinematics::desaturate(&mut states, 4.0);
        assert!((states[0].speed + 4.0).abs() < EPS);
        assert!((states[2].speed - 2.0).abs() < EPS);
    }

    #[test]
    fn test_desaturate_noop_within_limit() {
        let mut states = [1.0, 2.0, 3.0, 4.0].map(|speed| ModuleState::new(speed, 0.0));
        let scale = SwerveKinematics::desaturate(&mut states, 4.0);
        assert_eq!(scale, 1.0);
        assert_eq!(states[3].speed, 4.0);
    }

    #[test]
    fn test_degenerate_geometry_rejected() {
        let result = SwerveKinematics::new([[0.0, 0.0]; 4]);
        assert!(matches!(result, Err(DriveError::Geometry(_))));
    }
}
