// Planar geometry types shared by kinematics, odometry and trajectories

use serde::{Deserialize, Serialize};

use crate::angle::angle_difference;

/// Robot pose in the fixed field frame
///
/// `heading` is unbounded; compare headings with [`angle_difference`], never
/// by raw subtraction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose2d {
    pub x: f64,       // m
    pub y: f64,       // m
    pub heading: f64, // rad
}

impl Pose2d {
    pub fn new(x: f64, y: f64, heading: f64) -> Self {
        Self { x, y, heading }
    }

    pub fn origin() -> Self {
        Self::default()
    }

    /// Apply a robot-frame displacement using the SE(2) exponential map
    ///
    /// Treats the twist as constant-curvature motion over the step, which is
    /// exact for a robot driving an arc.
    pub fn exp(&self, twist: &Twist2d) -> Pose2d {
        let (dx, dy, dtheta) = (twist.dx, twist.dy, twist.dtheta);
        let sin_theta = dtheta.sin();
        let cos_theta = dtheta.cos();

        let (s, c) = if dtheta.abs() < 1e-9 {
            (1.0 - dtheta * dtheta / 6.0, 0.5 * dtheta)
        } else {
            (sin_theta / dtheta, (1.0 - cos_theta) / dtheta)
        };

        // Displacement in the frame of the pose at the start of the step
        let local_x = dx * s - dy * c;
        let local_y = dx * c + dy * s;

        let (sin_h, cos_h) = self.heading.sin_cos();
        Pose2d {
            x: self.x + local_x * cos_h - local_y * sin_h,
            y: self.y + local_x * sin_h + local_y * cos_h,
            heading: self.heading + dtheta,
        }
    }

    /// Shortest signed heading error from this pose to `target`
    pub fn heading_error_to(&self, target: &Pose2d) -> f64 {
        angle_difference(self.heading, target.heading)
    }

    pub fn distance_to(&self, other: &Pose2d) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }
}

/// Robot-frame displacement over one odometry step
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Twist2d {
    pub dx: f64,
    pub dy: f64,
    pub dtheta: f64,
}

/// Aggregate chassis velocity
///
/// The frame (robot-relative or field-relative) is context and is not stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ChassisSpeeds {
    pub vx: f64,    // m/s
    pub vy: f64,    // m/s
    pub omega: f64, // rad/s, positive = counter-clockwise
}

impl ChassisSpeeds {
    pub fn new(vx: f64, vy: f64, omega: f64) -> Self {
        Self { vx, vy, omega }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    /// Convert field-relative speeds into the robot frame given the robot heading
    pub fn from_field_relative(field: ChassisSpeeds, heading: f64) -> Self {
        let (sin, cos) = heading.sin_cos();
        Self {
            vx: field.vx * cos + field.vy * sin,
            vy: -field.vx * sin + field.vy * cos,
            omega: field.omega,
        }
    }

    /// Convert robot-relative speeds into the field frame given the robot heading
    pub fn to_field_relative(&self, heading: f64) -> Self {
        let (sin, cos) = heading.sin_cos();
        Self {
            vx: self.vx * cos - self.vy * sin,
            vy: self.vx * sin + self.vy * cos,
            omega: self.omega,
        }
    }

    pub fn translational_speed(&self) -> f64 {
        self.vx.hypot(self.vy)
    }

    /// Scale the translation down to `max_speed`, keeping its direction
    pub fn clamp_translation(&self, max_speed: f64) -> Self {
        let speed = self.translational_speed();
        if speed > max_speed && speed > 0.0 {
            let scale = max_speed / speed;
            Self {
                vx: self.vx * scale,
                vy: self.vy * scale,
                omega: self.omega,
            }
        } else {
            *self
        }
    }

    /// Component-wise linear interpolation
    pub fn lerp(&self, other: &ChassisSpeeds, t: f64) -> Self {
        Self {
            vx: self.vx + (other.vx - self.vx) * t,
            vy: self.vy + (other.vy - self.vy) * t,
            omega: self.omega + (other.omega - self.omega) * t,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.vx.is_finite() && self.vy.is_finite() && self.omega.is_finite()
    }
}
