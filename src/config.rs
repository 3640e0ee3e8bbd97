// Loop timing, topics and drivetrain configuration
use std::f64::consts::PI;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// Runtime loop frequency (20 ms control period)
pub const LOOP_HZ: u64 = 50;

// Operator command timeout for watchdog
pub const CMD_TIMEOUT: Duration = Duration::from_millis(250);

// Zenoh topics
pub const TOPIC_CMD_DRIVE: &str = "swerve/cmd/drive"; // operator velocity commands
pub const TOPIC_CMD_TRAJECTORY: &str = "swerve/cmd/trajectory"; // trajectory requests
pub const TOPIC_CMD_RESET: &str = "swerve/cmd/reset"; // heading / odometry resets
pub const TOPIC_CMD_CANCEL: &str = "swerve/cmd/cancel"; // cancel active trajectory
pub const TOPIC_POSE: &str = "swerve/state/pose"; // pose estimate
pub const TOPIC_RT_MODULES: &str = "swerve/rt/modules"; // module setpoints
pub const TOPIC_HEALTH: &str = "swerve/state/health"; // health status

// Below this drive speed (m/s) a module keeps its current steering angle
pub const MODULE_SPEED_DEADBAND: f64 = 1e-3;

// Position and heading tolerance reported when a trajectory finishes
pub const TRAJECTORY_POSITION_TOLERANCE: f64 = 0.05; // m
pub const TRAJECTORY_HEADING_TOLERANCE: f64 = 0.05; // rad

/// Error types for loading a drivetrain configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Profiled heading controller gains
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeadingGains {
    pub kp: f64,
    pub max_velocity: f64,     // rad/s
    pub max_acceleration: f64, // rad/s^2
}

impl Default for HeadingGains {
    fn default() -> Self {
        Self {
            kp: 1.0,
            max_velocity: PI,
            max_acceleration: PI,
        }
    }
}

/// Drivetrain configuration, read-only for the lifetime of the control loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    /// Module offsets from robot center in meters, +x forward, +y left
    /// Order: front-left, front-right, back-left, back-right
    pub module_offsets: [[f64; 2]; 4],
    pub max_module_speed: f64,         // m/s
    pub max_module_angular_speed: f64, // rad/s (steering)
    pub max_chassis_speed: f64,        // m/s
    pub x_kp: f64,
    pub y_kp: f64,
    pub heading: HeadingGains,
}

impl Default for DriveConfig {
    /// 0.6 m square frame, modules 0.424 m from center
    fn default() -> Self {
        Self {
            module_offsets: [[0.3, 0.3], [0.3, -0.3], [-0.3, 0.3], [-0.3, -0.3]],
            max_module_speed: 4.0,
            max_module_angular_speed: 4.0 * PI,
            max_chassis_speed: 3.0,
            x_kp: 1.0,
            y_kp: 1.0,
            heading: HeadingGains::default(),
        }
    }
}

impl DriveConfig {
    /// Load and validate a JSON config file; missing fields take defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: DriveConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for offset in &self.module_offsets {
            if !offset.iter().all(|v| v.is_finite()) {
                return Err(ConfigError::Invalid {
                    field: "module_offsets",
                    reason: format!("non-finite offset {:?}", offset),
                });
            }
        }

        let positive = [
            ("max_module_speed", self.max_module_speed),
            ("max_module_angular_speed", self.max_module_angular_speed),
            ("max_chassis_speed", self.max_chassis_speed),
            ("heading.max_velocity", self.heading.max_velocity),
            ("heading.max_acceleration", self.heading.max_acceleration),
        ];
        for (field, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!("must be finite and > 0, got {}", value),
                });
            }
        }

        let gains = [("x_kp", self.x_kp), ("y_kp", self.y_kp), ("heading.kp", self.heading.kp)];
        for (field, value) in gains {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!("must be finite and >= 0, got {}", value),
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(DriveConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: DriveConfig = serde_json::from_str(r#"{ "max_module_speed": 5.5 }"#).unwrap();
        assert_eq!(config.max_module_speed, 5.5);
        assert_eq!(config.module_offsets, DriveConfig::default().module_offsets);
    }

    #[test]
    fn test_rejects_non_positive_speed() {
        let config = DriveConfig {
            max_module_speed: 0.0,
            ..DriveConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "max_module_speed",
                ..
            }
        ));
    }

    #[test]
    fn test_rejects_negative_gain() {
        let config = DriveConfig {
            y_kp: -1.0,
            ..DriveConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
