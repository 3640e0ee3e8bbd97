// Error types for the drive core

/// Errors raised by the drivetrain, its sensors and its actuators
#[derive(Debug, thiserror::Error)]
pub enum DriveError {
    #[error("Actuator write failed on module {module}: {reason}")]
    ActuatorWrite { module: usize, reason: String },

    #[error("Actuator read failed on module {module}: {reason}")]
    ActuatorRead { module: usize, reason: String },

    #[error("Heading sensor read failed: {0}")]
    HeadingSensor(String),

    #[error("Invalid module geometry: {0}")]
    Geometry(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, DriveError>;
