// Hardware capability traits for the swerve core
//
// The drivetrain only ever talks to these traits, so a vendor motor
// controller, a CAN bridge, or the simulation plant can stand
// behind them without touching kinematics or control code.

use crate::error::Result;

/// How a drive setpoint is interpreted by the motor controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Closed-loop wheel velocity in m/s
    Velocity,
    /// Open-loop fraction of full output, in [-1, 1]
    PercentOutput,
}

/// One swerve module's drive and steering motors
pub trait ModuleActuator {
    /// Command the drive motor. `value` is m/s in [`OutputMode::Velocity`] or
    /// a fraction of full output in [`OutputMode::PercentOutput`].
    fn set_velocity_or_output(&mut self, value: f64, mode: OutputMode) -> Result<()>;

    /// Command the steering motor to an absolute angle in radians.
    fn set_steering_angle(&mut self, radians: f64) -> Result<()>;

    /// Cumulative drive distance in meters.
    fn position(&mut self) -> Result<f64>;

    /// Current steering angle in radians.
    fn angle(&mut self) -> Result<f64>;
}

/// Dedicated heading sensor (gyro / IMU)
pub trait HeadingSensor {
    /// Signed heading in degrees, counter-clockwise positive, continuous
    /// (not wrapped).
    fn heading_degrees(&mut self) -> Result<f64>;
}
