// Simulated swerve hardware
//
// Stands in for the motor controllers and gyro when no hardware is attached.
// Drive distance integrates the commanded wheel velocity, steering slews
// toward its setpoint at the configured module angular speed, and the gyro
// integrates the chassis rotation recovered from the module states.

use tracing::debug;

use crate::angle::{angle_difference, wrap_angle};
use crate::config::DriveConfig;
use crate::error::Result;
use crate::swerve::{Drivetrain, HeadingSensor, MODULE_COUNT, ModuleActuator, ModuleState, OutputMode};

/// Simulated drive + steering motor pair
#[derive(Debug, Clone, Default)]
pub struct SimModule {
    max_speed: f64,
    max_angular_speed: f64,
    distance: f64,
    angle: f64,
    steering_setpoint: f64,
    drive_velocity: f64,
}

impl SimModule {
    pub fn new(max_speed: f64, max_angular_speed: f64) -> Self {
        Self {
            max_speed,
            max_angular_speed,
            ..Default::default()
        }
    }

    pub fn from_config(config: &DriveConfig) -> Self {
        Self::new(config.max_module_speed, config.max_module_angular_speed)
    }

    /// Advance the motors by `dt` seconds
    pub fn advance(&mut self, dt: f64) {
        let max_step = self.max_angular_speed * dt;
        let step = angle_difference(self.angle, self.steering_setpoint).clamp(-max_step, max_step);
        self.angle = wrap_angle(self.angle + step);
        self.distance += self.drive_velocity * dt;
    }

    /// Measured wheel velocity and steering angle
    pub fn state(&self) -> ModuleState {
        ModuleState::new(self.drive_velocity, self.angle)
    }
}

impl ModuleActuator for SimModule {
    fn set_velocity_or_output(&mut self, value: f64, mode: OutputMode) -> Result<()> {
        self.drive_velocity = match mode {
            OutputMode::Velocity => value.clamp(-self.max_speed, self.max_speed),
            OutputMode::PercentOutput => value.clamp(-1.0, 1.0) * self.max_speed,
        };
        Ok(())
    }

    fn set_steering_angle(&mut self, radians: f64) -> Result<()> {
        self.steering_setpoint = wrap_angle(radians);
        Ok(())
    }

    fn position(&mut self) -> Result<f64> {
        Ok(self.distance)
    }

    fn angle(&mut self) -> Result<f64> {
        Ok(self.angle)
    }
}

/// Simulated heading sensor
#[derive(Debug, Clone, Default)]
pub struct SimGyro {
    degrees: f64,
}

impl SimGyro {
    pub fn rotate(&mut self, degrees: f64) {
        self.degrees += degrees;
    }
}

impl HeadingSensor for SimGyro {
    fn heading_degrees(&mut self) -> Result<f64> {
        Ok(self.degrees)
    }
}

pub type SimDrivetrain = Drivetrain<SimModule, SimGyro>;

/// Build a drivetrain on simulated hardware
pub fn sim_drivetrain(config: DriveConfig) -> Result<SimDrivetrain> {
    let actuators = std::array::from_fn(|_| SimModule::from_config(&config));
    Drivetrain::new(config, actuators, SimGyro::default())
}

/// Steps the simulated hardware between control cycles
pub struct SimPlant;

impl SimPlant {
    /// Advance every module by `dt` and integrate the gyro from the resulting
    /// chassis rotation
    pub fn step(drivetrain: &mut SimDrivetrain, dt: f64) {
        let mut states = [ModuleState::default(); MODULE_COUNT];
        for (module, state) in drivetrain.modules_mut().iter_mut().zip(states.iter_mut()) {
            module.actuator_mut().advance(dt);
            *state = module.actuator().state();
        }

        let speeds = drivetrain.kinematics().to_chassis_speeds(&states);
        drivetrain.gyro_mut().rotate(speeds.omega.to_degrees() * dt);

        debug!(
            "Sim step: chassis=({:.3}, {:.3}, {:.3})",
            speeds.vx, speeds.vy, speeds.omega
        );
    }
}
