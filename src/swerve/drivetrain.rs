// Swerve drivetrain
//
// Owns the four modules, the heading sensor and the odometry estimator. The
// runtime calls `periodic` once per control cycle, then exactly one of
// `drive` / `set_module_states` / `stop`.

use tracing::{debug, info, warn};

use super::actuator::{HeadingSensor, ModuleActuator, OutputMode};
use super::kinematics::{MODULE_COUNT, MODULE_NAMES, ModulePosition, ModuleState, SwerveKinematics};
use super::module::SwerveModule;
use super::odometry::SwerveOdometry;
use crate::config::DriveConfig;
use crate::error::{DriveError, Result};
use crate::geometry::{ChassisSpeeds, Pose2d};

/// Outcome of one cycle's actuator writes
#[derive(Debug)]
pub struct DriveReport {
    /// States commanded to each module after desaturation and optimisation
    pub states: [ModuleState; MODULE_COUNT],
    /// Desaturation factor applied to all modules (1.0 = none)
    pub scale: f64,
    /// Write failures this cycle; non-fatal, never retried
    pub errors: Vec<DriveError>,
}

impl DriveReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

pub struct Drivetrain<A, G> {
    config: DriveConfig,
    kinematics: SwerveKinematics,
    modules: [SwerveModule<A>; MODULE_COUNT],
    gyro: G,
    odometry: SwerveOdometry,
    last_heading: f64, // raw sensor heading, rad
}

impl<A: ModuleActuator, G: HeadingSensor> Drivetrain<A, G> {
    /// Build a drivetrain at the field origin
    ///
    /// Actuators are given in configuration order (front-left, front-right,
    /// back-left, back-right).
    pub fn new(config: DriveConfig, actuators: [A; MODULE_COUNT], gyro: G) -> Result<Self> {
        Self::with_pose(config, actuators, gyro, Pose2d::origin())
    }

    /// Build a drivetrain whose pose estimate starts at `initial_pose`
    pub fn with_pose(
        config: DriveConfig,
        actuators: [A; MODULE_COUNT],
        gyro: G,
        initial_pose: Pose2d,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| DriveError::Config(e.to_string()))?;
        let kinematics = SwerveKinematics::from_config(&config)?;

        let mut index = 0;
        let modules = actuators.map(|actuator| {
            let module = SwerveModule::new(index, actuator, config.max_module_speed);
            index += 1;
            module
        });

        let mut drivetrain = Self {
            odometry: SwerveOdometry::new(
                kinematics.clone(),
                0.0,
                [ModulePosition::default(); MODULE_COUNT],
                initial_pose,
            ),
            config,
            kinematics,
            modules,
            gyro,
            last_heading: 0.0,
        };

        // Seed odometry from whatever the sensors read at power-on
        let heading = drivetrain.read_heading();
        let positions = drivetrain.read_positions();
        drivetrain
            .odometry
            .reset_position(initial_pose, heading, positions);

        info!(
            "Drivetrain ready: max module speed {} m/s, pose ({:.2}, {:.2}, {:.2})",
            drivetrain.config.max_module_speed, initial_pose.x, initial_pose.y, initial_pose.heading
        );
        Ok(drivetrain)
    }

    /// Read sensors and update odometry; call exactly once per control cycle
    ///
    /// A failed sensor read is replaced by its last-known-good value so the
    /// estimator keeps a constant update rate.
    pub fn periodic(&mut self, timestamp: f64) -> Pose2d {
        let heading = self.read_heading();
        let positions = self.read_positions();
        self.odometry.update(heading, &positions, timestamp)
    }

    /// Drive with chassis speeds
    ///
    /// With `field_relative` the speeds are in the field frame and are rotated
    /// into the robot frame using the current pose heading.
    pub fn drive(&mut self, speeds: ChassisSpeeds, field_relative: bool, mode: OutputMode) -> DriveReport {
        let robot_speeds = if field_relative {
            ChassisSpeeds::from_field_relative(speeds, self.odometry.pose().heading)
        } else {
            speeds
        };

        let states = self.kinematics.to_module_states(&robot_speeds);
        self.set_module_states(states, mode)
    }

    /// Desaturate and dispatch raw module states to the four modules
    pub fn set_module_states(&mut self, mut states: [ModuleState; MODULE_COUNT], mode: OutputMode) -> DriveReport {
        let scale = SwerveKinematics::desaturate(&mut states, self.config.max_module_speed);
        if scale < 1.0 {
            debug!("Desaturating module speeds by {:.3}", scale);
        }

        let mut errors = Vec::new();
        let mut applied = states;
        for (module, (desired, out)) in self
            .modules
            .iter_mut()
            .zip(states.iter().zip(applied.iter_mut()))
        {
            match module.apply(*desired, mode) {
                Ok(state) => *out = state,
                Err(e) => {
                    warn!("Module {} write failed: {}", MODULE_NAMES[module.index()], e);
                    *out = module.last_setpoint();
                    errors.push(e);
                }
            }
        }

        DriveReport {
            states: applied,
            scale,
            errors,
        }
    }

    /// Command zero chassis speeds; wheels keep their steering angle
    pub fn stop(&mut self) -> DriveReport {
        self.drive(ChassisSpeeds::zero(), false, OutputMode::Velocity)
    }

    pub fn pose(&self) -> Pose2d {
        self.odometry.pose()
    }

    /// Overwrite the pose estimate
    ///
    /// Only call when the robot is stationary, e.g. at the start of an
    /// autonomous routine; this is not checked.
    pub fn reset_odometry(&mut self, pose: Pose2d) {
        info!("Resetting odometry to ({:.3}, {:.3}, {:.3})", pose.x, pose.y, pose.heading);
        self.odometry.reset(pose);
    }

    /// Re-zero field orientation so the robot's current facing reads as
    /// `heading_offset_degrees`; position is kept
    pub fn reset(&mut self, heading_offset_degrees: f64) {
        let pose = self.odometry.pose();
        info!("Resetting heading to {} deg", heading_offset_degrees);
        self.odometry
            .reset(Pose2d::new(pose.x, pose.y, heading_offset_degrees.to_radians()));
    }

    /// Last successful position reading of each module
    pub fn module_positions(&self) -> [ModulePosition; MODULE_COUNT] {
        std::array::from_fn(|i| self.modules[i].last_position())
    }

    /// Last state written to each module
    pub fn module_setpoints(&self) -> [ModuleState; MODULE_COUNT] {
        std::array::from_fn(|i| self.modules[i].last_setpoint())
    }

    pub fn kinematics(&self) -> &SwerveKinematics {
        &self.kinematics
    }

    pub fn config(&self) -> &DriveConfig {
        &self.config
    }

    pub fn modules_mut(&mut self) -> &mut [SwerveModule<A>; MODULE_COUNT] {
        &mut self.modules
    }

    pub fn gyro_mut(&mut self) -> &mut G {
        &mut self.gyro
    }

    fn read_heading(&mut self) -> f64 {
        match self.gyro.heading_degrees() {
            Ok(degrees) if degrees.is_finite() => {
                self.last_heading = degrees.to_radians();
            }
            Ok(degrees) => warn!("Heading sensor returned {}, using last known", degrees),
            Err(e) => warn!("Heading read failed ({}), using last known", e),
        }
        self.last_heading
    }

    fn read_positions(&mut self) -> [ModulePosition; MODULE_COUNT] {
        std::array::from_fn(|i| {
            let module = &mut self.modules[i];
            module.read_position().unwrap_or_else(|e| {
                warn!("{} read failed ({}), using last known", MODULE_NAMES[i], e);
                module.last_position()
            })
        })
    }
}
