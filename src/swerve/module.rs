// Per-module controller
//
// Resolves a desired (speed, angle) against the measured steering angle,
// reversing the wheel when that is the shorter way round, and writes the
// result to the module's actuators.

use std::f64::consts::{FRAC_PI_2, PI};

use tracing::{debug, warn};

use super::actuator::{ModuleActuator, OutputMode};
use super::kinematics::{ModulePosition, ModuleState};
use crate::angle::{angle_difference, wrap_angle};
use crate::config::MODULE_SPEED_DEADBAND;
use crate::error::{DriveError, Result};

/// Minimise steering travel for a desired state
///
/// If the target is more than 90 degrees away from `current_angle`, drive the
/// wheel backwards along the opposite heading instead. The returned angle is
/// always within PI/2 of `current_angle`.
pub fn optimize(desired: ModuleState, current_angle: f64) -> ModuleState {
    let delta = angle_difference(current_angle, desired.angle);
    if delta.abs() > FRAC_PI_2 {
        ModuleState {
            speed: -desired.speed,
            angle: wrap_angle(desired.angle + PI),
        }
    } else {
        desired
    }
}

/// One swerve module: actuator plus last-known-good sensor values
pub struct SwerveModule<A> {
    index: usize,
    actuator: A,
    max_speed: f64,
    last_position: ModulePosition,
    last_setpoint: ModuleState,
}

impl<A: ModuleActuator> SwerveModule<A> {
    pub fn new(index: usize, actuator: A, max_speed: f64) -> Self {
        Self {
            index,
            actuator,
            max_speed,
            last_position: ModulePosition::default(),
            last_setpoint: ModuleState::default(),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Read distance and steering angle; only successful reads update the
    /// last-known-good position
    pub fn read_position(&mut self) -> Result<ModulePosition> {
        let distance = self.actuator.position()?;
        let angle = self.actuator.angle()?;
        if !distance.is_finite() || !angle.is_finite() {
            return Err(DriveError::ActuatorRead {
                module: self.index,
                reason: format!("non-finite reading ({}, {})", distance, angle),
            });
        }
        self.last_position = ModulePosition::new(distance, angle);
        Ok(self.last_position)
    }

    /// Last successful position reading
    pub fn last_position(&self) -> ModulePosition {
        self.last_position
    }

    /// Last state written to the actuators
    pub fn last_setpoint(&self) -> ModuleState {
        self.last_setpoint
    }

    /// Optimise `desired` and write it to the actuators
    ///
    /// Returns the state actually commanded. A failed write is reported and
    /// not retried; the next cycle's write supersedes it.
    pub fn apply(&mut self, desired: ModuleState, mode: OutputMode) -> Result<ModuleState> {
        let current_angle = match self.actuator.angle() {
            Ok(angle) if angle.is_finite() => angle,
            Ok(angle) => {
                warn!("Module {} reported non-finite angle {}, using last known", self.index, angle);
                self.last_position.angle
            }
            Err(e) => {
                warn!("Module {} angle read failed ({}), using last known", self.index, e);
                self.last_position.angle
            }
        };

        // Idle wheels keep their heading instead of snapping back to zero
        let target = if desired.speed.abs() < MODULE_SPEED_DEADBAND {
            ModuleState {
                speed: 0.0,
                angle: wrap_angle(current_angle),
            }
        } else {
            optimize(desired, current_angle)
        };

        let drive_value = match mode {
            OutputMode::Velocity => target.speed,
            OutputMode::PercentOutput => (target.speed / self.max_speed).clamp(-1.0, 1.0),
        };

        debug!(
            "Module {}: speed={:.3}, angle={:.3} ({:?} {:.3})",
            self.index, target.speed, target.angle, mode, drive_value
        );

        self.last_setpoint = target;

        // Both writes are attempted; the first failure is reported
        let drive_result = self.actuator.set_velocity_or_output(drive_value, mode);
        let steer_result = self.actuator.set_steering_angle(target.angle);
        drive_result?;
        steer_result?;

        Ok(target)
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    pub fn actuator_mut(&mut self) -> &mut A {
        &mut self.actuator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    /// Minimal in-process actuator used only for tests
    #[derive(Default)]
    struct MockActuator {
        drive: Vec<(f64, OutputMode)>,
        steering: Vec<f64>,
        angle: f64,
        fail_writes: bool,
        fail_reads: bool,
    }

    impl ModuleActuator for MockActuator {
        fn set_velocity_or_output(&mut self, value: f64, mode: OutputMode) -> Result<()> {
            if self.fail_writes {
                return Err(DriveError::ActuatorWrite {
                    module: 0,
                    reason: "bus off".to_string(),
                });
            }
            self.drive.push((value, mode));
            Ok(())
        }

        fn set_steering_angle(&mut self, radians: f64) -> Result<()> {
            self.steering.push(radians);
            Ok(())
        }

        fn position(&mut self) -> Result<f64> {
            if self.fail_reads {
                return Err(DriveError::ActuatorRead {
                    module: 0,
                    reason: "timeout".to_string(),
                });
            }
            Ok(1.25)
        }

        fn angle(&mut self) -> Result<f64> {
            if self.fail_reads {
                return Err(DriveError::ActuatorRead {
                    module: 0,
                    reason: "timeout".to_string(),
                });
            }
            Ok(self.angle)
        }
    }

    #[test]
    fn test_optimize_bound_holds_everywhere() {
        // Sweep current and desired angles over the full circle and beyond
        for current_deg in (-540..=540).step_by(15) {
            for desired_deg in (-180..=180).step_by(10) {
                let current = (current_deg as f64).to_radians();
                let desired = ModuleState::new(1.0, (desired_deg as f64).to_radians());
                let result = optimize(desired, current);
                let travel = angle_difference(current, result.angle).abs();
                assert!(
                    travel <= FRAC_PI_2 + EPS,
                    "current={} desired={} travel={}",
                    current_deg,
                    desired_deg,
                    travel.to_degrees()
                );
            }
        }
    }

    #[test]
    fn test_optimize_reverses_wheel() {
        let result = optimize(ModuleState::new(2.0, PI), 0.0);
        assert!((result.speed + 2.0).abs() < EPS);
        assert!(result.angle.abs() < EPS);
    }

    #[test]
    fn test_optimize_keeps_small_turns() {
        let desired = ModuleState::new(2.0, 0.5);
        let result = optimize(desired, 0.0);
        assert_eq!(result, desired);
    }

    #[test]
    fn test_apply_percent_output() {
        let mut module = SwerveModule::new(0, MockActuator::default(), 4.0);
        let applied = module
            .apply(ModuleState::new(2.0, 0.3), OutputMode::PercentOutput)
            .unwrap();
        assert!((applied.speed - 2.0).abs() < EPS);

        let (value, mode) = module.actuator().drive[0];
        assert!((value - 0.5).abs() < EPS);
        assert_eq!(mode, OutputMode::PercentOutput);
        assert!((module.actuator().steering[0] - 0.3).abs() < EPS);
    }

    #[test]
    fn test_apply_holds_angle_when_idle() {
        let actuator = MockActuator {
            angle: 1.0,
            ..Default::default()
        };
        let mut module = SwerveModule::new(0, actuator, 4.0);
        let applied = module.apply(ModuleState::new(0.0, 0.0), OutputMode::Velocity).unwrap();
        assert_eq!(applied.speed, 0.0);
        assert!((applied.angle - 1.0).abs() < EPS);
    }

    #[test]
    fn test_apply_reports_write_failure_without_retry() {
        let actuator = MockActuator {
            fail_writes: true,
            ..Default::default()
        };
        let mut module = SwerveModule::new(0, actuator, 4.0);
        let result = module.apply(ModuleState::new(1.0, 0.2), OutputMode::Velocity);
        assert!(matches!(result, Err(DriveError::ActuatorWrite { .. })));
        // Steering still received exactly one write this cycle
        assert_eq!(module.actuator().steering.len(), 1);
    }

    #[test]
    fn test_read_failure_keeps_last_good() {
        let mut module = SwerveModule::new(0, MockActuator::default(), 4.0);
        let good = module.read_position().unwrap();
        assert!((good.distance - 1.25).abs() < EPS);

        module.actuator_mut().fail_reads = true;
        assert!(module.read_position().is_err());
        assert_eq!(module.last_position(), good);
    }
}
