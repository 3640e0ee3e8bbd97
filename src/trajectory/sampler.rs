// Time-indexed trajectory storage and sampling

use serde::{Deserialize, Serialize};

use crate::angle::interpolate_angle;
use crate::geometry::{ChassisSpeeds, Pose2d};

/// Errors raised when constructing a trajectory
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TrajectoryError {
    #[error("Trajectory must start at t=0, first timestamp is {0}")]
    StartTime(f64),

    #[error("Timestamp decreases at state {index}: {previous} -> {current}")]
    NonMonotonic { index: usize, previous: f64, current: f64 },

    #[error("Non-finite value in state {0}")]
    NonFinite(usize),
}

/// One sample of a pre-planned trajectory
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryState {
    /// Seconds since the start of the trajectory
    pub timestamp: f64,
    pub pose: Pose2d,
    /// Field-relative feedforward velocity
    pub velocity: ChassisSpeeds,
}

impl TrajectoryState {
    pub fn new(timestamp: f64, pose: Pose2d, velocity: ChassisSpeeds) -> Self {
        Self {
            timestamp,
            pose,
            velocity,
        }
    }

    fn is_finite(&self) -> bool {
        self.timestamp.is_finite()
            && self.pose.x.is_finite()
            && self.pose.y.is_finite()
            && self.pose.heading.is_finite()
            && self.velocity.is_finite()
    }

    fn interpolate(&self, next: &TrajectoryState, t: f64) -> TrajectoryState {
        TrajectoryState {
            timestamp: self.timestamp + (next.timestamp - self.timestamp) * t,
            pose: Pose2d {
                x: self.pose.x + (next.pose.x - self.pose.x) * t,
                y: self.pose.y + (next.pose.y - self.pose.y) * t,
                heading: interpolate_angle(self.pose.heading, next.pose.heading, t),
            },
            velocity: self.velocity.lerp(&next.velocity, t),
        }
    }
}

/// Immutable, time-ordered sequence of trajectory states
///
/// Sampling is a pure function of time: there is no cursor, so the same
/// trajectory can be sampled in any order or restarted freely.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<TrajectoryState>", into = "Vec<TrajectoryState>")]
pub struct Trajectory {
    states: Vec<TrajectoryState>,
}

impl Trajectory {
    /// Validate and wrap a sequence of states
    ///
    /// Timestamps must start at zero and never decrease. An empty sequence is
    /// allowed and samples as a stationary robot at the origin.
    pub fn new(states: Vec<TrajectoryState>) -> Result<Self, TrajectoryError> {
        if let Some(first) = states.first() {
            if first.timestamp != 0.0 {
                return Err(TrajectoryError::StartTime(first.timestamp));
            }
        }

        for (index, state) in states.iter().enumerate() {
            if !state.is_finite() {
                return Err(TrajectoryError::NonFinite(index));
            }
            if index > 0 && state.timestamp < states[index - 1].timestamp {
                return Err(TrajectoryError::NonMonotonic {
                    index,
                    previous: states[index - 1].timestamp,
                    current: state.timestamp,
                });
            }
        }

        Ok(Self { states })
    }

    /// Total duration in seconds (timestamp of the last state)
    pub fn duration(&self) -> f64 {
        self.states.last().map_or(0.0, |s| s.timestamp)
    }

    pub fn initial_pose(&self) -> Pose2d {
        self.states.first().map_or_else(Pose2d::origin, |s| s.pose)
    }

    pub fn states(&self) -> &[TrajectoryState] {
        &self.states
    }

    /// State at `t` seconds
    ///
    /// - `t >= duration`: last state with zero velocity (the robot should be
    ///   stopped once the trajectory time has elapsed)
    /// - `t <= 0`: first state
    /// - otherwise: linear interpolation between the bracketing states, with
    ///   heading interpolated along the shortest arc
    pub fn sample(&self, t: f64) -> TrajectoryState {
        let (Some(first), Some(last)) = (self.states.first(), self.states.last()) else {
            return TrajectoryState::default();
        };

        if t >= last.timestamp {
            return TrajectoryState {
                velocity: ChassisSpeeds::zero(),
                ..*last
            };
        }
        if t <= first.timestamp {
            return *first;
        }

        // First state strictly after t; 1 <= upper < len given the checks above
        let upper = self.states.partition_point(|s| s.timestamp <= t);
        let previous = &self.states[upper - 1];
        let next = &self.states[upper];

        let span = next.timestamp - previous.timestamp;
        if span <= 0.0 {
            return *next;
        }
        previous.interpolate(next, (t - previous.timestamp) / span)
    }
}

impl TryFrom<Vec<TrajectoryState>> for Trajectory {
    type Error = TrajectoryError;

    fn try_from(states: Vec<TrajectoryState>) -> Result<Self, Self::Error> {
        Trajectory::new(states)
    }
}

impl From<Trajectory> for Vec<TrajectoryState> {
    fn from(trajectory: Trajectory) -> Self {
        trajectory.states
    }
}
