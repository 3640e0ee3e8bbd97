// Trapezoidal motion profile used by the profiled heading controller

/// Velocity and acceleration limits of a profile
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Constraints {
    pub max_velocity: f64,
    pub max_acceleration: f64,
}

impl Constraints {
    pub fn new(max_velocity: f64, max_acceleration: f64) -> Self {
        Self {
            max_velocity,
            max_acceleration,
        }
    }
}

/// Position and velocity along a profile
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProfileState {
    pub position: f64,
    pub velocity: f64,
}

impl ProfileState {
    pub fn new(position: f64, velocity: f64) -> Self {
        Self { position, velocity }
    }
}

/// Trapezoidal profile: accelerate at the limit, cruise at max velocity,
/// decelerate to arrive at the goal with the goal velocity
#[derive(Debug, Clone, Copy)]
pub struct TrapezoidProfile {
    constraints: Constraints,
}

impl TrapezoidProfile {
    pub fn new(constraints: Constraints) -> Self {
        Self { constraints }
    }

    /// State reached `t` seconds after `current` when heading for `goal`
    pub fn calculate(&self, t: f64, current: ProfileState, goal: ProfileState) -> ProfileState {
        // Solve everything as a forward move and flip the result back
        let direction = if current.position > goal.position { -1.0 } else { 1.0 };
        let mut current = direct(current, direction);
        let goal = direct(goal, direction);

        let max_v = self.constraints.max_velocity;
        let max_a = self.constraints.max_acceleration;

        if current.velocity > max_v {
            current.velocity = max_v;
        }

        // Pretend the profile started and ends at rest by extending it
        let cutoff_begin = current.velocity / max_a;
        let cutoff_dist_begin = cutoff_begin * cutoff_begin * max_a / 2.0;
        let cutoff_end = goal.velocity / max_a;
        let cutoff_dist_end = cutoff_end * cutoff_end * max_a / 2.0;

        let full_trapezoid_dist = cutoff_dist_begin + (goal.position - current.position) + cutoff_dist_end;
        let mut accel_time = max_v / max_a;
        let mut full_speed_dist = full_trapezoid_dist - accel_time * accel_time * max_a;

        // Triangle profile: never reaches max velocity
        if full_speed_dist < 0.0 {
            accel_time = (full_trapezoid_dist / max_a).sqrt();
            full_speed_dist = 0.0;
        }

        let end_accel = accel_time - cutoff_begin;
        let end_full_speed = end_accel + full_speed_dist / max_v;
        let end_decel = end_full_speed + accel_time - cutoff_end;

        let mut result = current;
        if t < end_accel {
            result.velocity += t * max_a;
            result.position += (current.velocity + t * max_a / 2.0) * t;
        } else if t < end_full_speed {
            result.velocity = max_v;
            result.position += (current.velocity + end_accel * max_a / 2.0) * end_accel + max_v * (t - end_accel);
        } else if t <= end_decel {
            let time_left = end_decel - t;
            result.velocity = goal.velocity + time_left * max_a;
            result.position = goal.position - (goal.velocity + time_left * max_a / 2.0) * time_left;
        } else {
            result = goal;
        }

        direct(result, direction)
    }
}

fn direct(state: ProfileState, direction: f64) -> ProfileState {
    ProfileState::new(state.position * direction, state.velocity * direction)
}
