// Continuous heading arithmetic
//
// Every heading comparison in the crate goes through these helpers so the
// wrap convention is the same everywhere: angles live in (-PI, PI].

use std::f64::consts::{PI, TAU};

/// Wrap an angle in radians into (-PI, PI]
pub fn wrap_angle(radians: f64) -> f64 {
    let wrapped = radians.rem_euclid(TAU); // [0, 2PI)
    if wrapped > PI {
        wrapped - TAU
    } else {
        wrapped
    }
}

/// Shortest signed angular distance travelling from `from` to `to`
///
/// The result is in (-PI, PI]; positive means counter-clockwise.
pub fn angle_difference(from: f64, to: f64) -> f64 {
    wrap_angle(to - from)
}

/// Wrap `value` into the half-open range [min, max)
///
/// Used for controller inputs that are continuous over a range, e.g. a
/// heading over [-PI, PI).
pub fn input_modulus(value: f64, min: f64, max: f64) -> f64 {
    let span = max - min;
    min + (value - min).rem_euclid(span)
}

/// Interpolate between two headings along the shortest arc
pub fn interpolate_angle(start: f64, end: f64, t: f64) -> f64 {
    wrap_angle(start + angle_difference(start, end) * t)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_wrap_range() {
        assert!((wrap_angle(0.0)).abs() < EPS);
        assert!((wrap_angle(PI) - PI).abs() < EPS);
        // -PI maps onto +PI so the interval stays half-open
        assert!((wrap_angle(-PI) - PI).abs() < EPS);
        assert!((wrap_angle(3.0 * PI) - PI).abs() < EPS);
        assert!((wrap_angle(TAU + 0.5) - 0.5).abs() < EPS);
        assert!((wrap_angle(-TAU - 0.5) + 0.5).abs() < EPS);
    }

    #[test]
    fn test_heading_error_across_wrap() {
        // current = 179 deg, target = -179 deg -> +2 deg, not -358 deg
        let error = angle_difference(179f64.to_radians(), (-179f64).to_radians());
        assert!((error.to_degrees() - 2.0).abs() < 1e-9);

        let error = angle_difference((-179f64).to_radians(), 179f64.to_radians());
        assert!((error.to_degrees() + 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_input_modulus() {
        assert!((input_modulus(PI + 0.1, -PI, PI) - (-PI + 0.1)).abs() < EPS);
        assert!((input_modulus(-PI - 0.1, -PI, PI) - (PI - 0.1)).abs() < EPS);
        assert!((input_modulus(0.3, -PI, PI) - 0.3).abs() < EPS);
    }

    #[test]
    fn test_interpolate_takes_short_way() {
        let mid = interpolate_angle(170f64.to_radians(), (-170f64).to_radians(), 0.5);
        assert!((mid.abs() - PI).abs() < 1e-9);
    }
}
