// Module states and angle math
//
// Angles are plain degrees. The angle controllers are not continuous, so an
// optimized target is expressed in the same 360° window as the current
// angle rather than wrapped to a canonical range.

use serde::{Deserialize, Serialize};

/// Target or measured state of one module
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ModuleState {
    /// Wheel speed (m/s), signed
    pub speed: f64,
    /// Wheel heading (degrees)
    pub angle: f64,
}

impl ModuleState {
    pub fn new(speed: f64, angle: f64) -> Self {
        Self { speed, angle }
    }
}

/// Accumulated drive distance and absolute heading of one module
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ModulePosition {
    /// Drive distance (m)
    pub distance: f64,
    /// Heading (degrees)
    pub angle: f64,
}

/// Wrap into [0, 360)
pub fn normalize_degrees(degrees: f64) -> f64 {
    degrees.rem_euclid(360.0)
}

/// Shortest signed rotation from `from` to `to`, in (-180, 180]
pub fn angular_delta(from: f64, to: f64) -> f64 {
    let delta = (to - from).rem_euclid(360.0);
    if delta > 180.0 { delta - 360.0 } else { delta }
}

/// Bound the rotation a module needs to at most 90°
///
/// When the shortest path to the target heading is more than 90° away the
/// wheel turns to the opposite heading and drives backwards instead. A delta
/// of exactly 90° keeps the literal heading.
pub fn optimize(desired: ModuleState, current_angle: f64) -> ModuleState {
    let delta = angular_delta(current_angle, desired.angle);
    if delta.abs() > 90.0 {
        let flipped = if delta > 0.0 { delta - 180.0 } else { delta + 180.0 };
        ModuleState::new(-desired.speed, current_angle + flipped)
    } else {
        ModuleState::new(desired.speed, current_angle + delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn same_heading(a: f64, b: f64) -> bool {
        angular_delta(a, b).abs() < 1e-6
    }

    #[test]
    fn test_angular_delta_range() {
        assert_eq!(angular_delta(0.0, 180.0), 180.0);
        assert_eq!(angular_delta(0.0, -180.0), 180.0);
        assert!((angular_delta(350.0, 10.0) - 20.0).abs() < EPS);
        assert!((angular_delta(10.0, 350.0) + 20.0).abs() < EPS);
        assert!((angular_delta(720.0, 5.0) - 5.0).abs() < EPS);
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize_degrees(-10.0), 350.0);
        assert_eq!(normalize_degrees(360.0), 0.0);
        assert_eq!(normalize_degrees(725.0), 5.0);
    }

    #[test]
    fn test_optimize_flips_large_delta() {
        // 10° -> 170° is a 160° turn; reverse and aim at 350° instead
        let optimized = optimize(ModuleState::new(2.0, 170.0), 10.0);
        assert_eq!(optimized.speed, -2.0);
        assert!((optimized.angle - -10.0).abs() < EPS);
        assert!((normalize_degrees(optimized.angle) - 350.0).abs() < EPS);
    }

    #[test]
    fn test_optimize_exact_quarter_turn_keeps_heading() {
        let optimized = optimize(ModuleState::new(1.0, 90.0), 0.0);
        assert_eq!(optimized, ModuleState::new(1.0, 90.0));

        let optimized = optimize(ModuleState::new(1.0, -90.0), 0.0);
        assert_eq!(optimized, ModuleState::new(1.0, -90.0));
    }

    #[test]
    fn test_optimize_just_past_quarter_turn_flips() {
        let optimized = optimize(ModuleState::new(1.0, 90.0001), 0.0);
        assert_eq!(optimized.speed, -1.0);
        assert!(same_heading(optimized.angle, 270.0001));
    }

    #[test]
    fn test_optimize_same_angle_passes_through() {
        let optimized = optimize(ModuleState::new(0.7, 45.0), 45.0);
        assert_eq!(optimized, ModuleState::new(0.7, 45.0));
    }

    #[test]
    fn test_optimize_stays_in_current_window() {
        // Continuous encoder past one revolution: target stays next to it
        let optimized = optimize(ModuleState::new(1.0, 20.0), 370.0);
        assert_eq!(optimized.speed, 1.0);
        assert!((optimized.angle - 380.0).abs() < EPS);
    }

    #[test]
    fn test_optimize_bound_over_grid() {
        for current in (-720..=720).step_by(15) {
            for target in (-360..=360).step_by(7) {
                let current = current as f64 + 0.25;
                let target = target as f64;
                let desired = ModuleState::new(1.5, target);
                let optimized = optimize(desired, current);

                let travel = optimized.angle - current;
                assert!(travel.abs() <= 90.0 + EPS, "{current} -> {target}: travel {travel}");

                if angular_delta(current, target).abs() > 90.0 {
                    assert_eq!(optimized.speed, -1.5);
                    assert!(same_heading(optimized.angle, normalize_degrees(target + 180.0)));
                } else {
                    assert_eq!(optimized.speed, 1.5);
                    assert!(same_heading(optimized.angle, target));
                }
            }
        }
    }
}
