//! Exponential follow filter
//!
//! Decouples how often a value is *set* from how often it is *read*: targets
//! can arrive at simulation cadence while the smoothed value is advanced at
//! display cadence.

use std::fmt;

/// Default time constant in seconds
pub const DEFAULT_MASS: f32 = 0.2;

/// Interpolates a scalar toward a target, independent of the update rate.
///
/// Each [`advance`](Self::advance) moves the smoothed value by
/// `dt / mass` of the remaining distance. The factor is not clamped, so a
/// `dt` larger than `mass` overshoots; callers keep `dt` small relative to
/// `mass`.
#[derive(Debug, Clone, PartialEq)]
pub struct SmoothFollow {
    mass: f32,
    value: f32,
    value_smooth: f32,
    pristine: bool,
}

impl SmoothFollow {
    /// Create a filter resting at `value`
    pub fn new(value: f32, mass: f32) -> Self {
        Self {
            mass: mass.max(0.0),
            value,
            value_smooth: value,
            pristine: true,
        }
    }

    /// Change the time constant; negative values are treated as zero
    pub fn set_mass(&mut self, mass: f32) -> &mut Self {
        self.mass = mass.max(0.0);
        self
    }

    pub fn mass(&self) -> f32 {
        self.mass
    }

    /// Update the target.
    ///
    /// The first call also jumps the smoothed value to the target so a node
    /// does not glide in from the default origin.
    pub fn set(&mut self, value: f32) {
        if self.pristine {
            self.pristine = false;
            self.reset(value);
        } else {
            self.value = value;
        }
    }

    /// Current target
    pub fn target(&self) -> f32 {
        self.value
    }

    /// Force both target and smoothed value to `value`
    pub fn reset(&mut self, value: f32) {
        self.value = value;
        self.value_smooth = value;
    }

    /// Current interpolated value
    pub fn smooth(&self) -> f32 {
        self.value_smooth
    }

    /// Advance the smoothed value by `dt` seconds
    pub fn advance(&mut self, dt: f32) -> &mut Self {
        if self.mass == 0.0 {
            self.value_smooth = self.value;
        } else {
            self.value_smooth = lerp(self.value_smooth, self.value, dt / self.mass);
        }
        self
    }
}

impl Default for SmoothFollow {
    fn default() -> Self {
        Self::new(0.0, DEFAULT_MASS)
    }
}

impl fmt::Display for SmoothFollow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SmoothFollow | value: {}, smooth: {}",
            self.value, self.value_smooth
        )
    }
}

fn lerp(from: f32, to: f32, t: f32) -> f32 {
    from + t * (to - from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_set_resets_smoothed_value() {
        let mut follow = SmoothFollow::default();
        follow.set(400.0);
        assert_eq!(follow.smooth(), 400.0);
        assert_eq!(follow.target(), 400.0);

        follow.set(500.0);
        assert_eq!(follow.smooth(), 400.0);
        assert_eq!(follow.target(), 500.0);
    }

    #[test]
    fn zero_mass_snaps_to_target() {
        let mut follow = SmoothFollow::new(0.0, 0.0);
        follow.set(1.0);
        for target in [10.0, -3.5, 42.0] {
            follow.set(target);
            follow.advance(1.0 / 60.0);
            assert_eq!(follow.smooth(), target);
        }
    }

    #[test]
    fn approaches_target_monotonically_without_overshoot() {
        let mut follow = SmoothFollow::new(0.0, 0.2);
        follow.set(0.0);
        follow.set(100.0);

        let mut previous = follow.smooth();
        for _ in 0..600 {
            follow.advance(1.0 / 60.0);
            let current = follow.smooth();
            assert!(current >= previous, "{current} < {previous}");
            assert!(current <= 100.0, "overshoot: {current}");
            previous = current;
        }
        assert!((100.0 - follow.smooth()).abs() < 1e-3);
    }

    #[test]
    fn factor_of_one_lands_exactly() {
        let mut follow = SmoothFollow::new(0.0, 0.5);
        follow.set(0.0);
        follow.set(8.0);
        follow.advance(0.5);
        assert_eq!(follow.smooth(), 8.0);
    }

    #[test]
    fn reset_removes_catch_up() {
        let mut follow = SmoothFollow::new(0.0, 0.2);
        follow.set(0.0);
        follow.set(50.0);
        follow.advance(0.01);
        follow.reset(12.0);
        follow.advance(0.01);
        assert_eq!(follow.smooth(), 12.0);
        assert_eq!(follow.target(), 12.0);
    }

    #[test]
    fn negative_mass_is_clamped() {
        let mut follow = SmoothFollow::default();
        follow.set_mass(-1.0);
        assert_eq!(follow.mass(), 0.0);
    }

    #[test]
    fn display_shows_both_values() {
        let mut follow = SmoothFollow::new(0.0, 0.0);
        follow.set(2.5);
        insta::assert_snapshot!(follow.to_string(), @"SmoothFollow | value: 2.5, smooth: 2.5");
    }
}
