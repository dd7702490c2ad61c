//! Conversions between the signed and unsigned angle ranges used by the kinematics.

use std::f64::consts::{PI, TAU};

/// Maps an angle onto the signed range `(-π, π]`.
///
/// Any finite input is accepted; values are wrapped modulo a full turn first.
#[must_use]
pub fn map_angle(angle: f64) -> f64 {
    let wrapped = (angle + PI).rem_euclid(TAU) - PI;
    if wrapped <= -PI { wrapped + TAU } else { wrapped }
}

/// Maps a signed angle from `(-π, π]` onto the unsigned range `[0, 2π)`.
#[must_use]
pub fn demap_angle(angle: f64) -> f64 {
    if angle < 0.0 {
        wrap_unsigned(TAU + angle)
    } else {
        angle
    }
}

/// Wraps any finite angle into `[0, 2π)`.
#[must_use]
pub fn wrap_unsigned(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(TAU);
    // rem_euclid may round up to exactly TAU for tiny negative inputs
    if wrapped >= TAU { 0.0 } else { wrapped }
}

/// Element-wise [`map_angle`].
pub fn map_angles(angles: &mut [f64]) {
    for angle in angles {
        *angle = map_angle(*angle);
    }
}

/// Element-wise [`demap_angle`].
pub fn demap_angles(angles: &mut [f64]) {
    for angle in angles {
        *angle = demap_angle(*angle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-9
    }

    fn circular_gap(a: f64, b: f64) -> f64 {
        let gap = (a - b).abs() % TAU;
        gap.min(TAU - gap)
    }

    #[test]
    fn map_angle_covers_boundaries() {
        assert!(approx_eq(map_angle(0.0), 0.0));
        assert!(approx_eq(map_angle(PI), PI));
        assert!(approx_eq(map_angle(-PI), PI));
        assert!(approx_eq(map_angle(1.5 * PI), -0.5 * PI));
        assert!(approx_eq(map_angle(TAU), 0.0));
        assert!(approx_eq(map_angle(-2.5 * PI), -0.5 * PI));
    }

    #[test]
    fn demap_angle_shifts_negatives_only() {
        assert!(approx_eq(demap_angle(0.25), 0.25));
        assert!(approx_eq(demap_angle(PI), PI));
        assert!(approx_eq(demap_angle(-0.5 * PI), 1.5 * PI));
        assert!(demap_angle(-1e-300) < TAU);
    }

    #[test]
    fn slice_helpers_apply_per_element() {
        let mut angles = [1.5 * PI, 0.5 * PI];
        map_angles(&mut angles);
        assert!(approx_eq(angles[0], -0.5 * PI));
        assert!(approx_eq(angles[1], 0.5 * PI));
        demap_angles(&mut angles);
        assert!(approx_eq(angles[0], 1.5 * PI));
        assert!(approx_eq(angles[1], 0.5 * PI));
    }

    #[test]
    fn wrap_unsigned_stays_below_full_turn() {
        assert_eq!(wrap_unsigned(-1e-20), 0.0);
        assert!(approx_eq(wrap_unsigned(TAU + 0.5), 0.5));
        assert!(approx_eq(wrap_unsigned(-0.5), TAU - 0.5));
    }

    proptest! {
        #[test]
        fn signed_round_trip(theta in (-PI + 1e-9)..=PI) {
            prop_assert!(approx_eq(map_angle(demap_angle(theta)), theta));
        }

        #[test]
        fn unsigned_round_trip(theta in 0.0..TAU) {
            let back = demap_angle(map_angle(theta));
            prop_assert!(back >= 0.0 && back < TAU);
            prop_assert!(circular_gap(back, theta) <= 1e-9);
        }

        #[test]
        fn map_angle_lands_in_signed_range(theta in -100.0f64..100.0) {
            let mapped = map_angle(theta);
            prop_assert!(mapped > -PI && mapped <= PI);
        }
    }
}
