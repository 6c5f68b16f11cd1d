//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::{Float, FloatConst};

/// Bound a commanded value to a range.
///
/// The range may be given in either order. If the value lies outside the range and
/// `fail_out_of_range` is set `None` is returned, otherwise the value is clamped to the nearest
/// end of the range.
pub fn bound<T>(range: (T, T), value: T, fail_out_of_range: bool) -> Option<T>
where
    T: Float,
{
    let (min, max) = if range.0 <= range.1 {
        range
    } else {
        (range.1, range.0)
    };

    if value >= min && value <= max {
        Some(value)
    } else if fail_out_of_range {
        None
    } else {
        Some(value.max(min).min(max))
    }
}

/// Arithmetic mean of a slice, or `None` if it is empty.
pub fn mean<T>(values: &[T]) -> Option<T>
where
    T: Float,
{
    if values.is_empty() {
        return None;
    }

    let sum = values.iter().fold(T::zero(), |acc, v| acc + *v);

    T::from(values.len()).map(|n| sum / n)
}

/// Get the shortest signed angular distance from `a` to `b`, in the range [-pi, pi].
pub fn get_ang_dist<T>(a: T, b: T) -> T
where
    T: Float + FloatConst,
{
    rem_euclid(b - a + T::PI(), T::PI() + T::PI()) - T::PI()
}

/// Calculates the least nonnegative remainder of `lhs (mod rhs)`.
///
/// This function is taken from the std library as num is missing it.
pub fn rem_euclid<T>(lhs: T, rhs: T) -> T
where
    T: Float,
{
    let r = lhs % rhs;
    if r < T::zero() {
        r + rhs.abs()
    } else {
        r
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_bound() {
        assert_eq!(bound((0.0, 1.0), 0.5, true), Some(0.5));
        assert_eq!(bound((0.0, 1.0), 1.5, true), None);
        assert_eq!(bound((0.0, 1.0), 1.5, false), Some(1.0));
        assert_eq!(bound((0.0, 1.0), -0.5, false), Some(0.0));

        // Reversed ranges come from motors mounted the other way round
        assert_eq!(bound((1.0, -1.0), -2.0, false), Some(-1.0));
        assert_eq!(bound((1.0, -1.0), 0.2, true), Some(0.2));
    }

    #[test]
    fn test_mean() {
        assert_eq!(mean::<f64>(&[]), None);
        assert_eq!(mean(&[1.0, 2.0, 3.0]), Some(2.0));
    }

    #[test]
    fn test_get_ang_dist() {
        const PI: f64 = std::f64::consts::PI;
        const TAU: f64 = std::f64::consts::TAU;

        assert!((get_ang_dist(1f64, 2f64) - 1.0).abs() < 1e-12);
        assert!((get_ang_dist(2f64, 1f64) + 1.0).abs() < 1e-12);
        assert!(get_ang_dist(0f64, TAU).abs() < 1e-12);
        assert!((get_ang_dist(PI - 0.1, -PI + 0.1) - 0.2).abs() < 1e-12);
    }
}
