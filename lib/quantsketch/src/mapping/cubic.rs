//! Cubically interpolated index mapping implementation.

use quantsketch_protos::sketch::index_mapping::Interpolation;

use super::{frexp, ldexp, IndexMapping, MappingParams};
use crate::error::SketchError;

/// A fast index mapping that approximates the base-2 logarithm by reading the
/// exponent out of the floating-point representation and cubically
/// interpolating between consecutive powers of two.
///
/// Faster than [`LogarithmicMapping`](super::LogarithmicMapping) while
/// requiring fewer keys than
/// [`LinearlyInterpolatedMapping`](super::LinearlyInterpolatedMapping).
#[derive(Clone, Debug, PartialEq)]
pub struct CubicallyInterpolatedMapping {
    params: MappingParams,
}

impl CubicallyInterpolatedMapping {
    const A: f64 = 6.0 / 35.0;
    const B: f64 = -3.0 / 5.0;
    const C: f64 = 10.0 / 7.0;

    /// Creates a new cubically interpolated mapping with the given relative
    /// accuracy.
    ///
    /// # Errors
    ///
    /// Returns an error if the relative accuracy is not in `(0, 1)`.
    pub fn new(relative_accuracy: f64) -> Result<Self, SketchError> {
        Self::with_index_offset(relative_accuracy, 0.0)
    }

    /// Creates a new cubically interpolated mapping with the given relative
    /// accuracy and key offset.
    ///
    /// # Errors
    ///
    /// Returns an error if the relative accuracy is not in `(0, 1)`.
    pub fn with_index_offset(relative_accuracy: f64, index_offset: f64) -> Result<Self, SketchError> {
        let mut params = MappingParams::new(relative_accuracy, index_offset)?;
        params.multiplier /= Self::C;
        Ok(Self { params })
    }

    /// Approximates `log2(value)` by a cubic polynomial of the significand.
    fn log2_approx(value: f64) -> f64 {
        let (mantissa, exponent) = frexp(value);
        let significand = 2.0 * mantissa - 1.0;
        ((Self::A * significand + Self::B) * significand + Self::C) * significand + f64::from(exponent - 1)
    }

    /// Inverse of [`Self::log2_approx`], solving the cubic with Cardano's
    /// formula.
    fn exp2_approx(x: f64) -> f64 {
        let floor_x = x.floor();
        let exponent = floor_x as i32;
        let delta_0 = Self::B * Self::B - 3.0 * Self::A * Self::C;
        let delta_1 = 2.0 * Self::B * Self::B * Self::B
            - 9.0 * Self::A * Self::B * Self::C
            - 27.0 * Self::A * Self::A * (x - floor_x);
        let cardano = ((delta_1 - (delta_1 * delta_1 - 4.0 * delta_0 * delta_0 * delta_0).sqrt()) / 2.0).cbrt();
        let significand_plus_one = -(Self::B + cardano + delta_0 / cardano) / (3.0 * Self::A) + 1.0;
        ldexp(significand_plus_one / 2.0, exponent + 1)
    }

    fn log_gamma(&self, value: f64) -> f64 {
        Self::log2_approx(value) * self.params.multiplier
    }

    fn pow_gamma(&self, exponent: f64) -> f64 {
        Self::exp2_approx(exponent / self.params.multiplier)
    }
}

impl IndexMapping for CubicallyInterpolatedMapping {
    fn key(&self, value: f64) -> i32 {
        self.params.key_for(self.log_gamma(value))
    }

    fn value(&self, key: i32) -> f64 {
        self.params.bin_midpoint(self.pow_gamma(self.params.pow_exponent(key)))
    }

    fn relative_accuracy(&self) -> f64 {
        self.params.relative_accuracy
    }

    fn gamma(&self) -> f64 {
        self.params.gamma
    }

    fn index_offset(&self) -> f64 {
        self.params.index_offset
    }

    fn min_indexable_value(&self) -> f64 {
        self.params.min_indexable_value
    }

    fn max_indexable_value(&self) -> f64 {
        self.params.max_indexable_value
    }

    fn interpolation(&self) -> Interpolation {
        Interpolation::CUBIC
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_invalid_accuracy() {
        assert!(CubicallyInterpolatedMapping::new(0.0).is_err());
        assert!(CubicallyInterpolatedMapping::new(1.0).is_err());
    }

    #[test]
    fn test_log2_approx_exact_at_powers_of_two() {
        for exponent in -20..20 {
            let value = 2.0f64.powi(exponent);
            let approx = CubicallyInterpolatedMapping::log2_approx(value);
            assert!(
                (approx - f64::from(exponent)).abs() < 1e-12,
                "log2_approx(2^{}) = {}",
                exponent,
                approx
            );
        }
    }

    #[test]
    fn test_exp2_approx_inverts_log2_approx() {
        let mut value = 1.0e-3;
        while value < 1.0e6 {
            let roundtrip =
                CubicallyInterpolatedMapping::exp2_approx(CubicallyInterpolatedMapping::log2_approx(value));
            assert!(
                (roundtrip - value).abs() <= value * 1e-9,
                "{} round-tripped to {}",
                value,
                roundtrip
            );
            value *= 1.9;
        }
    }

    #[test]
    fn test_value_key_roundtrip_within_accuracy() {
        for alpha in [0.001, 0.01, 0.05, 0.2] {
            let mapping = CubicallyInterpolatedMapping::new(alpha).unwrap();
            let mut value = 1.0e-6;
            while value < 1.0e9 {
                let reconstructed = mapping.value(mapping.key(value));
                let relative_error = (reconstructed - value).abs() / value;
                assert!(
                    relative_error <= alpha + 1e-9,
                    "alpha {}: value {} reconstructed as {} (error {})",
                    alpha,
                    value,
                    reconstructed,
                    relative_error
                );
                value *= 1.7;
            }
        }
    }

    #[test]
    fn test_key_monotonicity() {
        let mapping = CubicallyInterpolatedMapping::new(0.02).unwrap();
        let mut previous = mapping.key(0.001);
        let mut value = 0.0011;
        while value < 1.0e6 {
            let key = mapping.key(value);
            assert!(key >= previous, "key({}) = {} < {}", value, key, previous);
            previous = key;
            value *= 1.3;
        }
    }

    #[test]
    fn test_interpolation_tag() {
        let mapping = CubicallyInterpolatedMapping::new(0.01).unwrap();
        assert_eq!(mapping.interpolation(), Interpolation::CUBIC);
    }
}
