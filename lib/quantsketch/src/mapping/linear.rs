//! Linearly interpolated index mapping implementation.

use quantsketch_protos::sketch::index_mapping::Interpolation;

use super::{frexp, ldexp, IndexMapping, MappingParams};
use crate::error::SketchError;

/// A fast index mapping that approximates the base-2 logarithm by reading the
/// exponent out of the floating-point representation and linearly
/// interpolating between consecutive powers of two.
///
/// Cheaper to compute than [`LogarithmicMapping`](super::LogarithmicMapping),
/// at the cost of requiring more keys to cover the same range of values.
#[derive(Clone, Debug, PartialEq)]
pub struct LinearlyInterpolatedMapping {
    params: MappingParams,
}

impl LinearlyInterpolatedMapping {
    /// Creates a new linearly interpolated mapping with the given relative
    /// accuracy.
    ///
    /// # Errors
    ///
    /// Returns an error if the relative accuracy is not in `(0, 1)`.
    pub fn new(relative_accuracy: f64) -> Result<Self, SketchError> {
        Self::with_index_offset(relative_accuracy, 0.0)
    }

    /// Creates a new linearly interpolated mapping with the given relative
    /// accuracy and key offset.
    ///
    /// # Errors
    ///
    /// Returns an error if the relative accuracy is not in `(0, 1)`.
    pub fn with_index_offset(relative_accuracy: f64, index_offset: f64) -> Result<Self, SketchError> {
        let params = MappingParams::new(relative_accuracy, index_offset)?;
        Ok(Self { params })
    }

    /// Approximates `log2(value)` by `s + (e - 1)` where `value = m * 2^e`
    /// with `m` in `[0.5, 1)` and `s = 2m - 1`.
    fn log2_approx(value: f64) -> f64 {
        let (mantissa, exponent) = frexp(value);
        let significand = 2.0 * mantissa - 1.0;
        significand + f64::from(exponent - 1)
    }

    /// Inverse of [`Self::log2_approx`].
    fn exp2_approx(x: f64) -> f64 {
        let exponent = x.floor() + 1.0;
        let mantissa = (x - exponent + 2.0) / 2.0;
        ldexp(mantissa, exponent as i32)
    }

    fn log_gamma(&self, value: f64) -> f64 {
        Self::log2_approx(value) * self.params.multiplier
    }

    fn pow_gamma(&self, exponent: f64) -> f64 {
        Self::exp2_approx(exponent / self.params.multiplier)
    }
}

impl IndexMapping for LinearlyInterpolatedMapping {
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
        Interpolation::LINEAR
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_invalid_accuracy() {
        assert!(LinearlyInterpolatedMapping::new(0.0).is_err());
        assert!(LinearlyInterpolatedMapping::new(1.0).is_err());
    }

    #[test]
    fn test_log2_approx_exact_at_powers_of_two() {
        for exponent in -20..20 {
            let value = 2.0f64.powi(exponent);
            assert_eq!(LinearlyInterpolatedMapping::log2_approx(value), f64::from(exponent));
        }
    }

    #[test]
    fn test_exp2_approx_inverts_log2_approx() {
        let mut value = 1.0e-3;
        while value < 1.0e6 {
            let roundtrip = LinearlyInterpolatedMapping::exp2_approx(LinearlyInterpolatedMapping::log2_approx(value));
            assert!(
                (roundtrip - value).abs() <= value * 1e-12,
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
            let mapping = LinearlyInterpolatedMapping::new(alpha).unwrap();
            let mut value = 1.0e-6;
            while value < 1.0e9 {
                let reconstructed = mapping.value(mapping.key(value));
                let relative_error = (reconstructed - value).abs() / value;
                assert!(
                    relative_error <= alpha + 1e-12,
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
        let mapping = LinearlyInterpolatedMapping::new(0.02).unwrap();
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
        let mapping = LinearlyInterpolatedMapping::new(0.01).unwrap();
        assert_eq!(mapping.interpolation(), Interpolation::LINEAR);
    }
}
