//! Logarithmic index mapping implementation.

use quantsketch_protos::sketch::index_mapping::Interpolation;

use super::{IndexMapping, MappingParams};
use crate::error::SketchError;

/// The memory-optimal index mapping.
///
/// Given a targeted relative accuracy, this mapping requires the fewest keys
/// to cover a given range of values, at the cost of evaluating an exact
/// logarithm for every indexed value.
#[derive(Clone, Debug, PartialEq)]
pub struct LogarithmicMapping {
    params: MappingParams,
}

impl LogarithmicMapping {
    /// Creates a new logarithmic mapping with the given relative accuracy.
    ///
    /// # Errors
    ///
    /// Returns an error if the relative accuracy is not in `(0, 1)`.
    ///
    /// # Example
    ///
    /// ```
    /// use quantsketch::LogarithmicMapping;
    ///
    /// let mapping = LogarithmicMapping::new(0.01).unwrap();
    /// ```
    pub fn new(relative_accuracy: f64) -> Result<Self, SketchError> {
        Self::with_index_offset(relative_accuracy, 0.0)
    }

    /// Creates a new logarithmic mapping with the given relative accuracy and
    /// key offset.
    ///
    /// # Errors
    ///
    /// Returns an error if the relative accuracy is not in `(0, 1)`.
    pub fn with_index_offset(relative_accuracy: f64, index_offset: f64) -> Result<Self, SketchError> {
        let mut params = MappingParams::new(relative_accuracy, index_offset)?;
        params.multiplier *= std::f64::consts::LN_2;
        Ok(Self { params })
    }

    fn log_gamma(&self, value: f64) -> f64 {
        value.log2() * self.params.multiplier
    }

    fn pow_gamma(&self, exponent: f64) -> f64 {
        (exponent / self.params.multiplier).exp2()
    }
}

impl IndexMapping for LogarithmicMapping {
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
        Interpolation::NONE
    }
}
