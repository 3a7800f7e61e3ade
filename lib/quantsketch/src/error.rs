//! Error types for sketch operations.

use std::fmt;

/// Errors that can occur when constructing, mutating, or decoding a sketch.
///
/// Every variant is a precondition failure: the operation that returned it
/// left the sketch in its prior state.
#[derive(Debug, Clone, PartialEq)]
pub enum SketchError {
    /// The relative accuracy passed to a mapping constructor was outside `(0, 1)`.
    InvalidRelativeAccuracy {
        /// The rejected relative accuracy.
        value: f64,
    },

    /// The weight passed to an add operation was not strictly positive.
    InvalidWeight {
        /// The rejected weight.
        weight: f64,
    },

    /// A bin range was out of bounds for the list it was applied to.
    RangeOutOfBounds {
        /// Start of the requested range (inclusive).
        start: usize,
        /// End of the requested range (exclusive).
        end: usize,
        /// Length of the list at the time of the call.
        len: usize,
    },

    /// The decoded message is missing its index mapping.
    MissingMapping,

    /// The decoded message carries an interpolation mode with no
    /// corresponding mapping implementation.
    UnsupportedInterpolation {
        /// The raw interpolation value from the message.
        value: i32,
    },

    /// A decoded bin count was negative.
    NegativeBinCount {
        /// The bin key.
        key: i32,
        /// The negative count value.
        count: f64,
    },

    /// Two sketches with different gamma values cannot be merged.
    UnequalSketchParameters {
        /// Gamma of the sketch being merged into.
        gamma: f64,
        /// Gamma of the other sketch.
        other_gamma: f64,
    },
}

impl fmt::Display for SketchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRelativeAccuracy { value } => {
                write!(f, "relative accuracy must be between 0 and 1 (exclusive), got {}", value)
            }
            Self::InvalidWeight { weight } => {
                write!(f, "weight must be positive, got {}", weight)
            }
            Self::RangeOutOfBounds { start, end, len } => {
                write!(f, "range {}..{} out of bounds for bin list of length {}", start, end, len)
            }
            Self::MissingMapping => write!(f, "message is missing the required index mapping"),
            Self::UnsupportedInterpolation { value } => {
                write!(f, "unsupported interpolation mode: {}", value)
            }
            Self::NegativeBinCount { key, count } => {
                write!(f, "negative bin count at key {}: {}", key, count)
            }
            Self::UnequalSketchParameters { gamma, other_gamma } => {
                write!(
                    f,
                    "cannot merge sketches with different parameters: gamma {} vs {}",
                    gamma, other_gamma
                )
            }
        }
    }
}

impl std::error::Error for SketchError {}
