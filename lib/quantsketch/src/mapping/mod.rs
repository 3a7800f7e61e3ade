//! Index mappings between values and bin keys.
//!
//! An index mapping assigns every positive value to an integer bin key such
//! that the value reconstructed from the key is within a fixed relative error
//! of the original. The most memory-efficient mapping computes an exact
//! base-gamma logarithm; the interpolated mappings trade a few extra bins for
//! a cheaper approximation of it.

use protobuf::EnumOrUnknown;
use quantsketch_protos::sketch::index_mapping::Interpolation;
use quantsketch_protos::sketch::IndexMapping as ProtoIndexMapping;

use crate::error::SketchError;

mod cubic;
pub use self::cubic::CubicallyInterpolatedMapping;

mod linear;
pub use self::linear::LinearlyInterpolatedMapping;

mod logarithmic;
pub use self::logarithmic::LogarithmicMapping;

/// Maps positive values to integer bin keys and back.
///
/// For any value `v` with `min_indexable_value() < v <= max_indexable_value()`,
/// implementations guarantee that `value(key(v))` is within
/// `relative_accuracy() * v` of `v`.
pub trait IndexMapping: Clone + Send + Sync {
    /// Returns the bin key for the given positive value.
    ///
    /// The caller must ensure the value is within the indexable range; for
    /// negative values, use the key of the absolute value and a dedicated
    /// negative store.
    fn key(&self, value: f64) -> i32;

    /// Returns the representative value of the bin at the given key.
    ///
    /// This is the midpoint of the bin, which minimizes the worst-case
    /// relative error of the reconstruction.
    fn value(&self, key: i32) -> f64;

    /// Returns the relative accuracy guaranteed by this mapping.
    fn relative_accuracy(&self) -> f64;

    /// Returns the gamma value (geometric bin base) of this mapping.
    ///
    /// Two sketches can be merged only if their gamma values are equal.
    fn gamma(&self) -> f64;

    /// Returns the offset applied to all bin keys.
    fn index_offset(&self) -> f64;

    /// Returns the smallest positive value this mapping can distinguish from zero.
    fn min_indexable_value(&self) -> f64;

    /// Returns the largest value this mapping can handle.
    fn max_indexable_value(&self) -> f64;

    /// Returns the wire discriminator identifying this mapping variant.
    fn interpolation(&self) -> Interpolation;

    /// Converts this mapping to its wire representation.
    fn to_proto(&self) -> ProtoIndexMapping {
        let mut proto = ProtoIndexMapping::new();
        proto.alpha = self.relative_accuracy();
        proto.indexOffset = self.index_offset();
        proto.interpolation = EnumOrUnknown::new(self.interpolation());
        proto
    }
}

/// Parameters shared by every mapping variant.
///
/// The multiplier starts out as `1 / ln(gamma)`; each variant rescales it at
/// construction so that its base-2 logarithm approximation, multiplied by the
/// adjusted value, yields the base-gamma logarithm.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct MappingParams {
    pub(crate) relative_accuracy: f64,
    pub(crate) gamma: f64,
    pub(crate) index_offset: f64,
    pub(crate) multiplier: f64,
    pub(crate) min_indexable_value: f64,
    pub(crate) max_indexable_value: f64,
}

impl MappingParams {
    pub(crate) fn new(relative_accuracy: f64, index_offset: f64) -> Result<Self, SketchError> {
        if relative_accuracy <= 0.0 || relative_accuracy >= 1.0 {
            return Err(SketchError::InvalidRelativeAccuracy {
                value: relative_accuracy,
            });
        }

        let gamma = (1.0 + relative_accuracy) / (1.0 - relative_accuracy);
        Ok(Self {
            relative_accuracy,
            gamma,
            index_offset,
            multiplier: 1.0 / gamma.ln(),
            // The smallest positive normal magnitude, deliberately not the
            // smallest subnormal: the subnormal range cannot hold the
            // relative-accuracy guarantee.
            min_indexable_value: f64::MIN_POSITIVE * gamma,
            max_indexable_value: f64::MAX / gamma,
        })
    }

    /// Quantizes a base-gamma logarithm into a bin key.
    ///
    /// The ceiling assigns each key `k` the half-open interval
    /// `(gamma^(k-1), gamma^k]`.
    #[inline]
    pub(crate) fn key_for(&self, log_gamma: f64) -> i32 {
        (log_gamma.ceil() + self.index_offset) as i32
    }

    /// Returns the exponent to feed the variant's `pow_gamma` for a key.
    #[inline]
    pub(crate) fn pow_exponent(&self, key: i32) -> f64 {
        f64::from(key) - self.index_offset
    }

    /// Scales `gamma^k` (the upper bound of bin `k`) down to the bin midpoint.
    #[inline]
    pub(crate) fn bin_midpoint(&self, pow_gamma: f64) -> f64 {
        pow_gamma * 2.0 / (1.0 + self.gamma)
    }
}

/// Decomposes a positive normal `value` into `(mantissa, exponent)` such that
/// `value = mantissa * 2^exponent` with `mantissa` in `[0.5, 1)`.
///
/// Inputs are guaranteed normal by the indexable range, which excludes
/// subnormals by construction.
#[inline]
pub(crate) fn frexp(value: f64) -> (f64, i32) {
    let bits = value.to_bits();
    let exponent = ((bits >> 52) & 0x7ff) as i32 - 1022;
    let mantissa = f64::from_bits((bits & 0x000f_ffff_ffff_ffff) | (0x3feu64 << 52));
    (mantissa, exponent)
}

/// Computes `mantissa * 2^exponent`.
///
/// Exponents in `[-1021, 1024]`, which cover everything a valid key can
/// produce, are assembled directly from the bit pattern of `2^(exponent-1)`
/// so that results near the top of the representable range stay finite.
#[inline]
pub(crate) fn ldexp(mantissa: f64, exponent: i32) -> f64 {
    if !(-1021..=1024).contains(&exponent) {
        return mantissa * f64::from(exponent).exp2();
    }
    mantissa * f64::from_bits(u64::from((exponent + 1022) as u32) << 52) * 2.0
}

/// An index mapping whose variant is selected at runtime.
///
/// This is the mapping type produced by decoding a wire message, where the
/// interpolation discriminator picks the implementation.
#[derive(Clone, Debug, PartialEq)]
pub enum AnyIndexMapping {
    /// Exact base-gamma logarithm.
    Logarithmic(LogarithmicMapping),
    /// Linearly interpolated base-2 logarithm.
    LinearlyInterpolated(LinearlyInterpolatedMapping),
    /// Cubically interpolated base-2 logarithm.
    CubicallyInterpolated(CubicallyInterpolatedMapping),
}

impl AnyIndexMapping {
    /// Builds the mapping described by a wire message.
    ///
    /// # Errors
    ///
    /// Returns an error if the interpolation mode has no corresponding
    /// implementation, or if the message's relative accuracy is invalid.
    pub fn from_proto(proto: &ProtoIndexMapping) -> Result<Self, SketchError> {
        match proto.interpolation.enum_value() {
            Ok(Interpolation::NONE) => {
                LogarithmicMapping::with_index_offset(proto.alpha, proto.indexOffset).map(Self::Logarithmic)
            }
            Ok(Interpolation::LINEAR) => {
                LinearlyInterpolatedMapping::with_index_offset(proto.alpha, proto.indexOffset)
                    .map(Self::LinearlyInterpolated)
            }
            Ok(Interpolation::CUBIC) => {
                CubicallyInterpolatedMapping::with_index_offset(proto.alpha, proto.indexOffset)
                    .map(Self::CubicallyInterpolated)
            }
            Ok(other) => Err(SketchError::UnsupportedInterpolation { value: other as i32 }),
            Err(raw) => Err(SketchError::UnsupportedInterpolation { value: raw }),
        }
    }
}

macro_rules! delegate_to_variant {
    ($self:expr, $mapping:ident => $body:expr) => {
        match $self {
            AnyIndexMapping::Logarithmic($mapping) => $body,
            AnyIndexMapping::LinearlyInterpolated($mapping) => $body,
            AnyIndexMapping::CubicallyInterpolated($mapping) => $body,
        }
    };
}

impl IndexMapping for AnyIndexMapping {
    fn key(&self, value: f64) -> i32 {
        delegate_to_variant!(self, m => m.key(value))
    }

    fn value(&self, key: i32) -> f64 {
        delegate_to_variant!(self, m => m.value(key))
    }

    fn relative_accuracy(&self) -> f64 {
        delegate_to_variant!(self, m => m.relative_accuracy())
    }

    fn gamma(&self) -> f64 {
        delegate_to_variant!(self, m => m.gamma())
    }

    fn index_offset(&self) -> f64 {
        delegate_to_variant!(self, m => m.index_offset())
    }

    fn min_indexable_value(&self) -> f64 {
        delegate_to_variant!(self, m => m.min_indexable_value())
    }

    fn max_indexable_value(&self) -> f64 {
        delegate_to_variant!(self, m => m.max_indexable_value())
    }

    fn interpolation(&self) -> Interpolation {
        delegate_to_variant!(self, m => m.interpolation())
    }
}
