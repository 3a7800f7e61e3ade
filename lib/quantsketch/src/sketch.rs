//! The sketch aggregator.

use quantsketch_protos::sketch::DDSketch as ProtoDDSketch;

use crate::error::SketchError;
use crate::mapping::{AnyIndexMapping, IndexMapping, LogarithmicMapping};
use crate::store::{
    CollapsingHighestDenseStore, CollapsingLowestDenseStore, DenseStore, Store, DEFAULT_BIN_LIMIT,
};

/// A fast, fully-mergeable quantile sketch with relative-error guarantees.
///
/// The sketch routes each sample to one of three places: values above the
/// mapping's minimum indexable magnitude go into a positive store keyed by
/// the mapping, values below its negation go into a negative store keyed by
/// the mapping of their absolute value, and everything in between counts as
/// zero. Quantile queries walk the negative store, the zero band, and the
/// positive store in rank order.
///
/// Two sketches can be merged whenever their gamma values are equal; the
/// merged sketch summarizes the union of both streams.
///
/// # Example
///
/// ```
/// use quantsketch::DDSketch;
///
/// let mut sketch = DDSketch::with_relative_accuracy(0.01).unwrap();
/// sketch.add(1.0).unwrap();
/// sketch.add(2.0).unwrap();
/// sketch.add(3.0).unwrap();
///
/// let median = sketch.get_quantile_value(0.5);
/// assert!((median - 2.0).abs() <= 0.02 * 2.0);
/// ```
#[derive(Clone, Debug)]
pub struct DDSketch<M: IndexMapping = LogarithmicMapping, S: Store = DenseStore> {
    /// Maps values to store keys and back.
    mapping: M,

    /// Store for positive values.
    positive_store: S,

    /// Store for negative values, keyed by absolute value.
    negative_store: S,

    /// Total weight of values in the zero band.
    zero_count: f64,

    /// Total weight of all values.
    count: f64,

    /// The smallest value seen.
    min: f64,

    /// The largest value seen.
    max: f64,

    /// The weighted sum of all values.
    sum: f64,
}

/// Falls back to the default bin cap when none is given.
fn effective_bin_limit(bin_limit: usize) -> usize {
    if bin_limit > 0 {
        bin_limit
    } else {
        DEFAULT_BIN_LIMIT
    }
}

impl DDSketch<LogarithmicMapping, DenseStore> {
    /// Creates a sketch with the given relative accuracy, using unbounded
    /// dense stores.
    ///
    /// Memory use is proportional to the observed key span, which stays
    /// reasonable unless the data is distributed with tails heavier than any
    /// subexponential.
    ///
    /// # Errors
    ///
    /// Returns an error if the relative accuracy is not in `(0, 1)`.
    pub fn with_relative_accuracy(relative_accuracy: f64) -> Result<Self, SketchError> {
        let mapping = LogarithmicMapping::new(relative_accuracy)?;
        Ok(Self::new(mapping, DenseStore::new(), DenseStore::new()))
    }
}

impl DDSketch<LogarithmicMapping, CollapsingLowestDenseStore> {
    /// Creates a sketch with the given relative accuracy, capping each store
    /// at `bin_limit` bins by collapsing the lowest bins.
    ///
    /// A `bin_limit` of zero selects the default of 2048 bins. Once the cap
    /// is hit, accuracy is lost on the lowest quantiles only.
    ///
    /// # Errors
    ///
    /// Returns an error if the relative accuracy is not in `(0, 1)`.
    pub fn collapsing_lowest_with_relative_accuracy(
        relative_accuracy: f64, bin_limit: usize,
    ) -> Result<Self, SketchError> {
        let mapping = LogarithmicMapping::new(relative_accuracy)?;
        let bin_limit = effective_bin_limit(bin_limit);
        Ok(Self::new(
            mapping,
            CollapsingLowestDenseStore::new(bin_limit),
            CollapsingLowestDenseStore::new(bin_limit),
        ))
    }
}

impl DDSketch<LogarithmicMapping, CollapsingHighestDenseStore> {
    /// Creates a sketch with the given relative accuracy, capping each store
    /// at `bin_limit` bins by collapsing the highest bins.
    ///
    /// A `bin_limit` of zero selects the default of 2048 bins. Once the cap
    /// is hit, accuracy is lost on the highest quantiles only.
    ///
    /// # Errors
    ///
    /// Returns an error if the relative accuracy is not in `(0, 1)`.
    pub fn collapsing_highest_with_relative_accuracy(
        relative_accuracy: f64, bin_limit: usize,
    ) -> Result<Self, SketchError> {
        let mapping = LogarithmicMapping::new(relative_accuracy)?;
        let bin_limit = effective_bin_limit(bin_limit);
        Ok(Self::new(
            mapping,
            CollapsingHighestDenseStore::new(bin_limit),
            CollapsingHighestDenseStore::new(bin_limit),
        ))
    }
}

impl<M: IndexMapping, S: Store> DDSketch<M, S> {
    /// Creates a sketch from a mapping and a pair of stores.
    pub fn new(mapping: M, positive_store: S, negative_store: S) -> Self {
        Self {
            mapping,
            positive_store,
            negative_store,
            zero_count: 0.0,
            count: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            sum: 0.0,
        }
    }

    /// Adds a value to the sketch.
    ///
    /// # Errors
    ///
    /// Never fails for a unit weight; the `Result` mirrors
    /// [`add_weighted`](Self::add_weighted).
    pub fn add(&mut self, value: f64) -> Result<(), SketchError> {
        self.add_weighted(value, 1.0)
    }

    /// Adds a value to the sketch with the given weight.
    ///
    /// Weights need not be integral, which is why every count this sketch
    /// reports is a real number.
    ///
    /// # Errors
    ///
    /// Returns an error if the weight is not strictly positive.
    pub fn add_weighted(&mut self, value: f64, weight: f64) -> Result<(), SketchError> {
        if weight <= 0.0 || weight.is_nan() {
            return Err(SketchError::InvalidWeight { weight });
        }

        if value > self.mapping.min_indexable_value() {
            self.positive_store.add(self.mapping.key(value), weight);
        } else if value < -self.mapping.min_indexable_value() {
            self.negative_store.add(self.mapping.key(-value), weight);
        } else {
            self.zero_count += weight;
        }

        self.count += weight;
        self.sum += value * weight;

        if value < self.min {
            self.min = value;
        }

        if value > self.max {
            self.max = value;
        }

        Ok(())
    }

    /// Returns the approximate value at the given quantile, or NaN if the
    /// sketch is empty or the quantile is outside `[0, 1]`.
    pub fn get_quantile_value(&self, quantile: f64) -> f64 {
        if !(0.0..=1.0).contains(&quantile) || self.count == 0.0 {
            return f64::NAN;
        }

        let rank = quantile * (self.count - 1.0);
        let negative_count = self.negative_store.total_count();

        if rank < negative_count {
            // Negation reverses rank order: scanning negative bins by
            // increasing key walks values from least to most negative, so the
            // rank is reversed and the upper rank convention is used.
            let reversed_rank = negative_count - rank - 1.0;
            -self.mapping.value(self.negative_store.key_at_rank(reversed_rank, false))
        } else if rank < self.zero_count + negative_count {
            0.0
        } else {
            self.mapping
                .value(self.positive_store.key_at_rank(rank - self.zero_count - negative_count, true))
        }
    }

    /// Merges another sketch into this one, so that this sketch summarizes
    /// the values added to either.
    ///
    /// # Errors
    ///
    /// Returns an error if the two sketches have different gamma values.
    pub fn merge(&mut self, other: &Self) -> Result<(), SketchError> {
        if self.mapping.gamma() != other.mapping.gamma() {
            return Err(SketchError::UnequalSketchParameters {
                gamma: self.mapping.gamma(),
                other_gamma: other.mapping.gamma(),
            });
        }

        if other.count == 0.0 {
            return Ok(());
        }

        if self.count == 0.0 {
            self.copy_from(other);
            return Ok(());
        }

        self.positive_store.merge(&other.positive_store);
        self.negative_store.merge(&other.negative_store);
        self.zero_count += other.zero_count;

        self.count += other.count;
        self.sum += other.sum;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);

        Ok(())
    }

    /// Replaces the stores and summary statistics with deep copies of the
    /// other sketch's, keeping this sketch's own mapping.
    fn copy_from(&mut self, other: &Self) {
        self.positive_store = other.positive_store.clone();
        self.negative_store = other.negative_store.clone();
        self.zero_count = other.zero_count;
        self.count = other.count;
        self.sum = other.sum;
        self.min = other.min;
        self.max = other.max;
    }

    /// Returns the total weight of the values added to the sketch.
    pub fn num_values(&self) -> f64 {
        self.count
    }

    /// Returns the weighted sum of the values added to the sketch.
    ///
    /// The sum accumulates rounding error; it is a convenience summary, not a
    /// precision guarantee.
    pub fn sum(&self) -> f64 {
        self.sum
    }

    /// Returns the weighted average of the values added to the sketch.
    ///
    /// Meaningless on an empty sketch; callers check
    /// [`is_empty`](Self::is_empty) first.
    pub fn avg(&self) -> f64 {
        self.sum / self.count
    }

    /// Returns the smallest value seen, or `+inf` on an empty sketch.
    pub fn min(&self) -> f64 {
        self.min
    }

    /// Returns the largest value seen, or `-inf` on an empty sketch.
    pub fn max(&self) -> f64 {
        self.max
    }

    /// Returns the total weight of the values in the zero band.
    pub fn zero_count(&self) -> f64 {
        self.zero_count
    }

    /// Returns `true` if no values have been added.
    pub fn is_empty(&self) -> bool {
        self.count == 0.0
    }

    /// Returns a reference to the index mapping.
    pub fn mapping(&self) -> &M {
        &self.mapping
    }

    /// Returns a reference to the positive value store.
    pub fn positive_store(&self) -> &S {
        &self.positive_store
    }

    /// Returns a reference to the negative value store.
    pub fn negative_store(&self) -> &S {
        &self.negative_store
    }

    /// Returns the relative accuracy of this sketch's mapping.
    pub fn relative_accuracy(&self) -> f64 {
        self.mapping.relative_accuracy()
    }

    /// Clears the sketch, removing all values.
    pub fn clear(&mut self) {
        self.positive_store.clear();
        self.negative_store.clear();
        self.zero_count = 0.0;
        self.count = 0.0;
        self.sum = 0.0;
        self.min = f64::INFINITY;
        self.max = f64::NEG_INFINITY;
    }

    /// Converts this sketch to its wire representation.
    pub fn to_proto(&self) -> ProtoDDSketch {
        let mut proto = ProtoDDSketch::new();

        proto.set_mapping(self.mapping.to_proto());
        proto.set_positiveValues(self.positive_store.to_proto());
        proto.set_negativeValues(self.negative_store.to_proto());
        proto.zeroCount = self.zero_count;
        proto.count = self.count;
        proto.min = self.min;
        proto.max = self.max;
        proto.sum = self.sum;

        proto
    }
}

impl DDSketch<AnyIndexMapping, DenseStore> {
    /// Rebuilds a sketch from its wire representation, using unbounded dense
    /// stores.
    ///
    /// The mapping variant is selected by the message's interpolation
    /// discriminator. Both the sparse and the contiguous store encodings are
    /// accepted.
    ///
    /// # Errors
    ///
    /// Returns an error if the mapping is missing, its interpolation mode is
    /// unsupported, its relative accuracy is invalid, or any bin count is
    /// negative.
    pub fn from_proto(proto: &ProtoDDSketch) -> Result<Self, SketchError> {
        let proto_mapping = proto.mapping.as_ref().ok_or(SketchError::MissingMapping)?;
        let mapping = AnyIndexMapping::from_proto(proto_mapping)?;

        let mut positive_store = DenseStore::new();
        if let Some(proto_store) = proto.positiveValues.as_ref() {
            positive_store.merge_from_proto(proto_store)?;
        }

        let mut negative_store = DenseStore::new();
        if let Some(proto_store) = proto.negativeValues.as_ref() {
            negative_store.merge_from_proto(proto_store)?;
        }

        Ok(Self {
            mapping,
            positive_store,
            negative_store,
            zero_count: proto.zeroCount,
            count: proto.count,
            min: proto.min,
            max: proto.max,
            sum: proto.sum,
        })
    }
}
