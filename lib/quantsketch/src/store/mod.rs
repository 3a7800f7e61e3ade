//! Bin stores for sketch observations.
//!
//! A store holds the weighted counts of mapped values, keyed by signed
//! integer bin key. The dense stores keep every bin between the smallest and
//! largest observed key; the collapsing variants additionally cap the number
//! of bins by folding one extreme tail into a boundary bin.

use quantsketch_protos::sketch::Store as ProtoStore;

use crate::error::SketchError;

mod bin_list;
pub use self::bin_list::BinList;

mod collapsing_highest;
pub use self::collapsing_highest::CollapsingHighestDenseStore;

mod collapsing_lowest;
pub use self::collapsing_lowest::CollapsingLowestDenseStore;

mod dense;
pub use self::dense::DenseStore;

mod sparse;
pub use self::sparse::SparseStore;

/// The number of bins a dense store grows by.
pub const DEFAULT_CHUNK_SIZE: usize = 128;

/// The bin cap used by the collapsing stores when none is given.
pub const DEFAULT_BIN_LIMIT: usize = 2048;

/// Storage for the weighted counts of mapped values.
///
/// Deep copies are made through `Clone`.
pub trait Store: Clone + Send + Sync {
    /// Adds a weight to the bin at the given key, growing the key range if
    /// necessary.
    fn add(&mut self, key: i32, weight: f64);

    /// Returns the sum of the weights across all bins.
    fn total_count(&self) -> f64;

    /// Returns the number of bins currently tracked.
    fn length(&self) -> usize;

    /// Returns `true` if the store holds no weight.
    fn is_empty(&self) -> bool {
        self.total_count() == 0.0
    }

    /// Returns the smallest key holding weight, or `None` if empty.
    fn min_key(&self) -> Option<i32>;

    /// Returns the largest key holding weight, or `None` if empty.
    fn max_key(&self) -> Option<i32>;

    /// Returns the key of the bin containing the given rank.
    ///
    /// Bins are scanned in increasing key order, accumulating counts into a
    /// running sum that includes the current bin. With `lower` set, the first
    /// bin whose running sum exceeds `rank` wins; otherwise the first bin
    /// whose running sum reaches `rank + 1` wins. If the scan exhausts the
    /// bins, which cannot happen while `rank` is below the total count, the
    /// largest tracked key is returned.
    fn key_at_rank(&self, rank: f64, lower: bool) -> i32;

    /// Merges another store into this one.
    fn merge(&mut self, other: &Self);

    /// Clears the store, removing all weight.
    fn clear(&mut self);

    /// Converts this store to its wire representation.
    fn to_proto(&self) -> ProtoStore;

    /// Absorbs the bins of a wire store, accepting both the sparse and the
    /// contiguous encoding.
    ///
    /// # Errors
    ///
    /// Returns an error if any decoded bin count is negative.
    fn merge_from_proto(&mut self, proto: &ProtoStore) -> Result<(), SketchError>;
}

/// Validates a decoded bin count.
pub(crate) fn validate_proto_count(key: i32, count: f64) -> Result<f64, SketchError> {
    if count < 0.0 {
        return Err(SketchError::NegativeBinCount { key, count });
    }
    Ok(count)
}

/// Absorbs both encodings of a wire store by adding every (key, count) pair.
pub(crate) fn merge_store_from_proto<S: Store>(store: &mut S, proto: &ProtoStore) -> Result<(), SketchError> {
    for (&key, &count) in &proto.binCounts {
        let count = validate_proto_count(key, count)?;
        if count > 0.0 {
            store.add(key, count);
        }
    }

    let offset = proto.contiguousBinIndexOffset;
    for (i, &count) in proto.contiguousBinCounts.iter().enumerate() {
        let key = offset + i as i32;
        let count = validate_proto_count(key, count)?;
        if count > 0.0 {
            store.add(key, count);
        }
    }

    Ok(())
}
