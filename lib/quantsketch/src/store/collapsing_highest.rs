use quantsketch_protos::sketch::Store as ProtoStore;
use tracing::debug;

use super::{merge_store_from_proto, BinList, DenseStore, Store, DEFAULT_BIN_LIMIT};
use crate::error::SketchError;

/// A dense store that collapses the highest-keyed bins once a bin cap is
/// exceeded.
///
/// The mirror image of
/// [`CollapsingLowestDenseStore`](super::CollapsingLowestDenseStore):
/// collapsing preserves the total count exactly but loses the location of
/// the collapsed mass, so the relative-accuracy guarantee no longer holds for
/// the highest quantiles. Prefer this variant when the lower tail matters
/// most.
#[derive(Clone, Debug, PartialEq)]
pub struct CollapsingHighestDenseStore {
    store: DenseStore,

    /// The maximum number of bins.
    bin_limit: usize,

    /// Whether any highest bins have been folded away; sticky once set.
    is_collapsed: bool,
}

impl CollapsingHighestDenseStore {
    /// Creates an empty store that keeps at most `bin_limit` bins.
    ///
    /// # Panics
    ///
    /// Panics if `bin_limit` is zero.
    pub fn new(bin_limit: usize) -> Self {
        assert!(bin_limit >= 1, "bin_limit must be at least 1");
        Self {
            store: DenseStore::new(),
            bin_limit,
            is_collapsed: false,
        }
    }

    /// Returns the maximum number of bins.
    pub fn bin_limit(&self) -> usize {
        self.bin_limit
    }

    /// Returns `true` if any bins have been collapsed.
    ///
    /// When set, quantiles that fall into the collapsed high tail no longer
    /// carry the relative-accuracy guarantee.
    pub fn is_collapsed(&self) -> bool {
        self.is_collapsed
    }

    fn set_collapsed(&mut self) {
        if !self.is_collapsed {
            debug!(bin_limit = self.bin_limit, "bin limit exceeded, collapsing highest bins");
            self.is_collapsed = true;
        }
    }

    /// Returns the bin position for the key, extending the range if
    /// necessary. Keys above an already-collapsed range land in the collapsed
    /// bin.
    fn index_for(&mut self, key: i32) -> usize {
        if key > self.store.max_key {
            if self.is_collapsed {
                return self.store.bins.len() - 1;
            }

            self.extend_range(key, key);
            if self.is_collapsed {
                return self.store.bins.len() - 1;
            }
        } else if key < self.store.min_key {
            self.extend_range(key, key);
        }

        (key - self.store.offset) as usize
    }

    /// Returns the chunked span of both keys, capped at the bin limit.
    fn capped_length(&self, new_min_key: i32, new_max_key: i32) -> usize {
        self.store.chunked_length(new_min_key, new_max_key).min(self.bin_limit)
    }

    fn extend_range(&mut self, key: i32, second_key: i32) {
        let new_min_key = key.min(second_key).min(self.store.min_key);
        let new_max_key = key.max(second_key).max(self.store.max_key);

        if self.store.bins.is_empty() {
            let new_length = self.capped_length(new_min_key, new_max_key);
            self.store.bins = BinList::with_zeros(new_length);
            self.store.offset = new_min_key;
            self.adjust(new_min_key, new_max_key);
        } else if new_min_key >= self.store.min_key
            && i64::from(new_max_key) < i64::from(self.store.offset) + self.store.bins.len() as i64
        {
            // The allocation already covers the new range.
            self.store.min_key = new_min_key;
            self.store.max_key = new_max_key;
        } else {
            let new_length = self.capped_length(new_min_key, new_max_key);
            if new_length > self.store.bins.len() {
                self.store.bins.extend_back_zeros(new_length - self.store.bins.len());
            }
            self.adjust(new_min_key, new_max_key);
        }
    }

    /// Makes the allocation fit the new range without resizing the bins,
    /// collapsing the highest bins when the range is too wide.
    fn adjust(&mut self, new_min_key: i32, new_max_key: i32) {
        let length = self.store.bins.len();

        if i64::from(new_max_key) - i64::from(new_min_key) + 1 > length as i64 {
            // The range is too wide; pin the maximum and fold everything
            // above it into the highest bin.
            let new_max_key = new_min_key + length as i32 - 1;

            if new_max_key <= self.store.min_key {
                // The whole current content lands in the highest bin.
                self.store.offset = new_min_key;
                self.store.max_key = new_max_key;
                self.store.bins = BinList::with_zeros(length);
                self.store.bins[length - 1] = self.store.count;
            } else {
                let shift = self.store.offset - new_min_key;

                if shift > 0 {
                    let collapse_start = (new_max_key - self.store.offset + 1) as usize;
                    let collapse_end = (self.store.max_key - self.store.offset + 1) as usize;
                    if collapse_end > collapse_start {
                        let collapsed_count = self.store.bins.sum_span(collapse_start..collapse_end);

                        self.store
                            .bins
                            .replace_with_zeros(collapse_start, collapse_end, collapse_end - collapse_start);
                        self.store.bins[collapse_start - 1] += collapsed_count;
                    }
                    self.store.max_key = new_max_key;

                    // Slide the buckets to make room for the new maximum.
                    self.store.shift_bins(shift);
                } else {
                    self.store.max_key = new_max_key;

                    // Slide the buckets to make room for the new minimum.
                    self.store.shift_bins(shift);
                }
            }

            self.store.min_key = new_min_key;
            self.set_collapsed();
        } else {
            self.store.center_bins(new_min_key, new_max_key);
            self.store.min_key = new_min_key;
            self.store.max_key = new_max_key;
        }
    }
}

impl Store for CollapsingHighestDenseStore {
    fn add(&mut self, key: i32, weight: f64) {
        let index = self.index_for(key);
        self.store.bins[index] += weight;
        self.store.count += weight;
    }

    fn total_count(&self) -> f64 {
        self.store.count
    }

    fn length(&self) -> usize {
        self.store.bins.len()
    }

    fn min_key(&self) -> Option<i32> {
        self.store.min_key()
    }

    fn max_key(&self) -> Option<i32> {
        self.store.max_key()
    }

    fn key_at_rank(&self, rank: f64, lower: bool) -> i32 {
        self.store.key_at_rank_scan(rank, lower)
    }

    fn merge(&mut self, other: &Self) {
        if other.store.count == 0.0 {
            return;
        }

        if self.store.count == 0.0 {
            self.clone_from(other);
            return;
        }

        if other.store.min_key < self.store.min_key || other.store.max_key > self.store.max_key {
            self.extend_range(other.store.min_key, other.store.max_key);
        }

        // Fold the part of the other store that lies above our maximum into
        // the collapsed bin, then add the overlap pairwise.
        let collapse_end = i64::from(other.store.max_key) - i64::from(other.store.offset) + 1;
        let collapse_start = (i64::from(self.store.max_key) + 1).max(i64::from(other.store.min_key))
            - i64::from(other.store.offset);

        if collapse_end > collapse_start {
            let collapsed_count = other.store.bins.sum_span(collapse_start as usize..collapse_end as usize);
            let highest = self.store.bins.len() - 1;
            self.store.bins[highest] += collapsed_count;
        }

        let last_uncollapsed_key = collapse_start.min(collapse_end) + i64::from(other.store.offset);
        for key in other.store.min_key..last_uncollapsed_key as i32 {
            let index = (key - self.store.offset) as usize;
            self.store.bins[index] += other.store.bins[(key - other.store.offset) as usize];
        }

        self.store.count += other.store.count;
    }

    fn clear(&mut self) {
        self.store.clear();
        self.is_collapsed = false;
    }

    fn to_proto(&self) -> ProtoStore {
        self.store.to_proto_contiguous()
    }

    fn merge_from_proto(&mut self, proto: &ProtoStore) -> Result<(), SketchError> {
        merge_store_from_proto(self, proto)
    }
}

impl Default for CollapsingHighestDenseStore {
    /// Creates a store with the default limit of 2048 bins.
    fn default() -> Self {
        Self::new(DEFAULT_BIN_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_collapse_within_limit() {
        let mut store = CollapsingHighestDenseStore::new(128);
        for key in 0..100 {
            store.add(key, 1.0);
        }

        assert!(!store.is_collapsed());
        assert_eq!(store.total_count(), 100.0);
        assert_eq!(store.min_key(), Some(0));
        assert_eq!(store.max_key(), Some(99));
    }

    #[test]
    fn test_length_capped_at_bin_limit() {
        let mut store = CollapsingHighestDenseStore::new(8);
        for key in 0..1000 {
            store.add(key, 1.0);
        }

        assert!(store.is_collapsed());
        assert!(store.length() <= 8, "length {} exceeds bin limit", store.length());
        assert_eq!(store.total_count(), 1000.0);
        assert_eq!(store.min_key(), Some(0));
        assert_eq!(store.max_key(), Some(7));
    }

    #[test]
    fn test_high_keys_fold_into_collapsed_bin() {
        let mut store = CollapsingHighestDenseStore::new(4);
        for key in 0..4 {
            store.add(key, 1.0);
        }
        assert!(!store.is_collapsed());

        // Key 4 exceeds the cap: it folds into key 3's bin.
        store.add(4, 1.0);
        assert!(store.is_collapsed());
        assert_eq!(store.min_key(), Some(0));
        assert_eq!(store.max_key(), Some(3));

        // Later high keys land in the collapsed bin without moving the range.
        store.add(100, 1.0);
        assert_eq!(store.max_key(), Some(3));
        assert_eq!(store.total_count(), 6.0);

        let proto = store.to_proto();
        assert_eq!(proto.contiguousBinIndexOffset, 0);
        assert_eq!(proto.contiguousBinCounts, vec![1.0, 1.0, 1.0, 3.0]);
    }

    #[test]
    fn test_merge_folds_high_tail() {
        let mut store = CollapsingHighestDenseStore::new(4);
        for key in 0..4 {
            store.add(key, 1.0);
        }

        let mut other = CollapsingHighestDenseStore::new(4);
        for key in 10..14 {
            other.add(key, 1.0);
        }

        store.merge(&other);

        // The other store lies entirely above our maximum; its mass folds
        // into our highest bin.
        assert_eq!(store.total_count(), 8.0);
        assert_eq!(store.min_key(), Some(0));
        assert_eq!(store.max_key(), Some(3));

        let proto = store.to_proto();
        assert_eq!(proto.contiguousBinCounts, vec![1.0, 1.0, 1.0, 5.0]);
    }

    #[test]
    fn test_key_at_rank_after_collapse() {
        let mut store = CollapsingHighestDenseStore::new(4);
        for key in 0..8 {
            store.add(key, 1.0);
        }

        assert!(store.is_collapsed());
        // The five highest observations share the collapsed bin at key 3.
        assert_eq!(store.key_at_rank(0.0, true), 0);
        assert_eq!(store.key_at_rank(2.0, true), 2);
        assert_eq!(store.key_at_rank(3.0, true), 3);
        assert_eq!(store.key_at_rank(7.0, true), 3);
    }
}
