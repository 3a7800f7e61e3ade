use quantsketch_protos::sketch::Store as ProtoStore;

use super::{merge_store_from_proto, BinList, Store, DEFAULT_CHUNK_SIZE};
use crate::error::SketchError;

/// A dense store that keeps every bin between the smallest and the largest
/// observed key.
///
/// The store grows unbounded, a chunk of bins at a time, and re-centers its
/// key range inside the allocation so that growth to either side is
/// amortized. Memory use is proportional to the observed key span rounded up
/// to a chunk, which stays reasonable unless the data has tails heavier than
/// any subexponential.
#[derive(Clone, Debug, PartialEq)]
pub struct DenseStore {
    /// The bin counts; position 0 holds the count for the key at `offset`.
    pub(super) bins: BinList,

    /// Sum of the weights across all bins.
    pub(super) count: f64,

    /// The smallest key holding weight; `i32::MAX` while empty.
    pub(super) min_key: i32,

    /// The largest key holding weight; `i32::MIN` while empty.
    pub(super) max_key: i32,

    /// The number of bins to grow by.
    pub(super) chunk_size: usize,

    /// The key corresponding to bin position 0.
    pub(super) offset: i32,
}

impl DenseStore {
    /// Creates an empty `DenseStore` with the default growth chunk.
    pub fn new() -> Self {
        Self::with_chunk_size(DEFAULT_CHUNK_SIZE)
    }

    /// Creates an empty `DenseStore` growing by `chunk_size` bins at a time.
    ///
    /// # Panics
    ///
    /// Panics if `chunk_size` is zero.
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        assert!(chunk_size >= 1, "chunk_size must be at least 1");
        Self {
            bins: BinList::new(),
            count: 0.0,
            min_key: i32::MAX,
            max_key: i32::MIN,
            chunk_size,
            offset: 0,
        }
    }

    /// Returns the key of bin position 0.
    pub fn offset(&self) -> i32 {
        self.offset
    }

    /// Returns the bin position for the key, extending the range if necessary.
    fn index_for(&mut self, key: i32) -> usize {
        if key < self.min_key || key > self.max_key {
            self.extend_range(key, key);
        }
        (key - self.offset) as usize
    }

    /// Grows the bins as necessary to cover both keys, then adjusts.
    fn extend_range(&mut self, key: i32, second_key: i32) {
        let new_min_key = key.min(second_key).min(self.min_key);
        let new_max_key = key.max(second_key).max(self.max_key);

        if self.bins.is_empty() {
            let new_length = self.chunked_length(new_min_key, new_max_key);
            self.bins = BinList::with_zeros(new_length);
            self.offset = new_min_key;
            self.adjust(new_min_key, new_max_key);
        } else if new_min_key >= self.min_key
            && i64::from(new_max_key) < i64::from(self.offset) + self.bins.len() as i64
        {
            // The allocation already covers the new range.
            self.min_key = new_min_key;
            self.max_key = new_max_key;
        } else {
            let new_length = self.chunked_length(new_min_key, new_max_key);
            if new_length > self.bins.len() {
                self.bins.extend_back_zeros(new_length - self.bins.len());
            }
            self.adjust(new_min_key, new_max_key);
        }
    }

    /// Makes the allocation fit the new range without resizing the bins.
    fn adjust(&mut self, new_min_key: i32, new_max_key: i32) {
        self.center_bins(new_min_key, new_max_key);
        self.min_key = new_min_key;
        self.max_key = new_max_key;
    }

    /// Returns the span of both keys rounded up to a whole number of chunks.
    pub(super) fn chunked_length(&self, new_min_key: i32, new_max_key: i32) -> usize {
        let desired_length = (i64::from(new_max_key) - i64::from(new_min_key) + 1) as usize;
        desired_length.div_ceil(self.chunk_size) * self.chunk_size
    }

    /// Slides the bins inside the allocation; this changes the offset.
    pub(super) fn shift_bins(&mut self, shift: i32) {
        if shift > 0 {
            self.bins.truncate_back(shift as usize);
            self.bins.extend_front_zeros(shift as usize);
        } else {
            let abs_shift = shift.unsigned_abs() as usize;
            self.bins.truncate_front(abs_shift);
            self.bins.extend_back_zeros(abs_shift);
        }

        self.offset -= shift;
    }

    /// Centers the new range inside the allocation so both tails keep
    /// headroom for future growth.
    pub(super) fn center_bins(&mut self, new_min_key: i32, new_max_key: i32) {
        let middle_key = i64::from(new_min_key) + (i64::from(new_max_key) - i64::from(new_min_key) + 1) / 2;
        let shift = i64::from(self.offset) + (self.bins.len() / 2) as i64 - middle_key;
        self.shift_bins(shift as i32);
    }

    /// Emits the contiguous wire encoding: every bin from `min_key` to
    /// `max_key` inclusive.
    pub(super) fn to_proto_contiguous(&self) -> ProtoStore {
        let mut proto = ProtoStore::new();
        if self.count == 0.0 {
            return proto;
        }

        proto.contiguousBinIndexOffset = self.min_key;
        proto.contiguousBinCounts = ((self.min_key - self.offset) as usize..=(self.max_key - self.offset) as usize)
            .map(|i| self.bins[i])
            .collect();
        proto
    }

    pub(super) fn key_at_rank_scan(&self, rank: f64, lower: bool) -> i32 {
        let mut running_count = 0.0;
        for (i, bin_count) in self.bins.iter().enumerate() {
            running_count += bin_count;
            if (lower && running_count > rank) || (!lower && running_count >= rank + 1.0) {
                return self.offset + i as i32;
            }
        }

        self.max_key
    }
}

impl Store for DenseStore {
    fn add(&mut self, key: i32, weight: f64) {
        let index = self.index_for(key);
        self.bins[index] += weight;
        self.count += weight;
    }

    fn total_count(&self) -> f64 {
        self.count
    }

    fn length(&self) -> usize {
        self.bins.len()
    }

    fn min_key(&self) -> Option<i32> {
        (self.count != 0.0).then_some(self.min_key)
    }

    fn max_key(&self) -> Option<i32> {
        (self.count != 0.0).then_some(self.max_key)
    }

    fn key_at_rank(&self, rank: f64, lower: bool) -> i32 {
        self.key_at_rank_scan(rank, lower)
    }

    fn merge(&mut self, other: &Self) {
        if other.count == 0.0 {
            return;
        }

        if self.count == 0.0 {
            self.clone_from(other);
            return;
        }

        if other.min_key < self.min_key || other.max_key > self.max_key {
            self.extend_range(other.min_key, other.max_key);
        }

        for key in other.min_key..=other.max_key {
            let index = (key - self.offset) as usize;
            self.bins[index] += other.bins[(key - other.offset) as usize];
        }

        self.count += other.count;
    }

    fn clear(&mut self) {
        self.bins = BinList::new();
        self.count = 0.0;
        self.min_key = i32::MAX;
        self.max_key = i32::MIN;
        self.offset = 0;
    }

    fn to_proto(&self) -> ProtoStore {
        self.to_proto_contiguous()
    }

    fn merge_from_proto(&mut self, proto: &ProtoStore) -> Result<(), SketchError> {
        merge_store_from_proto(self, proto)
    }
}

impl Default for DenseStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_single() {
        let mut store = DenseStore::new();
        store.add(5, 1.0);

        assert_eq!(store.total_count(), 1.0);
        assert_eq!(store.min_key(), Some(5));
        assert_eq!(store.max_key(), Some(5));
        assert_eq!(store.length(), DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn test_add_weighted() {
        let mut store = DenseStore::new();
        store.add(5, 2.5);
        store.add(5, 0.5);

        assert_eq!(store.total_count(), 3.0);
        assert_eq!(store.min_key(), Some(5));
        assert_eq!(store.max_key(), Some(5));
    }

    #[test]
    fn test_growth_preserves_counts() {
        let mut store = DenseStore::with_chunk_size(4);
        store.add(0, 1.0);
        store.add(1000, 2.0);
        store.add(-1000, 3.0);

        assert_eq!(store.total_count(), 6.0);
        assert_eq!(store.min_key(), Some(-1000));
        assert_eq!(store.max_key(), Some(1000));

        let proto = store.to_proto();
        assert_eq!(proto.contiguousBinIndexOffset, -1000);
        assert_eq!(proto.contiguousBinCounts.len(), 2001);
        assert_eq!(proto.contiguousBinCounts[0], 3.0);
        assert_eq!(proto.contiguousBinCounts[1000], 1.0);
        assert_eq!(proto.contiguousBinCounts[2000], 2.0);
    }

    #[test]
    fn test_in_allocation_key_updates_max_key() {
        // A key inside the allocation but beyond max_key must still move
        // max_key.
        let mut store = DenseStore::new();
        store.add(0, 1.0);
        store.add(3, 1.0);

        assert_eq!(store.max_key(), Some(3));
        assert_eq!(store.min_key(), Some(0));
    }

    #[test]
    fn test_key_at_rank_lower_and_upper() {
        let mut store = DenseStore::new();
        store.add(10, 1.0);
        store.add(20, 1.0);

        // With `lower`, rank x maps to the first key for x in [0, 1).
        assert_eq!(store.key_at_rank(0.0, true), 10);
        assert_eq!(store.key_at_rank(0.5, true), 10);
        assert_eq!(store.key_at_rank(1.0, true), 20);

        // Without `lower`, the first key covers x in (-1, 0].
        assert_eq!(store.key_at_rank(0.0, false), 10);
        assert_eq!(store.key_at_rank(0.5, false), 20);
        assert_eq!(store.key_at_rank(1.0, false), 20);
    }

    #[test]
    fn test_merge() {
        let mut store = DenseStore::new();
        store.add(5, 2.0);
        store.add(10, 1.0);

        let mut other = DenseStore::new();
        other.add(5, 1.0);
        other.add(15, 3.0);

        store.merge(&other);

        assert_eq!(store.total_count(), 7.0);
        assert_eq!(store.min_key(), Some(5));
        assert_eq!(store.max_key(), Some(15));

        let proto = store.to_proto();
        assert_eq!(proto.contiguousBinCounts[0], 3.0);
        assert_eq!(proto.contiguousBinCounts[10], 3.0);
    }

    #[test]
    fn test_merge_into_empty_copies() {
        let mut other = DenseStore::new();
        other.add(-3, 1.5);
        other.add(4, 2.5);

        let mut store = DenseStore::new();
        store.merge(&other);

        assert_eq!(store.total_count(), 4.0);
        assert_eq!(store.min_key(), Some(-3));
        assert_eq!(store.max_key(), Some(4));
        assert_eq!(store.to_proto(), other.to_proto());
    }

    #[test]
    fn test_clear() {
        let mut store = DenseStore::new();
        store.add(5, 2.0);
        store.clear();

        assert!(store.is_empty());
        assert_eq!(store.total_count(), 0.0);
        assert_eq!(store.min_key(), None);
        assert_eq!(store.length(), 0);
    }

    #[test]
    fn test_wire_roundtrip() {
        let mut store = DenseStore::new();
        store.add(-2, 1.0);
        store.add(0, 2.5);
        store.add(7, 0.5);

        let mut decoded = DenseStore::new();
        decoded.merge_from_proto(&store.to_proto()).unwrap();

        assert_eq!(decoded.total_count(), store.total_count());
        assert_eq!(decoded.to_proto(), store.to_proto());
    }
}
