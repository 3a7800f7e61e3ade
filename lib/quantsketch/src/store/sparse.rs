use std::collections::BTreeMap;

use quantsketch_protos::sketch::Store as ProtoStore;

use super::{merge_store_from_proto, Store};
use crate::error::SketchError;

/// A store backed by a sorted map, tracking only non-empty bins.
///
/// Memory-efficient when keys are widely scattered, at the cost of map
/// lookups on every add. Does not collapse, so the key range is unbounded.
/// On the wire this store emits the sparse encoding.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SparseStore {
    bins: BTreeMap<i32, f64>,
    count: f64,
}

impl SparseStore {
    /// Creates an empty `SparseStore`.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for SparseStore {
    fn add(&mut self, key: i32, weight: f64) {
        if weight == 0.0 {
            return;
        }

        *self.bins.entry(key).or_insert(0.0) += weight;
        self.count += weight;
    }

    fn total_count(&self) -> f64 {
        self.count
    }

    fn length(&self) -> usize {
        self.bins.len()
    }

    fn min_key(&self) -> Option<i32> {
        self.bins.keys().next().copied()
    }

    fn max_key(&self) -> Option<i32> {
        self.bins.keys().next_back().copied()
    }

    fn key_at_rank(&self, rank: f64, lower: bool) -> i32 {
        let mut running_count = 0.0;
        for (&key, &bin_count) in &self.bins {
            running_count += bin_count;
            if (lower && running_count > rank) || (!lower && running_count >= rank + 1.0) {
                return key;
            }
        }

        self.max_key().unwrap_or(i32::MIN)
    }

    fn merge(&mut self, other: &Self) {
        for (&key, &bin_count) in &other.bins {
            *self.bins.entry(key).or_insert(0.0) += bin_count;
        }
        self.count += other.count;
    }

    fn clear(&mut self) {
        self.bins.clear();
        self.count = 0.0;
    }

    fn to_proto(&self) -> ProtoStore {
        let mut proto = ProtoStore::new();
        for (&key, &bin_count) in &self.bins {
            proto.binCounts.insert(key, bin_count);
        }
        proto
    }

    fn merge_from_proto(&mut self, proto: &ProtoStore) -> Result<(), SketchError> {
        merge_store_from_proto(self, proto)
    }
}
