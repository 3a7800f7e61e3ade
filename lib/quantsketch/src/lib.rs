//! A mergeable streaming quantile sketch with relative-error guarantees.
//!
//! The sketch ingests an unbounded stream of real-valued samples, optionally
//! weighted, and answers arbitrary quantile queries with a bounded relative
//! error: for any returned value `v̂` approximating the true quantile `v`,
//! `|v̂ - v| <= α·|v|`. Sketches built over disjoint streams can be merged,
//! and every sketch serializes to a compact Protocol Buffers message.
//!
//! Three index mappings trade compute for memory ([`LogarithmicMapping`],
//! [`LinearlyInterpolatedMapping`], [`CubicallyInterpolatedMapping`]), and
//! four stores trade memory bounds for tail accuracy ([`DenseStore`],
//! [`CollapsingLowestDenseStore`], [`CollapsingHighestDenseStore`],
//! [`SparseStore`]).
//!
//! # Quick Start
//!
//! ```
//! use quantsketch::DDSketch;
//!
//! let mut sketch = DDSketch::with_relative_accuracy(0.01).unwrap();
//! for i in 1..=100 {
//!     sketch.add(i as f64).unwrap();
//! }
//!
//! let p99 = sketch.get_quantile_value(0.99);
//! assert!((p99 - 99.0).abs() <= 0.99);
//! ```
//!
//! A sketch is single-writer: no operation blocks or yields, and clients that
//! need concurrency shard their streams and merge the shards.

#![deny(warnings)]
#![deny(missing_docs)]

pub mod mapping;
pub mod store;

mod error;
mod sketch;

pub use error::SketchError;
pub use mapping::{
    AnyIndexMapping, CubicallyInterpolatedMapping, IndexMapping, LinearlyInterpolatedMapping, LogarithmicMapping,
};
pub use sketch::DDSketch;
pub use store::{
    BinList, CollapsingHighestDenseStore, CollapsingLowestDenseStore, DenseStore, SparseStore, Store,
};
