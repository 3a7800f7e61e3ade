//! Protocol Buffers definitions for the quantile-sketch exchange format.
//!
//! This crate contains generated code based on the Protocol Buffers schema
//! used to ship sketches between processes. The core library depends on the
//! message types exported here; the byte-level codec lives in the `protobuf`
//! runtime crate.
#![deny(warnings)]
mod include {
    include!(concat!(env!("OUT_DIR"), "/protos/mod.rs"));
}

/// Sketch exchange definitions.
pub mod sketch {
    pub use super::include::sketch::*;
}
