//! A compact, mergeable base-2 exponential histogram for quantile
//! estimation over a stream of real-valued measurements.
//!
//! This crate is the sketch core: bit-level double utilities, a family of
//! bucket indexers, a windowed auto-widening counter array, and the sketch
//! engine ([`SimpleSketch`], [`ComboSketch`], [`ConcurrentSketch`]) built on
//! top of them. It does no I/O, exposes no CLI, and carries no telemetry
//! transport — those are callers' concerns, not this crate's.
//!
//! # Getting started
//!
//! ```
//! use exponential_histogram::sketch::SimpleSketch;
//!
//! let mut sketch = SimpleSketch::default();
//! for v in 1..=1000 {
//!     sketch.insert(v as f64, 1).unwrap();
//! }
//! let mut thresholds = [50.0, 90.0, 99.0];
//! let percentiles = sketch.percentiles(&mut thresholds);
//! assert_eq!(percentiles.len(), 3);
//! ```
//!
//! # Feature Flags
//!

#[deny(missing_docs)]
pub mod bits;
#[deny(missing_docs)]
pub mod counter;
#[deny(missing_docs)]
pub mod error;
#[deny(missing_docs)]
pub mod index;
#[deny(missing_docs)]
pub mod sketch;
#[deny(missing_docs)]
pub mod wire;

pub use error::{HistogramError, Result};
pub use index::{BucketIndexer, IndexerPolicy};
pub use sketch::{Bucket, ComboSketch, ConcurrentSketch, SimpleSketch};
pub use wire::Wire;
