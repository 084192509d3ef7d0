use thiserror::Error;

/// Failure modes for the sketch core.
///
/// Insert never fails on a valid finite input: NaN and infinities are
/// silently dropped instead, per contract. Everything else that can go
/// wrong is one of these.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HistogramError {
    /// A constructor or config value was out of range, e.g. `max_buckets == 0`,
    /// a scale outside `[-11, 52]`, or an indexer variant used at a scale it
    /// does not support (`SubBucket*` at scale <= 0, `Exponent` at scale > 0).
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A merge or subtract was attempted between sketches that cannot be
    /// combined: mismatched polarity, or mismatched sketch variants.
    #[error("incompatible operation: {0}")]
    IncompatibleOperation(String),

    /// The wire format could not be decoded: unknown version, truncated
    /// buffer, an out-of-range `bytes_per_counter`, or a varint that never
    /// terminates within a sane number of bytes.
    #[error("decode error: {0}")]
    DecodeError(String),

    /// An internal invariant was violated. This indicates a bug in this
    /// crate, not a caller error: a second increment failure after a
    /// computed downscale, or a counter-widening tag out of range.
    #[error("internal invariant violation: {0}")]
    InternalInvariantViolation(String),
}

/// Convenience alias used throughout this crate's fallible APIs.
pub type Result<T> = std::result::Result<T, HistogramError>;
