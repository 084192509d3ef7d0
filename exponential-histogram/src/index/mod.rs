//! Bucket indexers: the capability that maps a finite, positive `f64` to a
//! signed bucket index under a configurable scale, and back.

mod exponent;
mod log;
mod subbucket_lookup;
mod subbucket_log;
mod tables;

pub use exponent::ExponentIndexer;
pub use log::LogIndexer;
pub use subbucket_lookup::SubBucketLookupIndexer;
pub use subbucket_log::SubBucketLogIndexer;

use crate::error::{HistogramError, Result};

/// `MAX_EXP` from the data model: the largest unbiased exponent a normal
/// `f64` can have.
pub const MAX_EXP: i64 = 1023;
/// `MIN_EXP` from the data model: the smallest unbiased exponent a normal
/// `f64` can have.
pub const MIN_EXP: i64 = -1022;
/// Width of the mantissa field.
pub const MANTISSA_BITS: i64 = 52;
/// Smallest scale this crate admits.
pub const MIN_SCALE: i32 = -11;
/// Largest scale this crate admits.
pub const MAX_SCALE: i32 = 52;

/// `max_index(s)` per the data model.
pub(crate) fn max_index(scale: i32) -> i64 {
    if scale > 0 {
        (MAX_EXP << scale) | ((1i64 << scale) - 1)
    } else {
        MAX_EXP >> -scale
    }
}

/// `min_index_normal(s)` per the data model.
pub(crate) fn min_index_normal(scale: i32) -> i64 {
    if scale > 0 {
        MIN_EXP << scale
    } else {
        MIN_EXP >> -scale
    }
}

/// `min_index(s)`: extends `min_index_normal` down by `MANTISSA_BITS` steps
/// to cover the subnormal range.
pub(crate) fn min_index(scale: i32) -> i64 {
    if scale > 0 {
        min_index_normal(scale) - (MANTISSA_BITS << scale)
    } else {
        min_index_normal(scale) - (MANTISSA_BITS >> -scale)
    }
}

/// The capability every bucket indexer variant implements. Bucket `i` spans
/// `[get_bucket_start(i), get_bucket_end(i))`.
pub trait BucketIndexer: std::fmt::Debug {
    /// The bucket index of `|v|`. `v` must be finite and nonzero; the
    /// caller routes sign and zero elsewhere.
    fn get_bucket_index(&self, v: f64) -> i64;

    /// The inclusive lower bound of bucket `i`.
    fn get_bucket_start(&self, index: i64) -> f64;

    /// The exclusive upper bound of bucket `i`. At `get_max_index()` this is
    /// `f64::MAX`; otherwise it is `get_bucket_start(i + 1)`.
    fn get_bucket_end(&self, index: i64) -> f64 {
        if index >= self.get_max_index() {
            f64::MAX
        } else {
            self.get_bucket_start(index + 1)
        }
    }

    /// `base = 2^(2^-scale)`: the ratio between adjacent bucket bounds.
    fn get_base(&self) -> f64;

    /// The scale this indexer was built for.
    fn get_scale(&self) -> i32;

    /// The largest bucket index this indexer will ever report.
    fn get_max_index(&self) -> i64;

    /// The smallest bucket index covering a normal (non-subnormal) value.
    fn get_min_index_normal(&self) -> i64;

    /// The smallest bucket index, including the subnormal range.
    fn get_min_index(&self) -> i64;
}

/// A first-class form of the wire format's `indexer_policy_code`: selects
/// which concrete [`BucketIndexer`] is built for a given scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexerPolicy {
    /// Always use [`LogIndexer`], regardless of scale.
    Log,
    /// Always use [`SubBucketLogIndexer`]; only valid for scale > 0.
    SubBucketLog,
    /// Always use [`SubBucketLookupIndexer`]; only valid for scale > 0.
    SubBucketLookup,
    /// Pick the cheapest accurate variant for the scale: `Exponent` at
    /// scale <= 0, `SubBucketLookup` at scale in `[1, 6]`, `SubBucketLog`
    /// above that.
    AutoSelect,
}

impl IndexerPolicy {
    /// The wire-format code for this policy (see `wire` module).
    pub fn code(self) -> u8 {
        match self {
            IndexerPolicy::Log => 0,
            IndexerPolicy::SubBucketLog => 1,
            IndexerPolicy::SubBucketLookup => 2,
            IndexerPolicy::AutoSelect => 3,
        }
    }

    /// Reconstruct a policy from its wire-format code.
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(IndexerPolicy::Log),
            1 => Ok(IndexerPolicy::SubBucketLog),
            2 => Ok(IndexerPolicy::SubBucketLookup),
            3 => Ok(IndexerPolicy::AutoSelect),
            other => Err(HistogramError::DecodeError(format!(
                "unknown indexer policy code {other}"
            ))),
        }
    }

    /// Build the concrete indexer this policy selects for `scale`.
    pub fn build(self, scale: i32) -> Result<Box<dyn BucketIndexer>> {
        if !(MIN_SCALE..=MAX_SCALE).contains(&scale) {
            return Err(HistogramError::InvalidConfiguration(format!(
                "scale {scale} out of range [{MIN_SCALE}, {MAX_SCALE}]"
            )));
        }
        match self {
            IndexerPolicy::Log => Ok(Box::new(LogIndexer::new(scale)?)),
            IndexerPolicy::SubBucketLog => Ok(Box::new(SubBucketLogIndexer::new(scale)?)),
            IndexerPolicy::SubBucketLookup => Ok(Box::new(SubBucketLookupIndexer::new(scale)?)),
            IndexerPolicy::AutoSelect => {
                if scale <= 0 {
                    Ok(Box::new(ExponentIndexer::new(scale)?))
                } else if scale <= 6 {
                    Ok(Box::new(SubBucketLookupIndexer::new(scale)?))
                } else {
                    Ok(Box::new(SubBucketLogIndexer::new(scale)?))
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn policy_codes_round_trip() {
        for policy in [
            IndexerPolicy::Log,
            IndexerPolicy::SubBucketLog,
            IndexerPolicy::SubBucketLookup,
            IndexerPolicy::AutoSelect,
        ] {
            assert_eq!(IndexerPolicy::from_code(policy.code()).unwrap(), policy);
        }
        assert!(IndexerPolicy::from_code(4).is_err());
    }

    #[test]
    fn auto_select_picks_expected_variant_per_scale() {
        assert_eq!(IndexerPolicy::AutoSelect.build(-5).unwrap().get_scale(), -5);
        assert_eq!(IndexerPolicy::AutoSelect.build(0).unwrap().get_scale(), 0);
        assert_eq!(IndexerPolicy::AutoSelect.build(3).unwrap().get_scale(), 3);
        assert_eq!(IndexerPolicy::AutoSelect.build(6).unwrap().get_scale(), 6);
        assert_eq!(IndexerPolicy::AutoSelect.build(7).unwrap().get_scale(), 7);
        assert_eq!(IndexerPolicy::AutoSelect.build(52).unwrap().get_scale(), 52);
    }

    #[test]
    fn out_of_range_scale_is_rejected() {
        assert!(IndexerPolicy::AutoSelect.build(53).is_err());
        assert!(IndexerPolicy::AutoSelect.build(-12).is_err());
    }
}
