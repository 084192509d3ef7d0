//! Precomputed mantissa lookup tables for [`super::SubBucketLookupIndexer`].
//!
//! A linear subbucket (`2^(scale+1)` of them, evenly spaced in mantissa
//! bits) overlaps at most two log subbuckets: this follows from
//! `(1 + 1/(2*2^s))^(2*2^s) < e < 4`, i.e. linear width is always narrower
//! than the first log subbucket's width. That is what makes the "look up
//! the containing linear subbucket, then check one boundary" scheme exact.

use std::sync::OnceLock;

use crate::bits;

pub(super) struct SubBucketTables {
    /// Mantissa (52-bit) of the exclusive end of each log subbucket.
    /// Length `2^scale`; the last entry is always `1 << 52` (2.0).
    pub(super) log_bucket_end: Vec<u64>,
    /// The log-bucket index that each linear subbucket's start falls into.
    /// Length `2^(scale+1)`.
    pub(super) log_bucket_index: Vec<i64>,
}

fn ln_base(scale: i32) -> f64 {
    std::f64::consts::LN_2 * 2f64.powi(-scale)
}

fn sub_bucket_index_via_log(scale: i32, mantissa: u64) -> i64 {
    let v = bits::make_1_to_2(mantissa);
    (v.ln() / ln_base(scale)).floor() as i64
}

pub(super) fn build(scale: i32) -> SubBucketTables {
    debug_assert!(scale > 0 && scale <= 30, "scale {scale} out of supported range");
    let ln_b = ln_base(scale);
    let sub_count = 1i64 << scale;

    let log_bucket_end: Vec<u64> = (0..sub_count)
        .map(|j| {
            if j == sub_count - 1 {
                1u64 << 52
            } else {
                let v = ((j + 1) as f64 * ln_b).exp();
                bits::mantissa(v)
            }
        })
        .collect();

    let linear_count = 1i64 << (scale + 1);
    let shift = 52 - (scale as u32 + 1);
    let log_bucket_index: Vec<i64> = (0..linear_count)
        .map(|k| {
            let mantissa_start = (k as u64) << shift;
            sub_bucket_index_via_log(scale, mantissa_start)
        })
        .collect();

    SubBucketTables {
        log_bucket_end,
        log_bucket_index,
    }
}

/// Tables for scales 3..=6 are process-wide constants (~2 KiB total);
/// equal scales always share the exact same table instance.
static CACHED: [OnceLock<SubBucketTables>; 4] =
    [OnceLock::new(), OnceLock::new(), OnceLock::new(), OnceLock::new()];

/// Either a shared reference into the process-wide cache (scales 3..=6) or
/// an owned table built on demand for any other scale.
pub(super) enum TableRef {
    Cached(&'static SubBucketTables),
    Owned(Box<SubBucketTables>),
}

impl std::ops::Deref for TableRef {
    type Target = SubBucketTables;

    fn deref(&self) -> &SubBucketTables {
        match self {
            TableRef::Cached(t) => t,
            TableRef::Owned(t) => t,
        }
    }
}

pub(super) fn tables_for_scale(scale: i32) -> TableRef {
    if (3..=6).contains(&scale) {
        TableRef::Cached(CACHED[(scale - 3) as usize].get_or_init(|| build(scale)))
    } else {
        TableRef::Owned(Box::new(build(scale)))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn last_log_bucket_end_is_two() {
        for scale in [1, 3, 6, 10] {
            let tables = build(scale);
            assert_eq!(*tables.log_bucket_end.last().unwrap(), 1u64 << 52);
        }
    }

    #[test]
    fn table_lengths_match_scale() {
        for scale in [1, 3, 6] {
            let tables = build(scale);
            assert_eq!(tables.log_bucket_end.len(), 1usize << scale);
            assert_eq!(tables.log_bucket_index.len(), 1usize << (scale + 1));
        }
    }

    #[test]
    fn cached_tables_for_equal_scale_are_identical() {
        let a: &SubBucketTables = &tables_for_scale(4);
        let b: &SubBucketTables = &tables_for_scale(4);
        assert_eq!(a as *const _, b as *const _);
    }
}
