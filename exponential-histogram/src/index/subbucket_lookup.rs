use super::tables::{tables_for_scale, TableRef};
use super::{max_index, min_index, min_index_normal, BucketIndexer};
use crate::bits;
use crate::error::{HistogramError, Result};

/// Table-driven subbucket indexer: no `ln` call on the hot path at all.
/// Valid for `scale` in `1..=30` (the linear-subbucket count, `2^(scale+1)`,
/// must fit comfortably in 32 bits).
pub struct SubBucketLookupIndexer {
    scale: i32,
    tables: TableRef,
}

impl std::fmt::Debug for SubBucketLookupIndexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubBucketLookupIndexer")
            .field("scale", &self.scale)
            .finish()
    }
}

impl SubBucketLookupIndexer {
    /// Build a `SubBucketLookupIndexer` for `scale`. Only valid for `scale`
    /// in `1..=30`.
    pub fn new(scale: i32) -> Result<Self> {
        if scale <= 0 || scale > 30 {
            return Err(HistogramError::InvalidConfiguration(format!(
                "SubBucketLookupIndexer requires scale in 1..=30, got {scale}"
            )));
        }
        Ok(Self {
            scale,
            tables: tables_for_scale(scale),
        })
    }

    fn sub_bucket_index(&self, mantissa: u64) -> i64 {
        let shift = 52 - (self.scale as u32 + 1);
        let linear_index = (mantissa >> shift) as usize;
        let j = self.tables.log_bucket_index[linear_index];
        if mantissa >= self.tables.log_bucket_end[j as usize] {
            j + 1
        } else {
            j
        }
    }

    fn sub_bucket_start_mantissa(&self, sub: i64) -> u64 {
        if sub == 0 {
            0
        } else {
            self.tables.log_bucket_end[(sub - 1) as usize]
        }
    }
}

impl BucketIndexer for SubBucketLookupIndexer {
    fn get_bucket_index(&self, v: f64) -> i64 {
        let exponent = bits::exp(v) as i64;
        let sub = self.sub_bucket_index(bits::mantissa(v));
        (exponent << self.scale) + sub
    }

    fn get_bucket_start(&self, index: i64) -> f64 {
        let exponent = index >> self.scale;
        let sub = index - (exponent << self.scale);
        let mantissa = self.sub_bucket_start_mantissa(sub);
        bits::make(false, (exponent + 1023).clamp(0, 2046) as u16, mantissa)
    }

    fn get_base(&self) -> f64 {
        2f64.powf(2f64.powi(-self.scale))
    }

    fn get_scale(&self) -> i32 {
        self.scale
    }

    fn get_max_index(&self) -> i64 {
        max_index(self.scale)
    }

    fn get_min_index_normal(&self) -> i64 {
        min_index_normal(self.scale)
    }

    fn get_min_index(&self) -> i64 {
        min_index(self.scale)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn start_leq_value_lt_end() {
        for scale in [1, 2, 3, 6, 20] {
            let indexer = SubBucketLookupIndexer::new(scale).unwrap();
            for v in [1.0, 2.0, 100.0, 12345.6789, 1e100, 1e-100] {
                let i = indexer.get_bucket_index(v);
                let start = indexer.get_bucket_start(i);
                let end = indexer.get_bucket_end(i);
                assert!(start <= v, "scale {scale}: start {start} > v {v}");
                assert!(v < end, "scale {scale}: v {v} >= end {end}");
            }
        }
    }

    #[test]
    fn agrees_with_log_indexer_within_tolerance() {
        use crate::index::LogIndexer;
        for scale in [1, 4, 6] {
            let lookup = SubBucketLookupIndexer::new(scale).unwrap();
            let log = LogIndexer::new(scale).unwrap();
            for v in [1.0, 3.3, 100.0, 9999.0, 0.0003] {
                let a = lookup.get_bucket_index(v);
                let b = log.get_bucket_index(v);
                assert!((a - b).abs() <= 1, "scale {scale} v {v}: {a} vs {b}");
            }
        }
    }

    #[test]
    fn agrees_with_sub_bucket_log_exactly() {
        use crate::index::SubBucketLogIndexer;
        for scale in [3, 4, 5, 6] {
            let lookup = SubBucketLookupIndexer::new(scale).unwrap();
            let log = SubBucketLogIndexer::new(scale).unwrap();
            for v in [1.0, 1.5, 3.3, 100.0, 9999.0, 0.0003, 1e50] {
                assert_eq!(
                    lookup.get_bucket_index(v),
                    log.get_bucket_index(v),
                    "scale {scale} v {v}"
                );
            }
        }
    }

    #[test]
    fn rejects_out_of_range_scale() {
        assert!(SubBucketLookupIndexer::new(0).is_err());
        assert!(SubBucketLookupIndexer::new(31).is_err());
    }
}
