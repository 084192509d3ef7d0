use super::{max_index, min_index, min_index_normal, BucketIndexer};
use crate::bits;
use crate::error::{HistogramError, Result};

/// Splits `[1, 2)` into `2^scale` log-spaced subbuckets using a direct
/// `ln` computation limited to the `[1, 2)` range, so accuracy does not
/// degrade as scale grows (unlike computing `ln(v)` directly on the full
/// value, which is what [`super::LogIndexer`] does). Valid for `scale` in
/// `1..=52`.
#[derive(Debug, Clone, Copy)]
pub struct SubBucketLogIndexer {
    scale: i32,
    /// `ln(base)`, where `base = 2^(2^-scale)`.
    ln_base: f64,
}

impl SubBucketLogIndexer {
    /// Build a `SubBucketLogIndexer` for `scale`. Only valid for `scale > 0`.
    pub fn new(scale: i32) -> Result<Self> {
        if scale <= 0 || scale > 52 {
            return Err(HistogramError::InvalidConfiguration(format!(
                "SubBucketLogIndexer requires scale in 1..=52, got {scale}"
            )));
        }
        let ln_base = std::f64::consts::LN_2 * 2f64.powi(-scale);
        Ok(Self { scale, ln_base })
    }

    fn sub_bucket_index(&self, mantissa: u64) -> i64 {
        let v = bits::make_1_to_2(mantissa);
        (v.ln() / self.ln_base).floor() as i64
    }

    fn sub_bucket_start_mantissa(&self, sub: i64) -> u64 {
        let v = (sub as f64 * self.ln_base).exp();
        bits::mantissa(v)
    }
}

impl BucketIndexer for SubBucketLogIndexer {
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
        self.ln_base.exp()
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
        for scale in [1, 2, 6, 20, 52] {
            let indexer = SubBucketLogIndexer::new(scale).unwrap();
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
        for scale in [1, 4, 10] {
            let sub_log = SubBucketLogIndexer::new(scale).unwrap();
            let log = LogIndexer::new(scale).unwrap();
            for v in [1.0, 3.3, 100.0, 9999.0, 0.0003] {
                let a = sub_log.get_bucket_index(v);
                let b = log.get_bucket_index(v);
                assert!((a - b).abs() <= 1, "scale {scale} v {v}: {a} vs {b}");
            }
        }
    }

    #[test]
    fn rejects_non_positive_scale() {
        assert!(SubBucketLogIndexer::new(0).is_err());
        assert!(SubBucketLogIndexer::new(-1).is_err());
    }

    #[test]
    fn downscale_homomorphism() {
        let fine = SubBucketLogIndexer::new(5).unwrap();
        let coarse = SubBucketLogIndexer::new(4).unwrap();
        for v in [1.0, 3.0, 7.5, 1024.0, 99.9] {
            let a = coarse.get_bucket_index(v);
            let b = fine.get_bucket_index(v) >> 1;
            assert!((a - b).abs() <= 1, "v={v}: {a} vs {b}");
        }
    }
}
