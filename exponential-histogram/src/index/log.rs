use super::{max_index, min_index, min_index_normal, BucketIndexer, MAX_SCALE, MIN_SCALE};
use crate::error::{HistogramError, Result};

/// Reference indexer, valid at every scale in `[-11, 52]`. Uses natural log
/// throughout; never materializes `base` as an intermediate value (`base`
/// is near 1 at high scales, so the mantissa/exponent decomposition that
/// `start` uses keeps the precision the naive `base.powi(i)` form would
/// lose).
#[derive(Debug, Clone, Copy)]
pub struct LogIndexer {
    scale: i32,
    /// `2^scale / ln 2`, so `index = floor(ln(v) * scale_factor)`.
    scale_factor: f64,
}

impl LogIndexer {
    /// Build a `LogIndexer` for `scale`. Valid for every scale this crate
    /// admits.
    pub fn new(scale: i32) -> Result<Self> {
        if !(MIN_SCALE..=MAX_SCALE).contains(&scale) {
            return Err(HistogramError::InvalidConfiguration(format!(
                "LogIndexer scale {scale} out of range [{MIN_SCALE}, {MAX_SCALE}]"
            )));
        }
        let scale_factor = 2f64.powi(scale) / std::f64::consts::LN_2;
        Ok(Self { scale, scale_factor })
    }
}

impl BucketIndexer for LogIndexer {
    fn get_bucket_index(&self, v: f64) -> i64 {
        (v.ln() * self.scale_factor).floor() as i64
    }

    fn get_bucket_start(&self, index: i64) -> f64 {
        // start = 2^(i * 2^-scale) = exp(i * ln(2) * 2^-scale)
        ((index as f64) / self.scale_factor).exp()
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
        let indexer = LogIndexer::new(4).unwrap();
        for v in [1.0, 2.0, 100.0, 0.001, 1e10, 1e-10] {
            let i = indexer.get_bucket_index(v);
            let start = indexer.get_bucket_start(i);
            let end = indexer.get_bucket_end(i);
            assert!(start <= v, "start {start} > v {v} at index {i}");
            assert!(v < end, "v {v} >= end {end} at index {i}");
        }
    }

    #[test]
    fn end_equals_start_times_base_within_epsilon() {
        let indexer = LogIndexer::new(6).unwrap();
        let base = indexer.get_base();
        for i in [-100i64, 0, 1, 1000] {
            let start = indexer.get_bucket_start(i);
            let end = indexer.get_bucket_end(i);
            let relative_error = ((end - start * base) / end).abs();
            assert!(relative_error < 1e-9, "relative error {relative_error} at i={i}");
        }
    }

    #[test]
    fn rejects_out_of_range_scale() {
        assert!(LogIndexer::new(53).is_err());
        assert!(LogIndexer::new(-12).is_err());
    }
}
