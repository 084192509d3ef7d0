use super::{max_index, min_index, min_index_normal, BucketIndexer, MIN_SCALE};
use crate::bits;
use crate::error::{HistogramError, Result};

/// Pure-integer indexer for scale <= 0. `index = floor_log2(v) >> -scale`,
/// an arithmetic shift that introduces no floating-point error at all
/// (unlike [`super::LogIndexer`], which is accurate at every scale but
/// pays for it with a `ln` call).
#[derive(Debug, Clone, Copy)]
pub struct ExponentIndexer {
    scale: i32,
}

impl ExponentIndexer {
    /// Build an `ExponentIndexer` for `scale`. Only valid for `scale <= 0`.
    pub fn new(scale: i32) -> Result<Self> {
        if scale > 0 {
            return Err(HistogramError::InvalidConfiguration(format!(
                "ExponentIndexer requires scale <= 0, got {scale}"
            )));
        }
        if scale < MIN_SCALE {
            return Err(HistogramError::InvalidConfiguration(format!(
                "scale {scale} below minimum {MIN_SCALE}"
            )));
        }
        Ok(Self { scale })
    }
}

impl BucketIndexer for ExponentIndexer {
    fn get_bucket_index(&self, v: f64) -> i64 {
        let floor_log2 = bits::floor_log2(v) as i64;
        if self.scale == 0 {
            floor_log2
        } else {
            floor_log2 >> -self.scale
        }
    }

    fn get_bucket_start(&self, index: i64) -> f64 {
        let exponent = if self.scale == 0 {
            index
        } else {
            index << -self.scale
        };
        bits::exact_pow2(exponent as i32)
    }

    fn get_base(&self) -> f64 {
        bits::exact_pow2(1 << -self.scale)
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
