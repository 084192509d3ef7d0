use super::Bucket;
use crate::counter::WindowedCounterArray;
use crate::error::{HistogramError, Result};
use crate::index::{BucketIndexer, IndexerPolicy};

/// Default bucket budget, matching the upstream sketch's historical default.
pub const DEFAULT_MAX_BUCKETS: usize = 320;
/// Default starting scale: fine enough to resolve most workloads without an
/// early downscale.
pub const DEFAULT_INITIAL_SCALE: i32 = 12;

/// One polarity of an exponential-histogram sketch: a windowed counter array
/// plus the indexer that currently interprets it, and the scalar aggregates
/// that every sample — indexed or not — contributes to.
pub struct SimpleSketch {
    max_buckets: usize,
    positive_indexed: bool,
    policy: IndexerPolicy,
    scale: i32,
    indexer: Box<dyn BucketIndexer>,
    counters: WindowedCounterArray,
    total_count: u64,
    count_for_zero: u64,
    count_for_wrong_sign: u64,
    min: f64,
    max: f64,
    sum: f64,
}

impl std::fmt::Debug for SimpleSketch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimpleSketch")
            .field("max_buckets", &self.max_buckets)
            .field("positive_indexed", &self.positive_indexed)
            .field("scale", &self.scale)
            .field("total_count", &self.total_count)
            .field("count_for_zero", &self.count_for_zero)
            .field("count_for_wrong_sign", &self.count_for_wrong_sign)
            .field("min", &self.min)
            .field("max", &self.max)
            .field("sum", &self.sum)
            .finish()
    }
}

impl Clone for SimpleSketch {
    fn clone(&self) -> Self {
        self.deep_copy()
    }
}

impl PartialEq for SimpleSketch {
    /// The equality relation from this crate's serialization contract: same
    /// polarity, scale, and indexer policy; scalars equal (`min`/`max`
    /// NaN-absorbing, `sum` bit-exact); identical counts at every logical
    /// index.
    fn eq(&self, other: &Self) -> bool {
        if self.positive_indexed != other.positive_indexed
            || self.scale != other.scale
            || self.policy != other.policy
            || self.total_count != other.total_count
            || self.count_for_zero != other.count_for_zero
            || self.count_for_wrong_sign != other.count_for_wrong_sign
            || self.sum.to_bits() != other.sum.to_bits()
        {
            return false;
        }
        let min_eq = self.min == other.min || (self.min.is_nan() && other.min.is_nan());
        let max_eq = self.max == other.max || (self.max.is_nan() && other.max.is_nan());
        if !min_eq || !max_eq {
            return false;
        }

        let bounds = (
            self.counters.index_start(),
            self.counters.index_end(),
            other.counters.index_start(),
            other.counters.index_end(),
        );
        if bounds.0 != bounds.2 || bounds.1 != bounds.3 {
            return false;
        }
        if let (Some(start), Some(end)) = (bounds.0, bounds.1) {
            for idx in start..=end {
                if self.counters.get(idx) != other.counters.get(idx) {
                    return false;
                }
            }
        }
        true
    }
}

impl Default for SimpleSketch {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_BUCKETS,
            DEFAULT_INITIAL_SCALE,
            true,
            IndexerPolicy::AutoSelect,
        )
        .expect("default configuration is always valid")
    }
}

impl SimpleSketch {
    /// Build a sketch with `max_buckets` counters budget, starting at
    /// `initial_scale`, indexing `positive_indexed ? non-negative :
    /// negative` samples, selecting indexers via `policy`.
    pub fn new(
        max_buckets: usize,
        initial_scale: i32,
        positive_indexed: bool,
        policy: IndexerPolicy,
    ) -> Result<Self> {
        if max_buckets == 0 {
            return Err(HistogramError::InvalidConfiguration(
                "max_buckets must be positive".into(),
            ));
        }
        let indexer = policy.build(initial_scale)?;
        Ok(Self {
            max_buckets,
            positive_indexed,
            policy,
            scale: initial_scale,
            indexer,
            counters: WindowedCounterArray::new(max_buckets),
            total_count: 0,
            count_for_zero: 0,
            count_for_wrong_sign: 0,
            min: f64::NAN,
            max: f64::NAN,
            sum: 0.0,
        })
    }

    /// The bucket budget this sketch was constructed with.
    pub fn max_buckets(&self) -> usize {
        self.max_buckets
    }

    /// `true` if this sketch indexes non-negative samples; `false` if it
    /// indexes negative samples.
    pub fn positive_indexed(&self) -> bool {
        self.positive_indexed
    }

    /// The indexer policy this sketch was constructed with.
    pub fn policy(&self) -> IndexerPolicy {
        self.policy
    }

    /// The scale currently in effect. Only ever decreases from the
    /// constructor's `initial_scale`, via automatic downscaling.
    pub fn scale(&self) -> i32 {
        self.scale
    }

    /// Total number of instances ever inserted, including zero and
    /// off-polarity samples.
    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    /// Instances inserted as exactly `0.0` (or `-0.0`) or as a subnormal
    /// value (see the crate's design notes on subnormal routing).
    pub fn count_for_zero(&self) -> u64 {
        self.count_for_zero
    }

    /// Instances inserted whose sign disagreed with this sketch's polarity.
    pub fn count_for_wrong_sign(&self) -> u64 {
        self.count_for_wrong_sign
    }

    /// The smallest value ever inserted (any polarity), or NaN if empty.
    pub fn min(&self) -> f64 {
        self.min
    }

    /// The largest value ever inserted (any polarity), or NaN if empty.
    pub fn max(&self) -> f64 {
        self.max
    }

    /// The running sum of every finite value ever inserted.
    pub fn sum(&self) -> f64 {
        self.sum
    }

    /// `true` iff no sample has ever been inserted.
    pub fn is_empty(&self) -> bool {
        self.total_count == 0
    }

    /// `(base - 1) / (base + 1)`: the relative error any percentile read
    /// from this sketch is bounded by, at the current scale.
    pub fn percentile_relative_error(&self) -> f64 {
        let base = self.indexer.get_base();
        (base - 1.0) / (base + 1.0)
    }

    /// Insert `instances` copies of `v`. NaN and +/-infinity are silently
    /// dropped. Never fails on a finite input; the `Result` exists only to
    /// surface [`crate::error::HistogramError::InternalInvariantViolation`]
    /// should this crate's downscale bookkeeping ever be wrong.
    pub fn insert(&mut self, v: f64, instances: u64) -> Result<()> {
        if v.is_nan() || v.is_infinite() || instances == 0 {
            return Ok(());
        }

        if self.total_count == 0 {
            self.min = v;
            self.max = v;
        } else {
            self.min = self.min.min(v);
            self.max = self.max.max(v);
        }
        self.sum += v * instances as f64;
        self.total_count += instances;

        if v == 0.0 || crate::bits::is_subnormal_or_zero(v) {
            self.count_for_zero += instances;
            return Ok(());
        }

        let is_negative = v.is_sign_negative();
        if is_negative == self.positive_indexed {
            self.count_for_wrong_sign += instances;
            return Ok(());
        }

        let i = self.indexer.get_bucket_index(v.abs());
        if self.counters.increment(i, instances) {
            return Ok(());
        }

        let k = self.downscale_amount_for(i);
        self.downscale(k)?;
        let shifted = i >> k;
        if !self.counters.increment(shifted, instances) {
            return Err(HistogramError::InternalInvariantViolation(format!(
                "increment of index {shifted} failed immediately after a computed downscale by {k}"
            )));
        }
        Ok(())
    }

    fn downscale_amount_for(&self, i: i64) -> i32 {
        let index_start = self.counters.index_start().unwrap_or(i);
        let index_end = self.counters.index_end().unwrap_or(i);
        let lo = i.min(index_start);
        let hi = i.max(index_end);
        let mut k = 1;
        while ((hi >> k) - (lo >> k) + 1) as usize > self.max_buckets {
            k += 1;
        }
        k
    }

    /// Reduce scale by `k`, rebuilding the counter array and indexer. Every
    /// old bucket's count moves into exactly one new bucket.
    pub fn downscale(&mut self, k: i32) -> Result<()> {
        if k <= 0 {
            return Err(HistogramError::InvalidConfiguration(format!(
                "downscale amount must be positive, got {k}"
            )));
        }
        let old_scale = self.scale;
        let new_scale = old_scale - k;

        if self.counters.is_empty() {
            self.indexer = self.policy.build(new_scale)?;
            self.scale = new_scale;
            return Ok(());
        }

        let mut rebuilt = WindowedCounterArray::new(self.max_buckets);
        let start = self.counters.index_start().expect("checked non-empty above");
        let end = self.counters.index_end().expect("checked non-empty above");
        for old_idx in start..=end {
            let count = self.counters.get(old_idx);
            if count == 0 {
                continue;
            }
            if !rebuilt.increment(old_idx >> k, count) {
                return Err(HistogramError::InternalInvariantViolation(format!(
                    "downscale by {k} produced a union window wider than max_buckets {}",
                    self.max_buckets
                )));
            }
        }

        self.indexer = self.policy.build(new_scale)?;
        self.scale = new_scale;
        self.counters = rebuilt;
        log::debug!("downscaled from scale {old_scale} to {new_scale}");
        Ok(())
    }

    /// Merge `other`'s observations into `self`. `other` is left unmodified.
    /// Requires identical polarity.
    pub fn merge(&mut self, other: &Self) -> Result<()> {
        if self.positive_indexed != other.positive_indexed {
            return Err(HistogramError::IncompatibleOperation(
                "cannot merge sketches of different polarity".into(),
            ));
        }

        let mut target_scale = self.scale.min(other.scale);
        loop {
            let self_shift = self.scale - target_scale;
            let other_shift = other.scale - target_scale;
            let self_lo = self.counters.index_start().map(|i| i >> self_shift);
            let self_hi = self.counters.index_end().map(|i| i >> self_shift);
            let other_lo = other.counters.index_start().map(|i| i >> other_shift);
            let other_hi = other.counters.index_end().map(|i| i >> other_shift);
            let lo = [self_lo, other_lo].into_iter().flatten().min();
            let hi = [self_hi, other_hi].into_iter().flatten().max();
            let fits = match (lo, hi) {
                (Some(lo), Some(hi)) => (hi - lo + 1) as usize <= self.max_buckets,
                _ => true,
            };
            if fits {
                break;
            }
            target_scale -= 1;
        }

        if target_scale < self.scale {
            self.downscale(self.scale - target_scale)?;
        }

        let shift = other.scale - self.scale;
        if let (Some(start), Some(end)) = (other.counters.index_start(), other.counters.index_end()) {
            for idx in start..=end {
                let count = other.counters.get(idx);
                if count == 0 {
                    continue;
                }
                let target = idx >> shift;
                if !self.counters.increment(target, count) {
                    return Err(HistogramError::InternalInvariantViolation(format!(
                        "merge increment of index {target} failed after downscaling to a common scale"
                    )));
                }
            }
        }

        self.total_count += other.total_count;
        self.count_for_zero += other.count_for_zero;
        self.count_for_wrong_sign += other.count_for_wrong_sign;
        self.sum += other.sum;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        Ok(())
    }

    /// Remove `other`'s observations from `self`. `other` is left
    /// unmodified. Requires identical polarity.
    pub fn subtract(&mut self, other: &Self) -> Result<()> {
        if self.positive_indexed != other.positive_indexed {
            return Err(HistogramError::IncompatibleOperation(
                "cannot subtract sketches of different polarity".into(),
            ));
        }

        let common_scale = self.scale.min(other.scale);
        if common_scale < self.scale {
            self.downscale(self.scale - common_scale)?;
        }
        let shift = other.scale - common_scale;

        if let (Some(start), Some(end)) = (other.counters.index_start(), other.counters.index_end()) {
            for idx in start..=end {
                let count = other.counters.get(idx);
                if count == 0 {
                    continue;
                }
                let target = idx >> shift;
                self.decrement_with_borrow(target, count)?;
            }
        }

        self.total_count = self.total_count.saturating_sub(other.total_count);
        self.count_for_zero = self.count_for_zero.saturating_sub(other.count_for_zero);
        self.count_for_wrong_sign = self.count_for_wrong_sign.saturating_sub(other.count_for_wrong_sign);
        self.sum -= other.sum;

        if self.total_count == 0 {
            self.min = f64::NAN;
            self.max = f64::NAN;
        }
        Ok(())
    }

    /// Decrement `target` by `amount`, borrowing from the highest-indexed
    /// other non-empty bucket if `target` alone does not hold enough count.
    /// See this crate's design notes for why the higher-indexed neighbor is
    /// the deterministic choice.
    fn decrement_with_borrow(&mut self, target: i64, amount: u64) -> Result<()> {
        let mut remaining = amount;
        let direct = remaining.min(self.counters.get(target));
        if direct > 0 {
            self.counters.try_decrement(target, direct);
            remaining -= direct;
        }

        while remaining > 0 {
            let neighbor = self.highest_nonempty_index_other_than(target).ok_or_else(|| {
                HistogramError::InternalInvariantViolation(
                    "subtract could not find enough count to borrow from a neighboring bucket".into(),
                )
            })?;
            let available = self.counters.get(neighbor);
            let take = remaining.min(available);
            self.counters.try_decrement(neighbor, take);
            remaining -= take;
        }
        Ok(())
    }

    fn highest_nonempty_index_other_than(&self, excluded: i64) -> Option<i64> {
        let start = self.counters.index_start()?;
        let end = self.counters.index_end()?;
        (start..=end)
            .rev()
            .find(|&idx| idx != excluded && self.counters.get(idx) > 0)
    }

    pub(crate) fn counters(&self) -> &WindowedCounterArray {
        &self.counters
    }

    /// Overwrite every scalar and the counter array directly, bypassing
    /// `insert`'s accounting. Used only by `wire::decode` to restore a
    /// previously-encoded logical state.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn restore_from_wire(
        &mut self,
        total_count: u64,
        sum: f64,
        min: f64,
        max: f64,
        count_for_wrong_sign: u64,
        count_for_zero: u64,
        counters: WindowedCounterArray,
    ) {
        self.total_count = total_count;
        self.sum = sum;
        self.min = min;
        self.max = max;
        self.count_for_wrong_sign = count_for_wrong_sign;
        self.count_for_zero = count_for_zero;
        self.counters = counters;
    }

    /// An independent copy with no aliasing to `self`.
    pub fn deep_copy(&self) -> Self {
        Self {
            max_buckets: self.max_buckets,
            positive_indexed: self.positive_indexed,
            policy: self.policy,
            scale: self.scale,
            indexer: self
                .policy
                .build(self.scale)
                .expect("scale was already valid for this policy"),
            counters: self.counters.deep_copy(),
            total_count: self.total_count,
            count_for_zero: self.count_for_zero,
            count_for_wrong_sign: self.count_for_wrong_sign,
            min: self.min,
            max: self.max,
            sum: self.sum,
        }
    }

    /// Iterate this sketch's buckets in the order described by
    /// [`BucketIter`].
    pub fn iter(&self) -> BucketIter<'_> {
        BucketIter::new(self)
    }

    /// Compute a percentile reading for each (unsorted) entry of
    /// `thresholds`, sorting `thresholds` in place as a side effect.
    /// Thresholds outside `[0, 100]` clamp to `min`/`max`. All outputs are
    /// NaN if this sketch is empty.
    pub fn percentiles(&self, thresholds: &mut [f64]) -> Vec<f64> {
        thresholds.sort_by(|a, b| a.total_cmp(b));

        if self.total_count == 0 {
            return vec![f64::NAN; thresholds.len()];
        }

        let mut results = Vec::with_capacity(thresholds.len());
        let mut cumulative = 0u64;
        let mut buckets = self.iter();
        let mut current = buckets.next();

        for &t in thresholds.iter() {
            if t <= 0.0 {
                results.push(self.min);
                continue;
            }
            if t >= 100.0 {
                results.push(self.max);
                continue;
            }
            let rank = ((t / 100.0) * self.total_count as f64).ceil() as u64;
            let rank = rank.max(1);
            loop {
                match current {
                    Some(bucket) => {
                        cumulative += bucket.count;
                        if cumulative >= rank {
                            results.push((bucket.start + bucket.end) / 2.0);
                            break;
                        }
                        current = buckets.next();
                    }
                    None => {
                        results.push(self.max);
                        break;
                    }
                }
            }
        }
        results
    }
}

/// Indexed-bucket scan order during [`SimpleSketch::iter`]: ascending for a
/// positive-indexed sketch, descending (most-negative-magnitude first) for a
/// negative-indexed one.
enum Phase {
    OffPolaritySummary,
    Zero,
    Indexed,
    Done,
}

/// Iterator over a [`SimpleSketch`]'s buckets; see [`SimpleSketch::iter`]
/// for the emission order and bound-tightening rules at the window's edges.
pub struct BucketIter<'a> {
    sketch: &'a SimpleSketch,
    phase: Phase,
    cursor: Option<i64>,
}

impl<'a> BucketIter<'a> {
    fn new(sketch: &'a SimpleSketch) -> Self {
        let phase = if sketch.positive_indexed {
            Phase::OffPolaritySummary
        } else {
            Phase::Indexed
        };
        let cursor = if !sketch.positive_indexed {
            sketch.counters.index_end()
        } else {
            None
        };
        Self { sketch, phase, cursor }
    }

    fn next_index(&self, idx: i64) -> i64 {
        if self.sketch.positive_indexed {
            idx + 1
        } else {
            idx - 1
        }
    }

    fn is_last_index(&self, idx: i64) -> bool {
        if self.sketch.positive_indexed {
            self.sketch.counters.index_end() == Some(idx)
        } else {
            self.sketch.counters.index_start() == Some(idx)
        }
    }
}

impl<'a> Iterator for BucketIter<'a> {
    type Item = Bucket;

    fn next(&mut self) -> Option<Bucket> {
        loop {
            match self.phase {
                Phase::OffPolaritySummary => {
                    self.phase = Phase::Zero;
                    if self.sketch.count_for_wrong_sign > 0 {
                        return Some(Bucket {
                            start: self.sketch.min,
                            end: self.sketch.max.min(0.0),
                            count: self.sketch.count_for_wrong_sign,
                        });
                    }
                }
                Phase::Zero => {
                    self.phase = if self.sketch.positive_indexed {
                        self.cursor = self.sketch.counters.index_start();
                        Phase::Indexed
                    } else {
                        Phase::Done
                    };
                    if self.sketch.count_for_zero > 0 {
                        return Some(Bucket {
                            start: 0.0,
                            end: 0.0,
                            count: self.sketch.count_for_zero,
                        });
                    }
                }
                Phase::Indexed => {
                    let idx = match self.cursor {
                        Some(idx) => idx,
                        None => {
                            self.phase = if self.sketch.positive_indexed {
                                Phase::Done
                            } else {
                                Phase::Zero
                            };
                            continue;
                        }
                    };
                    let last = self.is_last_index(idx);
                    self.cursor = if last { None } else { Some(self.next_index(idx)) };

                    let count = self.sketch.counters.get(idx);
                    if count == 0 {
                        continue;
                    }

                    let mut start = self.sketch.indexer.get_bucket_start(idx);
                    let mut end = self.sketch.indexer.get_bucket_end(idx);
                    let at_window_start = self.sketch.counters.index_start() == Some(idx);
                    let at_window_end = self.sketch.counters.index_end() == Some(idx);

                    if self.sketch.positive_indexed {
                        if at_window_start && self.sketch.min > 0.0 {
                            start = self.sketch.min;
                        }
                        if at_window_end {
                            end = self.sketch.max;
                        }
                        return Some(Bucket { start, end, count });
                    } else {
                        // magnitude bucket [start, end) on the negative side becomes [-end, -start)
                        let (mut neg_start, mut neg_end) = (-end, -start);
                        if at_window_end && self.sketch.min < 0.0 {
                            neg_start = self.sketch.min;
                        }
                        if at_window_start && self.sketch.max < 0.0 {
                            neg_end = self.sketch.max;
                        }
                        return Some(Bucket {
                            start: neg_start,
                            end: neg_end,
                            count,
                        });
                    }
                }
                Phase::Done => return None,
            }
        }
    }
}
