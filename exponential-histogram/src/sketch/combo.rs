use super::{Bucket, SimpleSketch};
use crate::error::{HistogramError, Result};
use crate::index::IndexerPolicy;

/// A positive/negative pair of [`SimpleSketch`]es giving full-range
/// resolution. Children are created lazily: a `ComboSketch` that has only
/// ever seen non-negative values has no negative-side child at all.
pub struct ComboSketch {
    max_buckets_per_side: usize,
    initial_scale: i32,
    policy: IndexerPolicy,
    negative: Option<SimpleSketch>,
    positive: Option<SimpleSketch>,
}

impl std::fmt::Debug for ComboSketch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComboSketch")
            .field("max_buckets_per_side", &self.max_buckets_per_side)
            .field("initial_scale", &self.initial_scale)
            .field("has_negative", &self.negative.is_some())
            .field("has_positive", &self.positive.is_some())
            .finish()
    }
}

impl Clone for ComboSketch {
    fn clone(&self) -> Self {
        self.deep_copy()
    }
}

impl PartialEq for ComboSketch {
    fn eq(&self, other: &Self) -> bool {
        self.negative == other.negative && self.positive == other.positive
    }
}

impl Default for ComboSketch {
    fn default() -> Self {
        Self::new(
            super::simple::DEFAULT_MAX_BUCKETS,
            super::simple::DEFAULT_INITIAL_SCALE,
            IndexerPolicy::AutoSelect,
        )
    }
}

impl ComboSketch {
    /// Build an empty combo sketch. Each side, once created, gets its own
    /// `max_buckets_per_side`-sized [`SimpleSketch`].
    pub fn new(max_buckets_per_side: usize, initial_scale: i32, policy: IndexerPolicy) -> Self {
        Self {
            max_buckets_per_side,
            initial_scale,
            policy,
            negative: None,
            positive: None,
        }
    }

    /// The per-side bucket budget.
    pub fn max_buckets_per_side(&self) -> usize {
        self.max_buckets_per_side
    }

    /// The scale each lazily-created child starts at.
    pub fn initial_scale(&self) -> i32 {
        self.initial_scale
    }

    /// The indexer policy each lazily-created child uses.
    pub fn policy(&self) -> IndexerPolicy {
        self.policy
    }

    /// The negative-side child, if any value `< 0` has ever been inserted.
    pub fn negative(&self) -> Option<&SimpleSketch> {
        self.negative.as_ref()
    }

    /// The positive-side child, if any value `>= 0` has ever been inserted.
    pub fn positive(&self) -> Option<&SimpleSketch> {
        self.positive.as_ref()
    }

    fn positive_child(&mut self) -> Result<&mut SimpleSketch> {
        if self.positive.is_none() {
            self.positive = Some(SimpleSketch::new(
                self.max_buckets_per_side,
                self.initial_scale,
                true,
                self.policy,
            )?);
        }
        Ok(self.positive.as_mut().expect("just created"))
    }

    fn negative_child(&mut self) -> Result<&mut SimpleSketch> {
        if self.negative.is_none() {
            self.negative = Some(SimpleSketch::new(
                self.max_buckets_per_side,
                self.initial_scale,
                false,
                self.policy,
            )?);
        }
        Ok(self.negative.as_mut().expect("just created"))
    }

    /// Insert `instances` copies of `v`, routing by sign: `v >= 0` to the
    /// positive child, `v < 0` to the negative child. NaN and +/-infinity
    /// are silently dropped, same as [`SimpleSketch::insert`].
    pub fn insert(&mut self, v: f64, instances: u64) -> Result<()> {
        if v.is_nan() || v.is_infinite() {
            return Ok(());
        }
        if v.is_sign_negative() && v != 0.0 {
            self.negative_child()?.insert(v, instances)
        } else {
            self.positive_child()?.insert(v, instances)
        }
    }

    /// Total instances across both children.
    pub fn total_count(&self) -> u64 {
        self.negative.as_ref().map_or(0, SimpleSketch::total_count)
            + self.positive.as_ref().map_or(0, SimpleSketch::total_count)
    }

    /// `true` iff neither child has ever been created.
    pub fn is_empty(&self) -> bool {
        self.negative.is_none() && self.positive.is_none()
    }

    /// The smallest value ever inserted, or NaN if empty.
    pub fn min(&self) -> f64 {
        match (&self.negative, &self.positive) {
            (Some(n), Some(p)) => n.min().min(p.min()),
            (Some(n), None) => n.min(),
            (None, Some(p)) => p.min(),
            (None, None) => f64::NAN,
        }
    }

    /// The largest value ever inserted, or NaN if empty.
    pub fn max(&self) -> f64 {
        match (&self.negative, &self.positive) {
            (Some(n), Some(p)) => n.max().max(p.max()),
            (Some(n), None) => n.max(),
            (None, Some(p)) => p.max(),
            (None, None) => f64::NAN,
        }
    }

    /// The running sum of every finite value ever inserted.
    pub fn sum(&self) -> f64 {
        self.negative.as_ref().map_or(0.0, SimpleSketch::sum)
            + self.positive.as_ref().map_or(0.0, SimpleSketch::sum)
    }

    /// Merge `other`'s observations into `self`, side by side. `other` is
    /// left unmodified.
    pub fn merge(&mut self, other: &Self) -> Result<()> {
        if let Some(other_negative) = &other.negative {
            self.negative_child()?.merge(other_negative)?;
        }
        if let Some(other_positive) = &other.positive {
            self.positive_child()?.merge(other_positive)?;
        }
        Ok(())
    }

    /// Remove `other`'s observations from `self`, side by side. `other` is
    /// left unmodified. A side absent from `self` but present in `other` is
    /// an incompatible operation, since there is nothing to subtract from.
    pub fn subtract(&mut self, other: &Self) -> Result<()> {
        if let Some(other_negative) = &other.negative {
            match &mut self.negative {
                Some(negative) => negative.subtract(other_negative)?,
                None => {
                    return Err(HistogramError::IncompatibleOperation(
                        "cannot subtract a negative side that was never present".into(),
                    ))
                }
            }
        }
        if let Some(other_positive) = &other.positive {
            match &mut self.positive {
                Some(positive) => positive.subtract(other_positive)?,
                None => {
                    return Err(HistogramError::IncompatibleOperation(
                        "cannot subtract a positive side that was never present".into(),
                    ))
                }
            }
        }
        Ok(())
    }

    /// Install a previously-decoded child in its polarity's slot. Used only
    /// by `wire::decode`.
    pub(crate) fn restore_child_from_wire(&mut self, child: SimpleSketch) {
        if child.positive_indexed() {
            self.positive = Some(child);
        } else {
            self.negative = Some(child);
        }
    }

    /// An independent copy with no aliasing to `self`.
    pub fn deep_copy(&self) -> Self {
        Self {
            max_buckets_per_side: self.max_buckets_per_side,
            initial_scale: self.initial_scale,
            policy: self.policy,
            negative: self.negative.as_ref().map(SimpleSketch::deep_copy),
            positive: self.positive.as_ref().map(SimpleSketch::deep_copy),
        }
    }

    /// Concatenate negative-then-positive iteration across both children.
    pub fn iter(&self) -> impl Iterator<Item = Bucket> + '_ {
        self.negative
            .iter()
            .flat_map(SimpleSketch::iter)
            .chain(self.positive.iter().flat_map(SimpleSketch::iter))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty_combo_has_no_children() {
        let combo = ComboSketch::default();
        assert!(combo.is_empty());
        assert!(combo.negative().is_none());
        assert!(combo.positive().is_none());
        assert_eq!(combo.iter().count(), 0);
    }

    #[test]
    fn insert_creates_children_lazily_by_sign() {
        let mut combo = ComboSketch::default();
        combo.insert(5.0, 1).unwrap();
        assert!(combo.positive().is_some());
        assert!(combo.negative().is_none());
        combo.insert(-5.0, 1).unwrap();
        assert!(combo.negative().is_some());
    }

    #[test]
    fn scenario_three_ten_bucket_combo_minus_100_to_99() {
        let mut combo = ComboSketch::new(10, 12, IndexerPolicy::AutoSelect);
        for v in -100..=99i64 {
            combo.insert(v as f64, 1).unwrap();
        }
        assert_eq!(combo.total_count(), 200);
        let buckets: Vec<_> = combo.iter().collect();
        let zero_bucket_count = combo
            .positive()
            .map(SimpleSketch::count_for_zero)
            .unwrap_or(0);
        assert_eq!(zero_bucket_count, 1);
        let total: u64 = buckets.iter().map(|b| b.count).sum();
        assert_eq!(total, 200);

        let expected = [
            (-100.0, -64.0, 37),
            (-64.0, -32.0, 32),
            (-32.0, -16.0, 16),
            (-16.0, -8.0, 8),
            (-8.0, -4.0, 4),
            (-4.0, -2.0, 2),
            (-2.0, -1.0, 1),
            (0.0, 0.0, 1),
            (1.0, 2.0, 1),
            (2.0, 4.0, 2),
            (4.0, 8.0, 4),
            (8.0, 16.0, 8),
            (16.0, 32.0, 16),
            (32.0, 64.0, 32),
            (64.0, 99.0, 36),
        ];
        assert_eq!(buckets.len(), expected.len());
        for (bucket, &(start, end, count)) in buckets.iter().zip(expected.iter()) {
            assert_eq!(bucket.start, start, "bucket {bucket:?}");
            assert_eq!(bucket.end, end, "bucket {bucket:?}");
            assert_eq!(bucket.count, count, "bucket {bucket:?}");
        }
    }

    #[test]
    fn merge_combines_both_sides() {
        let mut a = ComboSketch::default();
        a.insert(1.0, 1).unwrap();
        a.insert(-1.0, 1).unwrap();
        let mut b = ComboSketch::default();
        b.insert(2.0, 1).unwrap();
        b.insert(-2.0, 1).unwrap();
        a.merge(&b).unwrap();
        assert_eq!(a.total_count(), 4);
    }

    #[test]
    fn subtract_inverts_merge_on_disjoint_supports() {
        let mut x = ComboSketch::default();
        x.insert(10.0, 1).unwrap();
        x.insert(-10.0, 1).unwrap();
        let mut y = ComboSketch::default();
        y.insert(1000.0, 1).unwrap();
        y.insert(-1000.0, 1).unwrap();

        let mut merged = x.deep_copy();
        merged.merge(&y).unwrap();
        merged.subtract(&y).unwrap();
        assert_eq!(merged.total_count(), x.total_count());
    }

    #[test]
    fn deep_copy_does_not_alias() {
        let mut a = ComboSketch::default();
        a.insert(1.0, 1).unwrap();
        let mut copy = a.deep_copy();
        copy.insert(2.0, 1).unwrap();
        assert_eq!(a.total_count(), 1);
        assert_eq!(copy.total_count(), 2);
    }
}
