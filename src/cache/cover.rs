//! Selection of reusable cached composites for a render target.
//!
//! Every cached key that matches a contiguous sub-run of the target becomes an interval
//! over target positions. A maximum-weight set of non-overlapping intervals is then chosen
//! by weighted interval scheduling, where the weight of a key is the number of pairwise
//! blends it saves (`len - 1`).

use crate::cache::store::CompositeCache;
use crate::foundation::core::{CompositeKey, LayerIndex, ensure_ascending};
use crate::foundation::error::LayerResult;

/// A cached key matching `target[start..end]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Interval<'k> {
    pub(crate) start: usize,
    pub(crate) end: usize,
    pub(crate) key: &'k CompositeKey,
}

impl Interval<'_> {
    fn weight(&self) -> usize {
        self.key.len() - 1
    }
}

/// Leftmost position where `key` occurs in `target` as a contiguous run.
pub(crate) fn find_leftmost(target: &[LayerIndex], key: &CompositeKey) -> Option<usize> {
    if key.len() > target.len() {
        return None;
    }
    target.windows(key.len()).position(|w| w == key.indices())
}

pub(crate) fn collect_intervals<'k>(
    keys: impl IntoIterator<Item = &'k CompositeKey>,
    target: &[LayerIndex],
) -> Vec<Interval<'k>> {
    keys.into_iter()
        .filter_map(|key| {
            find_leftmost(target, key).map(|start| Interval {
                start,
                end: start + key.len(),
                key,
            })
        })
        .collect()
}

/// Choose disjoint keys from `keys` that save the most blends when building `target`.
///
/// The result is ordered by position in `target`. Zero-weight (single-layer) keys are
/// never selected; ties keep the selection found first in end order.
pub fn select_cover<'k>(
    keys: impl IntoIterator<Item = &'k CompositeKey>,
    target: &[LayerIndex],
) -> Vec<CompositeKey> {
    let mut intervals = collect_intervals(keys, target);
    intervals.sort_by(|a, b| (a.end, a.start, a.key).cmp(&(b.end, b.start, b.key)));

    let m = intervals.len();
    let ends: Vec<usize> = intervals.iter().map(|iv| iv.end).collect();

    // best[k]: optimum over the first k intervals. jump[k]: prefix to continue from when
    // interval k-1 is taken.
    let mut best = vec![0usize; m + 1];
    let mut jump: Vec<Option<usize>> = vec![None; m + 1];
    for k in 1..=m {
        let iv = intervals[k - 1];
        let p = ends[..k - 1].partition_point(|&e| e <= iv.start);
        let with = iv.weight() + best[p];
        if with > best[k - 1] {
            best[k] = with;
            jump[k] = Some(p);
        } else {
            best[k] = best[k - 1];
        }
    }

    let mut selected = Vec::new();
    let mut k = m;
    while k > 0 {
        match jump[k] {
            Some(p) => {
                selected.push(intervals[k - 1].key.clone());
                k = p;
            }
            None => k -= 1,
        }
    }
    selected.reverse();

    tracing::debug!(
        candidates = m,
        selected = selected.len(),
        blends_saved = best[m],
        "selected cached cover"
    );
    selected
}

impl CompositeCache {
    /// Best set of non-overlapping cached keys to reuse when compositing `target`.
    pub fn get_precalculated(&self, target: &[LayerIndex]) -> LayerResult<Vec<CompositeKey>> {
        ensure_ascending(target, "render target")?;
        Ok(select_cover(self.keys(), target))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/cache/cover.rs"]
mod tests;
