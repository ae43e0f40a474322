//! Radix-partitioned parallel sort of the tracker permutation.
//!
//! The data cache is never reordered. SPLIT scatters every tracker slot into
//! the range its radix code owns (computed from the histogram's prefix
//! sums); SORT then quicksorts each bucket range independently, so the
//! tracker as a whole comes out ordered under the plugged-in comparator.
//! Bucket boundaries double as the lookup zoom table.

use crate::bits::COLLISION_MARK;
use crate::cache::{LongCache, Tracker};
use crate::progress::Progress;
use crate::radix::{radix_of, RadixIndex, RADIX_BUCKETS};

/// Bucket ranges above this size are split recursively across threads.
const SPLIT_THRESHOLD: u64 = 1 << 13;
/// Below this size insertion sort beats quicksort.
const INSERTION_THRESHOLD: u64 = 24;
const PROGRESS_BATCH: u64 = 1000;

/// Strict-weak order over raw cache values plus the mapping from a cache
/// value to the 64-bit word whose high bits drive radix bucketing.
pub trait SortComparator: Sync {
    fn lt(&self, left: u64, right: u64) -> bool;
    fn data_value(&self, value: u64) -> u64;
}

/// Unsigned order on encoded values, collision mark ignored.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultComparator;

impl SortComparator for DefaultComparator {
    #[inline]
    fn lt(&self, left: u64, right: u64) -> bool {
        COLLISION_MARK.clear(left, false) < COLLISION_MARK.clear(right, false)
    }

    #[inline]
    fn data_value(&self, value: u64) -> u64 {
        value
    }
}

/// One entry of the post-sort zoom table: the highest radix code in the
/// bucket and the tracker index it starts at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortBucket {
    pub radix: usize,
    pub start: u64,
}

/// The sort phases died with a worker; partial results are discarded.
#[derive(Debug)]
pub struct SortInterrupted;

pub struct ParallelSorter<'a, C: SortComparator> {
    values: &'a LongCache,
    count: u64,
    radix: &'a RadixIndex,
    tracker: &'a mut Tracker,
    processors: usize,
    progress: &'a dyn Progress,
    comparator: &'a C,
}

impl<'a, C: SortComparator> ParallelSorter<'a, C> {
    pub fn new(
        values: &'a LongCache,
        count: u64,
        radix: &'a RadixIndex,
        tracker: &'a mut Tracker,
        processors: usize,
        progress: &'a dyn Progress,
        comparator: &'a C,
    ) -> Self {
        Self {
            values,
            count,
            radix,
            tracker,
            processors,
            progress,
            comparator,
        }
    }

    pub fn run(mut self) -> Result<Vec<SortBucket>, SortInterrupted> {
        let (buckets, ranges) = self.split();
        self.sort(&ranges)?;
        Ok(buckets)
    }

    /// Scatters tracker slots into per-radix ranges. Returns the zoom table
    /// and the half-open range each non-empty code owns.
    fn split(&mut self) -> (Vec<SortBucket>, Vec<(u64, u64)>) {
        self.progress.started("SPLIT");

        let counts = self.radix.counts();
        let mut next = vec![0u64; RADIX_BUCKETS];
        let mut buckets = Vec::new();
        let mut ranges = Vec::new();
        let mut offset = 0;
        for (code, &count) in counts.iter().enumerate() {
            if count > 0 {
                buckets.push(SortBucket {
                    radix: code,
                    start: offset,
                });
                ranges.push((offset, offset + count));
                next[code] = offset;
                offset += count;
            }
        }
        debug_assert_eq!(offset, self.count, "radix histogram out of step");

        let mut pending = 0;
        for index in 0..self.count {
            let code = radix_of(self.comparator.data_value(self.values.get(index)));
            self.tracker.set(next[code], index as i64);
            next[code] += 1;
            pending += 1;
            if pending == PROGRESS_BATCH {
                self.progress.add(pending);
                pending = 0;
            }
        }
        self.progress.add(pending);
        self.progress.done();

        (buckets, ranges)
    }

    #[cfg(feature = "parallel")]
    fn sort(self, ranges: &[(u64, u64)]) -> Result<(), SortInterrupted> {
        use rayon::prelude::*;

        self.progress.started("SORT");
        let shared = SharedTracker::new(self.tracker);
        let values = self.values;
        let comparator = self.comparator;
        let progress = self.progress;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.processors.max(1))
            .build();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| match pool {
            Ok(pool) => pool.install(|| {
                ranges.par_iter().for_each(|&(lo, hi)| {
                    quicksort_parallel(shared, values, comparator, lo, hi);
                    progress.add(hi - lo);
                });
            }),
            Err(_) => {
                for &(lo, hi) in ranges {
                    quicksort(shared, values, comparator, lo, hi);
                    progress.add(hi - lo);
                }
            }
        }));
        self.progress.done();
        outcome.map_err(|_| SortInterrupted)
    }

    #[cfg(not(feature = "parallel"))]
    fn sort(self, ranges: &[(u64, u64)]) -> Result<(), SortInterrupted> {
        self.progress.started("SORT");
        let shared = SharedTracker::new(self.tracker);
        for &(lo, hi) in ranges {
            quicksort(shared, self.values, self.comparator, lo, hi);
            self.progress.add(hi - lo);
        }
        self.progress.done();
        Ok(())
    }
}

/// Tracker handle shared across sort workers. Sound because every worker
/// owns a disjoint tracker index range: bucket ranges never overlap and the
/// recursive splits partition their parent range.
#[derive(Clone, Copy)]
struct SharedTracker {
    ptr: *mut Tracker,
}

unsafe impl Send for SharedTracker {}
unsafe impl Sync for SharedTracker {}

impl SharedTracker {
    fn new(tracker: &mut Tracker) -> Self {
        Self { ptr: tracker }
    }

    #[inline]
    fn get(self, index: u64) -> i64 {
        unsafe { (*self.ptr).get(index) }
    }

    #[inline]
    fn swap(self, a: u64, b: u64) {
        unsafe { (*self.ptr).swap(a, b) }
    }
}

#[inline]
fn value_at(tracker: SharedTracker, values: &LongCache, index: u64) -> u64 {
    values.get(tracker.get(index) as u64)
}

#[cfg(feature = "parallel")]
fn quicksort_parallel<C: SortComparator>(
    tracker: SharedTracker,
    values: &LongCache,
    comparator: &C,
    lo: u64,
    hi: u64,
) {
    if hi - lo <= SPLIT_THRESHOLD {
        quicksort(tracker, values, comparator, lo, hi);
        return;
    }
    let split = partition(tracker, values, comparator, lo, hi);
    rayon::join(
        || quicksort_parallel(tracker, values, comparator, lo, split + 1),
        || quicksort_parallel(tracker, values, comparator, split + 1, hi),
    );
}

/// Iterative quicksort over the half-open tracker range `[lo, hi)`.
fn quicksort<C: SortComparator>(
    tracker: SharedTracker,
    values: &LongCache,
    comparator: &C,
    lo: u64,
    hi: u64,
) {
    let mut stack = vec![(lo, hi)];
    while let Some((lo, hi)) = stack.pop() {
        let len = hi - lo;
        if len < 2 {
            continue;
        }
        if len <= INSERTION_THRESHOLD {
            insertion_sort(tracker, values, comparator, lo, hi);
            continue;
        }
        let split = partition(tracker, values, comparator, lo, hi);
        stack.push((lo, split + 1));
        stack.push((split + 1, hi));
    }
}

/// Hoare partition pivoting on the median of three. The median element is
/// moved to `lo` first, which pins the returned split into `[lo, hi - 2]`:
/// both sides stay non-empty and recursion always makes progress.
fn partition<C: SortComparator>(
    tracker: SharedTracker,
    values: &LongCache,
    comparator: &C,
    lo: u64,
    hi: u64,
) -> u64 {
    let mid = lo + (hi - lo) / 2;
    let at_lo = value_at(tracker, values, lo);
    let at_mid = value_at(tracker, values, mid);
    let at_hi = value_at(tracker, values, hi - 1);
    let median = median_of_three(comparator, at_lo, at_mid, at_hi);
    if median == at_mid && median != at_lo {
        tracker.swap(lo, mid);
    } else if median == at_hi && median != at_lo {
        tracker.swap(lo, hi - 1);
    }
    let pivot = value_at(tracker, values, lo);

    let mut i = lo as i64 - 1;
    let mut j = hi as i64;
    loop {
        loop {
            i += 1;
            if !comparator.lt(value_at(tracker, values, i as u64), pivot) {
                break;
            }
        }
        loop {
            j -= 1;
            if !comparator.lt(pivot, value_at(tracker, values, j as u64)) {
                break;
            }
        }
        if i >= j {
            return j as u64;
        }
        tracker.swap(i as u64, j as u64);
    }
}

fn insertion_sort<C: SortComparator>(
    tracker: SharedTracker,
    values: &LongCache,
    comparator: &C,
    lo: u64,
    hi: u64,
) {
    for k in lo + 1..hi {
        let mut m = k;
        while m > lo
            && comparator.lt(
                value_at(tracker, values, m),
                value_at(tracker, values, m - 1),
            )
        {
            tracker.swap(m, m - 1);
            m -= 1;
        }
    }
}

fn median_of_three<C: SortComparator>(comparator: &C, a: u64, b: u64, c: u64) -> u64 {
    if comparator.lt(a, b) {
        if comparator.lt(b, c) {
            b
        } else if comparator.lt(a, c) {
            c
        } else {
            a
        }
    } else if comparator.lt(a, c) {
        a
    } else if comparator.lt(b, c) {
        c
    } else {
        b
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::DEFAULT_CHUNK_SIZE;
    use crate::progress::NoProgress;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn eid(len: u64, payload: u64) -> u64 {
        (len << 57) | (payload & ((1 << 56) - 1))
    }

    fn sorted_tracker(values: Vec<u64>) -> (LongCache, Tracker, Vec<SortBucket>) {
        let count = values.len() as u64;
        let mut cache = LongCache::new(DEFAULT_CHUNK_SIZE, 0);
        let mut radix = RadixIndex::new();
        for (i, &v) in values.iter().enumerate() {
            cache.set(i as u64, v);
            radix.register(v);
        }
        let mut tracker = Tracker::for_length(count, DEFAULT_CHUNK_SIZE);
        let buckets = ParallelSorter::new(
            &cache,
            count,
            &radix,
            &mut tracker,
            2,
            &NoProgress,
            &DefaultComparator,
        )
        .run()
        .unwrap();
        (cache, tracker, buckets)
    }

    #[test]
    fn tracker_orders_values_without_moving_them() {
        let mut rng = StdRng::seed_from_u64(0xBEEF);
        let values: Vec<u64> = (0..5000)
            .map(|_| eid(rng.gen_range(1..=9), rng.gen()))
            .collect();
        let (cache, tracker, _) = sorted_tracker(values.clone());

        for i in 0..values.len() as u64 {
            // Data cache untouched.
            assert_eq!(cache.get(i), values[i as usize]);
        }
        let mut seen = vec![false; values.len()];
        for i in 1..values.len() as u64 {
            let a = cache.get(tracker.get(i - 1) as u64);
            let b = cache.get(tracker.get(i) as u64);
            assert!(a <= b, "tracker out of order at {i}");
        }
        for i in 0..values.len() as u64 {
            seen[tracker.get(i) as usize] = true;
        }
        assert!(seen.iter().all(|&s| s), "tracker is not a permutation");
    }

    #[test]
    fn gap_values_collect_at_the_front() {
        let values = vec![eid(3, 77), 0, eid(1, 1), 0, eid(2, 500)];
        let (cache, tracker, _) = sorted_tracker(values);
        assert_eq!(cache.get(tracker.get(0) as u64), 0);
        assert_eq!(cache.get(tracker.get(1) as u64), 0);
        assert_ne!(cache.get(tracker.get(2) as u64), 0);
    }

    #[test]
    fn bucket_table_matches_radix_ranges() {
        let mut rng = StdRng::seed_from_u64(0xCAFE);
        let values: Vec<u64> = (0..2000)
            .map(|_| eid(rng.gen_range(1..=4), rng.gen()))
            .collect();
        let (cache, tracker, buckets) = sorted_tracker(values.clone());

        assert!(buckets.windows(2).all(|w| w[0].radix < w[1].radix));
        for (k, bucket) in buckets.iter().enumerate() {
            let end = buckets
                .get(k + 1)
                .map(|b| b.start)
                .unwrap_or(values.len() as u64);
            assert!(bucket.start < end);
            for i in bucket.start..end {
                let value = cache.get(tracker.get(i) as u64);
                assert_eq!(radix_of(value), bucket.radix);
            }
        }
    }

    #[test]
    fn equal_heavy_input_still_sorts() {
        let mut values = vec![eid(2, 42); 40_000];
        values.extend((0..40_000).map(|i| eid(2, i)));
        let (cache, tracker, _) = sorted_tracker(values.clone());
        for i in 1..values.len() as u64 {
            assert!(cache.get(tracker.get(i - 1) as u64) <= cache.get(tracker.get(i) as u64));
        }
    }

    #[test]
    fn two_level_comparator_breaks_ties_by_value() {
        // Sorting node ids whose eIds tie: the secondary order keeps runs of
        // equal eIds ascending, the way the duplicate scan needs them.
        struct ByEidThenId<'a> {
            eids: &'a LongCache,
        }
        impl SortComparator for ByEidThenId<'_> {
            fn lt(&self, left: u64, right: u64) -> bool {
                let (le, re) = (self.eids.get(left), self.eids.get(right));
                le < re || (le == re && left < right)
            }
            fn data_value(&self, value: u64) -> u64 {
                self.eids.get(value)
            }
        }

        let mut eids = LongCache::new(DEFAULT_CHUNK_SIZE, 0);
        let assigned = [eid(1, 9), eid(1, 9), eid(1, 2), eid(1, 9), eid(1, 2)];
        for (node, &e) in assigned.iter().enumerate() {
            eids.set(node as u64, e);
        }

        let mut node_ids = LongCache::new(DEFAULT_CHUNK_SIZE, 0);
        let mut radix = RadixIndex::new();
        // Scrambled insertion order.
        for (slot, node) in [3u64, 0, 4, 2, 1].into_iter().enumerate() {
            node_ids.set(slot as u64, node);
            radix.register(eids.get(node));
        }

        let mut tracker = Tracker::for_length(5, DEFAULT_CHUNK_SIZE);
        let comparator = ByEidThenId { eids: &eids };
        ParallelSorter::new(
            &node_ids,
            5,
            &radix,
            &mut tracker,
            1,
            &NoProgress,
            &comparator,
        )
        .run()
        .unwrap();

        let order: Vec<u64> = (0..5).map(|i| node_ids.get(tracker.get(i) as u64)).collect();
        assert_eq!(order, vec![2, 4, 0, 1, 3]);
    }
}
