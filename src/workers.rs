//! Fixed fan-out over disjoint index ranges.
//!
//! The pool runs one OS thread per range, joins them all, hands back the
//! per-worker partial results in range order and surfaces the first failure.
//! Workloads too small to amortize a thread collapse to a single range.

use std::thread;

/// Below this many entries per worker, fanning out is pure overhead.
const MIN_STRIDE: u64 = 10;

/// Worker count the mapper uses unless configured otherwise.
pub fn default_processors() -> usize {
    thread::available_parallelism()
        .map(|cores| cores.get().saturating_sub(1))
        .unwrap_or(1)
        .max(1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerRange {
    pub from: u64,
    pub to: u64,
    /// The last range has no seam to a successor.
    pub last: bool,
}

#[derive(Debug)]
pub enum WorkerFailure<E> {
    /// A worker returned an error; the first one in range order wins.
    Failed(E),
    /// A worker thread died before producing a result.
    Panicked,
}

/// Splits `[0, total)` into up to `processors` half-open ranges of equal
/// stride, the last one absorbing the remainder.
pub fn partition(total: u64, processors: usize) -> Vec<WorkerRange> {
    let mut count = processors.max(1) as u64;
    let mut stride = total / count;
    if stride < MIN_STRIDE {
        count = 1;
        stride = total;
    }
    let mut ranges = Vec::with_capacity(count as usize);
    let mut from = 0;
    for i in 0..count {
        let last = i == count - 1;
        let to = if last { total } else { from + stride };
        ranges.push(WorkerRange { from, to, last });
        from = to;
    }
    ranges
}

/// Runs `worker` once per range on its own thread and joins them all.
pub fn run_partitioned<T, E, F>(ranges: &[WorkerRange], worker: F) -> Result<Vec<T>, WorkerFailure<E>>
where
    T: Send,
    E: Send,
    F: Fn(&WorkerRange) -> Result<T, E> + Sync,
{
    if ranges.len() <= 1 {
        return match ranges.first() {
            Some(range) => match worker(range) {
                Ok(value) => Ok(vec![value]),
                Err(e) => Err(WorkerFailure::Failed(e)),
            },
            None => Ok(Vec::new()),
        };
    }

    let joined = thread::scope(|scope| {
        let worker = &worker;
        let handles: Vec<_> = ranges
            .iter()
            .map(|range| scope.spawn(move || worker(range)))
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join())
            .collect::<Vec<_>>()
    });

    let mut results = Vec::with_capacity(joined.len());
    for outcome in joined {
        match outcome {
            Err(_) => return Err(WorkerFailure::Panicked),
            Ok(Err(e)) => return Err(WorkerFailure::Failed(e)),
            Ok(Ok(value)) => results.push(value),
        }
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_covers_the_whole_range() {
        let ranges = partition(1000, 3);
        assert_eq!(ranges.len(), 3);
        assert_eq!(ranges[0].from, 0);
        for pair in ranges.windows(2) {
            assert_eq!(pair[0].to, pair[1].from);
        }
        assert_eq!(ranges.last().map(|r| r.to), Some(1000));
        assert!(ranges.last().map(|r| r.last) == Some(true));
        assert!(ranges[..2].iter().all(|r| !r.last));
    }

    #[test]
    fn tiny_workloads_collapse_to_one_range() {
        let ranges = partition(25, 4);
        assert_eq!(ranges.len(), 1);
        assert_eq!((ranges[0].from, ranges[0].to), (0, 25));
        assert_eq!(partition(0, 4).len(), 1);
    }

    #[test]
    fn partials_come_back_in_range_order() {
        let ranges = partition(4000, 4);
        let sums = run_partitioned::<u64, (), _>(&ranges, |r| Ok((r.from..r.to).sum())).unwrap();
        assert_eq!(sums.len(), 4);
        assert_eq!(sums.iter().sum::<u64>(), (0..4000).sum());
    }

    #[test]
    fn first_error_wins() {
        let ranges = partition(4000, 4);
        let result = run_partitioned::<(), u64, _>(&ranges, |r| Err(r.from));
        match result {
            Err(WorkerFailure::Failed(from)) => assert_eq!(from, 0),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn worker_panic_is_reported() {
        let ranges = partition(4000, 4);
        let result = run_partitioned::<(), (), _>(&ranges, |r| {
            if r.last {
                panic!("worker died");
            }
            Ok(())
        });
        assert!(matches!(result, Err(WorkerFailure::Panicked)));
    }
}
