//! Progress reporting for the prepare stages.
//!
//! Implementations must tolerate concurrent `add` calls: detect workers
//! report from several threads at once.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

pub trait Progress: Sync {
    fn started(&self, _stage: &str) {}
    fn add(&self, n: u64);
    fn done(&self) {}
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn add(&self, _n: u64) {}
}

/// Emits one `tracing` event per stage transition with the item count seen
/// in between.
#[derive(Debug, Default)]
pub struct LogProgress {
    stage: Mutex<String>,
    count: AtomicU64,
}

impl Progress for LogProgress {
    fn started(&self, stage: &str) {
        self.count.store(0, Ordering::Relaxed);
        if let Ok(mut current) = self.stage.lock() {
            *current = stage.to_string();
        }
        tracing::debug!(stage, "stage started");
    }

    fn add(&self, n: u64) {
        self.count.fetch_add(n, Ordering::Relaxed);
    }

    fn done(&self) {
        let stage = self.stage.lock().map(|s| s.clone()).unwrap_or_default();
        let items = self.count.load(Ordering::Relaxed);
        tracing::debug!(stage = %stage, items, "stage done");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_progress_accumulates() {
        let progress = LogProgress::default();
        progress.started("SORT");
        progress.add(10);
        progress.add(5);
        assert_eq!(progress.count.load(Ordering::Relaxed), 15);
        progress.done();
        progress.started("DETECT");
        assert_eq!(progress.count.load(Ordering::Relaxed), 0);
    }
}
