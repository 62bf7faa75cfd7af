//! Scan sources shared by the worker threads.

use crate::models::Scan;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{
    AtomicU64,
    Ordering,
};

/// Hands out scans to concurrent workers.
///
/// `next_scan` returning `None` does not necessarily mean the source is
/// exhausted for good: scans may still arrive, which `has_next` reports.
pub trait ScanSource: Send + Sync {
    fn has_next(&self) -> bool;
    fn next_scan(&self) -> Option<Scan>;
    fn count_read(&self) -> u64;
    /// Total number of scans, 0 when unknown.
    fn total_count(&self) -> u64;
}

/// In-memory FIFO source. Scans can be pushed while a search runs.
#[derive(Debug, Default)]
pub struct QueueScanSource {
    queue: Mutex<VecDeque<Scan>>,
    read: AtomicU64,
    total: AtomicU64,
}

impl QueueScanSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, scan: Scan) {
        self.queue.lock().push_back(scan);
    }

    pub fn extend(&self, scans: impl IntoIterator<Item = Scan>) {
        self.queue.lock().extend(scans);
    }

    pub fn set_total(&self, total: u64) {
        self.total.store(total, Ordering::Relaxed);
    }

    pub fn remaining(&self) -> usize {
        self.queue.lock().len()
    }
}

impl From<Vec<Scan>> for QueueScanSource {
    /// A source whose total is the number of scans given.
    fn from(scans: Vec<Scan>) -> Self {
        let total = scans.len() as u64;
        Self {
            queue: Mutex::new(scans.into()),
            read: AtomicU64::new(0),
            total: AtomicU64::new(total),
        }
    }
}

impl ScanSource for QueueScanSource {
    fn has_next(&self) -> bool {
        !self.queue.lock().is_empty()
    }

    fn next_scan(&self) -> Option<Scan> {
        let scan = self.queue.lock().pop_front();
        if scan.is_some() {
            self.read.fetch_add(1, Ordering::Relaxed);
        }
        scan
    }

    fn count_read(&self) -> u64 {
        self.read.load(Ordering::Relaxed)
    }

    fn total_count(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Peak;

    fn scan(n: u32) -> Scan {
        Scan::new("run", n, 1000.0, 2, vec![Peak { mz: 100.0, intensity: 1.0 }])
    }

    #[test]
    fn test_fifo_and_counters() {
        let source = QueueScanSource::from(vec![scan(1), scan(2)]);
        assert_eq!(source.total_count(), 2);
        assert!(source.has_next());
        assert_eq!(source.next_scan().map(|s| s.scan_number), Some(1));
        assert_eq!(source.next_scan().map(|s| s.scan_number), Some(2));
        assert!(source.next_scan().is_none());
        assert!(!source.has_next());
        assert_eq!(source.count_read(), 2);

        source.push(scan(3));
        assert!(source.has_next());
        assert_eq!(source.remaining(), 1);
    }
}
