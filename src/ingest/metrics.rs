use chrono::Utc;
use serde::Serialize;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

/// Counters for the ingestion path
#[derive(Clone, Default)]
pub struct IngestMetrics {
    /// Readings whose three writes all committed
    readings_written: Arc<AtomicU64>,

    /// Readings with at least one failed write
    readings_failed: Arc<AtomicU64>,

    /// Readings rejected by validation
    readings_rejected: Arc<AtomicU64>,

    /// Individual failed store writes
    write_failures: Arc<AtomicU64>,

    snapshot_updates: Arc<AtomicU64>,
    snapshot_failures: Arc<AtomicU64>,

    /// Epoch ms of the last completed ingestion call, 0 if none
    last_ingest_ms: Arc<AtomicI64>,
}

impl IngestMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_written(&self, count: u64) {
        self.readings_written.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_failed(&self, count: u64) {
        self.readings_failed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.readings_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_snapshot_update(&self) {
        self.snapshot_updates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_snapshot_failure(&self) {
        self.snapshot_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn touch(&self) {
        self.last_ingest_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> IngestMetricsSnapshot {
        let last = self.last_ingest_ms.load(Ordering::Relaxed);
        IngestMetricsSnapshot {
            readings_written: self.readings_written.load(Ordering::Relaxed),
            readings_failed: self.readings_failed.load(Ordering::Relaxed),
            readings_rejected: self.readings_rejected.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            snapshot_updates: self.snapshot_updates.load(Ordering::Relaxed),
            snapshot_failures: self.snapshot_failures.load(Ordering::Relaxed),
            last_ingest_ms: (last > 0).then_some(last),
        }
    }
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestMetricsSnapshot {
    pub readings_written: u64,
    pub readings_failed: u64,
    pub readings_rejected: u64,
    pub write_failures: u64,
    pub snapshot_updates: u64,
    pub snapshot_failures: u64,
    pub last_ingest_ms: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_counters_start_at_zero() {
        let snapshot = IngestMetrics::new().snapshot();
        assert_eq!(snapshot.readings_written, 0);
        assert_eq!(snapshot.write_failures, 0);
        assert_eq!(snapshot.last_ingest_ms, None);
    }

    #[test]
    fn test_recording() {
        let metrics = IngestMetrics::new();
        metrics.record_written(3);
        metrics.record_failed(1);
        metrics.record_rejected();
        metrics.record_write_failure();
        metrics.record_write_failure();
        metrics.record_snapshot_update();
        metrics.touch();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.readings_written, 3);
        assert_eq!(snapshot.readings_failed, 1);
        assert_eq!(snapshot.readings_rejected, 1);
        assert_eq!(snapshot.write_failures, 2);
        assert_eq!(snapshot.snapshot_updates, 1);
        assert_eq!(snapshot.snapshot_failures, 0);
        assert!(snapshot.last_ingest_ms.is_some());
    }

    #[test]
    fn test_clones_share_counters() {
        let metrics = IngestMetrics::new();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let m = metrics.clone();
                thread::spawn(move || m.record_written(1))
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(metrics.snapshot().readings_written, 8);
    }
}
