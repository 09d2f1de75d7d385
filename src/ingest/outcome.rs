use crate::error::{RegistryError, StoreError, StoreOp, ValidationError};

/// Results of the three writes issued for one reading, in completion order
#[derive(Debug, Default)]
pub struct WriteOutcome {
    results: Vec<(StoreOp, Result<(), StoreError>)>,
}

impl WriteOutcome {
    pub(crate) fn record(&mut self, op: StoreOp, result: Result<(), StoreError>) {
        self.results.push((op, result));
    }

    /// All three writes completed and committed
    pub fn is_success(&self) -> bool {
        StoreOp::WRITES
            .iter()
            .all(|op| matches!(self.result(*op), Some(Ok(()))))
    }

    pub fn result(&self, op: StoreOp) -> Option<&Result<(), StoreError>> {
        self.results
            .iter()
            .find(|(recorded, _)| *recorded == op)
            .map(|(_, result)| result)
    }

    pub fn error(&self, op: StoreOp) -> Option<&StoreError> {
        self.result(op).and_then(|r| r.as_ref().err())
    }

    pub fn errors(&self) -> impl Iterator<Item = &StoreError> {
        self.results.iter().filter_map(|(_, r)| r.as_ref().err())
    }

    pub fn failed_ops(&self) -> Vec<StoreOp> {
        self.results
            .iter()
            .filter(|(_, r)| r.is_err())
            .map(|(op, _)| *op)
            .collect()
    }

    pub fn committed_ops(&self) -> Vec<StoreOp> {
        self.results
            .iter()
            .filter(|(_, r)| r.is_ok())
            .map(|(op, _)| *op)
            .collect()
    }

    /// Writes that never reported back (runtime shut down mid-flight)
    pub fn missing_ops(&self) -> Vec<StoreOp> {
        StoreOp::WRITES
            .iter()
            .copied()
            .filter(|op| self.result(*op).is_none())
            .collect()
    }

    pub fn completion_order(&self) -> Vec<StoreOp> {
        self.results.iter().map(|(op, _)| *op).collect()
    }
}

#[derive(Debug)]
pub enum ReadingStatus {
    /// Failed validation; nothing was written
    Rejected(ValidationError),
    Written(WriteOutcome),
}

/// Per-reading entry of a batch outcome
#[derive(Debug)]
pub struct ReadingOutcome {
    /// Position in the submitted batch
    pub index: usize,
    pub key: String,
    pub ts: i64,
    pub status: ReadingStatus,
}

impl ReadingOutcome {
    pub fn is_success(&self) -> bool {
        match &self.status {
            ReadingStatus::Rejected(_) => false,
            ReadingStatus::Written(writes) => writes.is_success(),
        }
    }

    pub fn writes(&self) -> Option<&WriteOutcome> {
        match &self.status {
            ReadingStatus::Written(writes) => Some(writes),
            ReadingStatus::Rejected(_) => None,
        }
    }

    pub fn rejection(&self) -> Option<&ValidationError> {
        match &self.status {
            ReadingStatus::Rejected(e) => Some(e),
            ReadingStatus::Written(_) => None,
        }
    }
}

/// What happened to the entity's sensor snapshot
#[derive(Debug)]
pub enum SnapshotStatus {
    /// No accepted readings, the previous snapshot was left alone
    Skipped,
    Saved { keys: usize },
    Failed(RegistryError),
}

impl SnapshotStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, SnapshotStatus::Failed(_))
    }
}

/// Aggregate result of a batch ingestion.
///
/// Partial success is a normal terminal state: writes that committed stay
/// committed even when siblings or the snapshot update failed.
#[derive(Debug)]
pub struct BatchOutcome {
    pub readings: Vec<ReadingOutcome>,
    pub snapshot: SnapshotStatus,
}

impl BatchOutcome {
    pub fn empty() -> Self {
        Self {
            readings: Vec::new(),
            snapshot: SnapshotStatus::Skipped,
        }
    }

    pub fn is_success(&self) -> bool {
        !self.snapshot.is_failure() && self.readings.iter().all(ReadingOutcome::is_success)
    }

    pub fn total(&self) -> usize {
        self.readings.len()
    }

    pub fn succeeded(&self) -> usize {
        self.readings.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.succeeded()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ReadingOutcome> {
        self.readings.iter().filter(|r| !r.is_success())
    }

    /// Every store error in the batch with the index of its reading
    pub fn store_errors(&self) -> impl Iterator<Item = (usize, &StoreError)> {
        self.readings.iter().flat_map(|r| {
            r.writes()
                .into_iter()
                .flat_map(|w| w.errors())
                .map(move |e| (r.index, e))
        })
    }

    pub fn reading(&self, index: usize) -> Option<&ReadingOutcome> {
        self.readings.get(index)
    }

    pub fn summary(&self) -> String {
        let snapshot = match &self.snapshot {
            SnapshotStatus::Skipped => "skipped".to_string(),
            SnapshotStatus::Saved { keys } => format!("saved {} keys", keys),
            SnapshotStatus::Failed(e) => format!("failed ({})", e),
        };
        format!(
            "{} of {} readings failed, snapshot {}",
            self.failed(),
            self.total(),
            snapshot
        )
    }
}
