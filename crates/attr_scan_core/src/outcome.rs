use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use serde::Serialize;

use crate::partitioning::KeyRange;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureCause {
    RetriesExhausted { attempts: u32, last_error: String },
    MalformedResponse { message: String },
    Rejected { status: u16, message: String },
    TaskAborted { message: String },
}

impl std::fmt::Display for FailureCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RetriesExhausted {
                attempts,
                last_error,
            } => write!(f, "gave up after {attempts} attempts: {last_error}"),
            Self::MalformedResponse { message } => write!(f, "malformed response: {message}"),
            Self::Rejected { status, message } => {
                write!(f, "request rejected with status {status}: {message}")
            }
            Self::TaskAborted { message } => write!(f, "scan task aborted: {message}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionFailure {
    pub cause: FailureCause,
    pub pages_completed: usize,
}

/// Terminal state of one partition. Matched records themselves are held by
/// the aggregator; outcomes only carry counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PartitionOutcome {
    Completed {
        pages: usize,
        matched: usize,
    },
    Failed {
        cause: FailureCause,
        pages_completed: usize,
        matched: usize,
    },
    Cancelled {
        pages_completed: usize,
        matched: usize,
    },
}

impl PartitionOutcome {
    pub fn matched(&self) -> usize {
        match self {
            Self::Completed { matched, .. }
            | Self::Failed { matched, .. }
            | Self::Cancelled { matched, .. } => *matched,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionReport {
    pub index: usize,
    pub range: Option<KeyRange>,
    pub outcome: PartitionOutcome,
}

/// Per-partition failure ledger shared by all scan tasks.
#[derive(Debug, Default)]
pub struct ErrorCollector {
    failures: Mutex<BTreeMap<usize, PartitionFailure>>,
}

impl ErrorCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, partition: usize, failure: PartitionFailure) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(partition, failure);
    }

    pub fn len(&self) -> usize {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Failures ordered by partition index.
    pub fn snapshot(&self) -> BTreeMap<usize, PartitionFailure> {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Success,
    Partial,
    Failed,
    Cancelled,
}

impl ScanStatus {
    fn headline(self) -> &'static str {
        match self {
            Self::Success => "scan completed",
            Self::Partial => "scan completed with partition errors",
            Self::Failed => "scan completed with partition errors (no partition succeeded)",
            Self::Cancelled => "scan cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub total_matched: usize,
    pub duplicates_dropped: usize,
    pub plan_fingerprint: String,
    pub partitions: Vec<PartitionReport>,
    pub failures: BTreeMap<usize, PartitionFailure>,
    pub status: ScanStatus,
}

impl ScanSummary {
    pub fn new(
        mut partitions: Vec<PartitionReport>,
        failures: BTreeMap<usize, PartitionFailure>,
        total_matched: usize,
        duplicates_dropped: usize,
        plan_fingerprint: String,
    ) -> Self {
        partitions.sort_by_key(|report| report.index);
        let status = classify(&partitions);
        Self {
            total_matched,
            duplicates_dropped,
            plan_fingerprint,
            partitions,
            failures,
            status,
        }
    }

    pub fn succeeded(&self) -> usize {
        self.count(|outcome| matches!(outcome, PartitionOutcome::Completed { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|outcome| matches!(outcome, PartitionOutcome::Failed { .. }))
    }

    pub fn cancelled(&self) -> usize {
        self.count(|outcome| matches!(outcome, PartitionOutcome::Cancelled { .. }))
    }

    pub fn failed_indices(&self) -> Vec<usize> {
        self.failures.keys().copied().collect()
    }

    fn count(&self, predicate: impl Fn(&PartitionOutcome) -> bool) -> usize {
        self.partitions
            .iter()
            .filter(|report| predicate(&report.outcome))
            .count()
    }

    /// One-line operator summary, always emitted regardless of output.
    pub fn summary_line(&self) -> String {
        let mut line = format!(
            "{}: {} matches, partitions succeeded={} failed={} cancelled={}",
            self.status.headline(),
            self.total_matched,
            self.succeeded(),
            self.failed(),
            self.cancelled(),
        );
        if self.duplicates_dropped > 0 {
            line.push_str(&format!(", duplicate keys dropped={}", self.duplicates_dropped));
        }
        line
    }
}

fn classify(partitions: &[PartitionReport]) -> ScanStatus {
    let any = |predicate: fn(&PartitionOutcome) -> bool| {
        partitions.iter().any(|report| predicate(&report.outcome))
    };

    if any(|outcome| matches!(outcome, PartitionOutcome::Cancelled { .. })) {
        ScanStatus::Cancelled
    } else if !any(|outcome| matches!(outcome, PartitionOutcome::Failed { .. })) {
        ScanStatus::Success
    } else if any(PartitionOutcome::is_completed) {
        ScanStatus::Partial
    } else {
        ScanStatus::Failed
    }
}
