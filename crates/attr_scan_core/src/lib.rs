//! Shared partitioned-scan domain primitives.
//!
//! This crate owns the deterministic parts of an attribute scan: request
//! validation, key-space partitioning, attribute matching, retry policy,
//! per-partition outcomes and result aggregation/export. It intentionally
//! excludes HTTP and async runtime concerns, which live in
//! `attr_scan_runtime`.

pub mod aggregate;
pub mod backoff;
pub mod contract;
pub mod export;
pub mod matching;
pub mod outcome;
pub mod partitioning;
pub mod record;

pub use aggregate::{AggregatedRecords, Aggregator};
pub use backoff::BackoffPolicy;
pub use contract::{normalize_request, ConfigurationError, ScanRequest, ScanRequestInput};
pub use export::{ExportError, OutputFormat, OutputTarget};
pub use matching::{json_deep_eq, matches, MatchCriteria};
pub use outcome::{
    ErrorCollector, FailureCause, PartitionFailure, PartitionOutcome, PartitionReport,
    ScanStatus, ScanSummary,
};
pub use partitioning::{compute_partition_plan, KeyDomain, KeyRange, PartitionDescriptor};
pub use record::Record;
