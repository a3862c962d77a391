use std::sync::Arc;
use std::time::{Duration, Instant};

use attr_scan_core::partitioning::plan_fingerprint;
use attr_scan_core::{
    compute_partition_plan, Aggregator, ErrorCollector, FailureCause, PartitionDescriptor,
    PartitionFailure, PartitionOutcome, PartitionReport, Record, ScanRequest, ScanSummary,
};
use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::partition::PartitionScanner;
use crate::adapters::page_source::PageSource;
use crate::config::ScanConfig;
use crate::error::ScanError;
use crate::progress::ScanProgress;

/// Merged result of one scan run.
#[derive(Debug, Clone)]
pub struct ScanReport {
    /// Matched records ordered by (partition index, arrival order).
    pub records: Vec<Record>,
    pub summary: ScanSummary,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
}

/// Runs every scheduled partition concurrently, at most
/// [`ScanConfig::worker_limit`] at a time, and merges their results.
///
/// A failed partition never stops its siblings. Cancelling `cancel` stops
/// new pages from being requested; the records gathered so far are still
/// returned. An authentication rejection cancels the remaining partitions
/// and is returned as an error once every task has settled.
pub async fn run_scan<S>(
    request: &ScanRequest,
    config: &ScanConfig,
    source: Arc<S>,
    cancel: CancellationToken,
    progress: ScanProgress,
) -> Result<ScanReport, ScanError>
where
    S: PageSource + 'static,
{
    let started_at = Utc::now();
    let clock = Instant::now();

    let plan = compute_partition_plan(&config.key_domain, request.partition_count())?;
    let fingerprint = plan_fingerprint(&config.key_domain, &plan);
    let scheduled: Vec<PartitionDescriptor> = plan
        .into_iter()
        .filter(|descriptor| request.selects(descriptor.index))
        .collect();
    let workers = config.worker_limit(scheduled.len());
    info!(
        partitions = request.partition_count(),
        scheduled = scheduled.len(),
        workers,
        page_size = request.page_size(),
        max_attempts = config.backoff.max_attempts,
        retry_delays_ms = ?config
            .backoff
            .schedule()
            .iter()
            .map(|delay| delay.as_millis() as u64)
            .collect::<Vec<_>>(),
        plan_fingerprint = %fingerprint,
        "scan_started"
    );

    // Child token so an authentication abort does not cancel the caller's token.
    let scan_token = cancel.child_token();
    let scanner = PartitionScanner {
        source,
        criteria: Arc::new(request.criteria().clone()),
        page_size: request.page_size(),
        backoff: config.backoff,
        request_timeout: config.request_timeout,
        aggregator: Arc::new(Aggregator::new()),
        errors: Arc::new(ErrorCollector::new()),
        cancel: scan_token.clone(),
        progress,
    };
    let slots = Arc::new(Semaphore::new(workers));

    let mut handles = Vec::with_capacity(scheduled.len());
    for descriptor in scheduled {
        let scanner = scanner.clone();
        let slots = Arc::clone(&slots);
        let handle = tokio::spawn(async move {
            let _permit = tokio::select! {
                biased;
                _ = scanner.cancel.cancelled() => {
                    return Ok(PartitionOutcome::Cancelled { pages_completed: 0, matched: 0 });
                }
                permit = slots.acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => {
                        return Ok(PartitionOutcome::Cancelled { pages_completed: 0, matched: 0 });
                    }
                },
            };
            let result = scanner.scan(&descriptor).await;
            if result.is_err() {
                scanner.cancel.cancel();
            }
            result
        });
        handles.push((descriptor, handle));
    }

    let mut reports = Vec::with_capacity(handles.len());
    let mut auth_error: Option<ScanError> = None;
    for (descriptor, handle) in handles {
        let outcome = match handle.await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(scan_error)) => {
                error!(partition = descriptor.index, error = %scan_error, "scan_aborted");
                if auth_error.is_none() {
                    auth_error = Some(scan_error);
                }
                PartitionOutcome::Cancelled {
                    pages_completed: 0,
                    matched: 0,
                }
            }
            Err(join_error) => {
                // Pages merged before the task died stay in the aggregator.
                let matched = scanner.aggregator.partition_len(descriptor.index);
                let cause = FailureCause::TaskAborted {
                    message: format!(
                        "{join_error} ({matched} matches merged before the abort are kept)"
                    ),
                };
                error!(partition = descriptor.index, error = %cause, "partition_failed");
                scanner.errors.record(
                    descriptor.index,
                    PartitionFailure {
                        cause: cause.clone(),
                        pages_completed: 0,
                    },
                );
                PartitionOutcome::Failed {
                    cause,
                    pages_completed: 0,
                    matched,
                }
            }
        };
        reports.push(PartitionReport {
            index: descriptor.index,
            range: descriptor.range,
            outcome,
        });
    }
    scanner.progress.finish();

    if let Some(scan_error) = auth_error {
        return Err(scan_error);
    }

    let aggregated = scanner.aggregator.flush();
    let summary = ScanSummary::new(
        reports,
        scanner.errors.snapshot(),
        aggregated.records.len(),
        aggregated.duplicates_dropped,
        fingerprint,
    );
    let elapsed = clock.elapsed();
    info!(
        status = ?summary.status,
        matched = summary.total_matched,
        succeeded = summary.succeeded(),
        failed = summary.failed(),
        cancelled = summary.cancelled(),
        duration_ms = elapsed.as_millis() as u64,
        "scan_finished"
    );

    Ok(ScanReport {
        records: aggregated.records,
        summary,
        started_at,
        elapsed,
    })
}
