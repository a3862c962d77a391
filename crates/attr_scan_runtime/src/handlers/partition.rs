use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use attr_scan_core::matching::filter_page;
use attr_scan_core::{
    Aggregator, BackoffPolicy, ErrorCollector, FailureCause, MatchCriteria, PartitionDescriptor,
    PartitionFailure, PartitionOutcome,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::adapters::page_source::{Cursor, Page, PageError, PageRequest, PageSource};
use crate::error::ScanError;
use crate::progress::ScanProgress;

/// Drives cursor pagination over one partition range.
///
/// Everything a task mutates besides the aggregator and the error collector
/// (cursor, retry counter, issued cursors) is local to [`PartitionScanner::scan`].
pub struct PartitionScanner<S> {
    pub source: Arc<S>,
    pub criteria: Arc<MatchCriteria>,
    pub page_size: usize,
    pub backoff: BackoffPolicy,
    pub request_timeout: Duration,
    pub aggregator: Arc<Aggregator>,
    pub errors: Arc<ErrorCollector>,
    pub cancel: CancellationToken,
    pub progress: ScanProgress,
}

impl<S> Clone for PartitionScanner<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            criteria: Arc::clone(&self.criteria),
            page_size: self.page_size,
            backoff: self.backoff,
            request_timeout: self.request_timeout,
            aggregator: Arc::clone(&self.aggregator),
            errors: Arc::clone(&self.errors),
            cancel: self.cancel.clone(),
            progress: self.progress.clone(),
        }
    }
}

enum FetchResult {
    Page(Page),
    Failed(FailureCause),
    Cancelled,
    Unauthorized(u16),
}

impl<S: PageSource> PartitionScanner<S> {
    /// Scans one partition to a terminal outcome. Only an authentication
    /// rejection is returned as an error; every other failure is recorded
    /// in the error collector and reported as [`PartitionOutcome::Failed`].
    pub async fn scan(&self, descriptor: &PartitionDescriptor) -> Result<PartitionOutcome, ScanError> {
        let partition = descriptor.index;
        let Some(range) = descriptor.range else {
            debug!(partition, "partition_empty");
            return Ok(PartitionOutcome::Completed {
                pages: 0,
                matched: 0,
            });
        };

        let started_at = Instant::now();
        info!(partition, start = range.start, end = range.end, "partition_started");

        let mut cursor: Option<Cursor> = None;
        let mut issued: HashSet<Cursor> = HashSet::new();
        let mut pages = 0usize;
        let mut matched = 0usize;

        loop {
            if self.cancel.is_cancelled() {
                info!(partition, pages, matched, "partition_cancelled");
                return Ok(PartitionOutcome::Cancelled {
                    pages_completed: pages,
                    matched,
                });
            }

            if let Some(current) = &cursor {
                issued.insert(current.clone());
            }
            let request = PageRequest {
                partition,
                range,
                cursor: cursor.clone(),
                page_size: self.page_size,
            };

            let page = match self.fetch_with_retry(request).await {
                FetchResult::Page(page) => page,
                FetchResult::Cancelled => {
                    info!(partition, pages, matched, "partition_cancelled");
                    return Ok(PartitionOutcome::Cancelled {
                        pages_completed: pages,
                        matched,
                    });
                }
                FetchResult::Unauthorized(status) => {
                    return Err(ScanError::Authentication { status, partition });
                }
                FetchResult::Failed(cause) => return Ok(self.fail(partition, cause, pages, matched)),
            };

            pages += 1;
            let hits = filter_page(page.records, &self.criteria);
            matched += hits.len();
            self.progress.record_page(hits.len());
            self.aggregator.append(partition, hits);

            match page.next {
                None => {
                    info!(
                        partition,
                        pages,
                        matched,
                        duration_ms = started_at.elapsed().as_millis() as u64,
                        "partition_completed"
                    );
                    return Ok(PartitionOutcome::Completed { pages, matched });
                }
                Some(next) if issued.contains(&next) => {
                    let cause = FailureCause::MalformedResponse {
                        message: format!("backend returned already consumed cursor '{next}'"),
                    };
                    return Ok(self.fail(partition, cause, pages, matched));
                }
                Some(next) => cursor = Some(next),
            }
        }
    }

    fn fail(
        &self,
        partition: usize,
        cause: FailureCause,
        pages_completed: usize,
        matched: usize,
    ) -> PartitionOutcome {
        warn!(partition, pages_completed, error = %cause, "partition_failed");
        self.errors.record(
            partition,
            PartitionFailure {
                cause: cause.clone(),
                pages_completed,
            },
        );
        PartitionOutcome::Failed {
            cause,
            pages_completed,
            matched,
        }
    }

    async fn fetch_with_retry(&self, request: PageRequest) -> FetchResult {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return FetchResult::Cancelled,
                result = tokio::time::timeout(
                    self.request_timeout,
                    self.source.fetch_page(request.clone()),
                ) => result.unwrap_or_else(|_| {
                    Err(PageError::Transient(format!(
                        "page request timed out after {}ms",
                        self.request_timeout.as_millis()
                    )))
                }),
            };

            let message = match result {
                Ok(page) => return FetchResult::Page(page),
                Err(PageError::Unauthorized { status }) => return FetchResult::Unauthorized(status),
                Err(PageError::Malformed(message)) => {
                    return FetchResult::Failed(FailureCause::MalformedResponse { message })
                }
                Err(PageError::Rejected { status, message }) => {
                    return FetchResult::Failed(FailureCause::Rejected { status, message })
                }
                Err(PageError::Transient(message)) => message,
            };

            let Some(delay) = self.backoff.delay_after(attempt) else {
                return FetchResult::Failed(FailureCause::RetriesExhausted {
                    attempts: attempt,
                    last_error: message,
                });
            };

            warn!(
                partition = request.partition,
                attempt,
                delay_ms = delay.as_millis() as u64,
                cursor = request.cursor.as_ref().map(Cursor::as_str).unwrap_or("start"),
                error = %message,
                "page_retry"
            );
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return FetchResult::Cancelled,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
