mod support;

use std::sync::Arc;

use attr_scan_core::export::{export_to_path, write_records};
use attr_scan_core::{
    compute_partition_plan, normalize_request, FailureCause, OutputFormat, PartitionOutcome,
    ScanRequestInput, ScanStatus,
};
use attr_scan_runtime::adapters::page_source::{Cursor, PageError};
use attr_scan_runtime::handlers::coordinator::run_scan;
use attr_scan_runtime::progress::ScanProgress;
use serde_json::json;
use support::backend::FakeBackend;
use support::fixtures::{country_request, record, small_domain_config};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn mixed_country_backend() -> FakeBackend {
    FakeBackend::new([
        record(3, json!({"country": "US", "seats": 5})),
        record(17, json!({"country": "DE", "seats": 2})),
        record(42, json!({"country": "US", "seats": 1})),
        record(55, json!({"country": "us"})),
        record(61, json!({"region": "US"})),
        record(77, json!({"country": "US", "seats": 9})),
        record(90, json!({"country": ["US"]})),
    ])
}

#[tokio::test]
async fn country_scan_writes_header_and_one_row_per_match() {
    let backend = Arc::new(mixed_country_backend());
    let request = country_request(2, 100);
    let config = small_domain_config(99, 3);

    let report = run_scan(
        &request,
        &config,
        Arc::clone(&backend),
        CancellationToken::new(),
        ScanProgress::hidden(),
    )
    .await
    .expect("scan should finish");

    assert_eq!(report.summary.status, ScanStatus::Success);
    assert_eq!(report.summary.total_matched, 3);

    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("nested").join("accounts.csv");
    export_to_path(&report.records, OutputFormat::Csv, None, &path).expect("export");

    let text = std::fs::read_to_string(&path).expect("read output");
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0], "key,country,seats");
    assert_eq!(&lines[1..], &["3,US,5", "42,US,1", "77,US,9"]);
}

#[tokio::test]
async fn repeated_scans_produce_identical_csv() {
    let backend = Arc::new(mixed_country_backend());
    let request = country_request(2, 2);
    let config = small_domain_config(99, 3);

    let mut outputs = Vec::new();
    for _ in 0..2 {
        let report = run_scan(
            &request,
            &config,
            Arc::clone(&backend),
            CancellationToken::new(),
            ScanProgress::hidden(),
        )
        .await
        .expect("scan should finish");
        let mut buffer = Vec::new();
        write_records(&report.records, OutputFormat::Csv, None, &mut buffer).expect("write");
        outputs.push(buffer);
    }

    assert!(!outputs[0].is_empty());
    assert_eq!(outputs[0], outputs[1]);
}

#[tokio::test]
async fn failing_partition_keeps_sibling_matches_and_reports_progress() {
    let records = (0..400u64).step_by(25).map(|key| record(key, json!({"country": "US"})));
    let backend = Arc::new(FakeBackend::new(records).fail_after_pages(2, 1));
    let request = country_request(4, 2);
    let config = small_domain_config(399, 3);

    let report = run_scan(
        &request,
        &config,
        Arc::clone(&backend),
        CancellationToken::new(),
        ScanProgress::hidden(),
    )
    .await
    .expect("scan should finish");

    assert_eq!(report.summary.status, ScanStatus::Partial);
    assert_eq!(report.summary.failed_indices(), vec![2]);
    let failure = &report.summary.failures[&2];
    assert_eq!(failure.pages_completed, 1);
    assert!(matches!(
        failure.cause,
        FailureCause::RetriesExhausted { attempts: 3, .. }
    ));

    // Partition 2 covers [200, 299]; only its first page of two records landed.
    let keys: Vec<u64> = report.records.iter().map(|record| record.key).collect();
    let expected: Vec<u64> = (0..400u64)
        .step_by(25)
        .filter(|key| !(250..300).contains(key))
        .collect();
    assert_eq!(keys, expected);
    assert_eq!(backend.requests_for(2).len(), 1 + 3);
}

#[tokio::test]
async fn partition_with_k_pages_issues_k_plus_one_requests() {
    let records = (0..10u64).map(|key| record(key, json!({"country": "DE"})));
    let backend = Arc::new(FakeBackend::new(records));
    let request = country_request(1, 5);
    let config = small_domain_config(99, 3);

    let report = run_scan(
        &request,
        &config,
        Arc::clone(&backend),
        CancellationToken::new(),
        ScanProgress::hidden(),
    )
    .await
    .expect("scan should finish");

    let requests = backend.requests_for(0);
    assert_eq!(requests.len(), 3);
    let cursors: Vec<Option<Cursor>> = requests.into_iter().map(|request| request.cursor).collect();
    assert_eq!(
        cursors,
        vec![None, Some(Cursor::new("4")), Some(Cursor::new("9"))]
    );
    assert_eq!(
        report.summary.partitions[0].outcome,
        PartitionOutcome::Completed {
            pages: 3,
            matched: 0
        }
    );
}

#[tokio::test]
async fn transient_errors_are_retried_without_losing_records() {
    let records = (0..6u64).map(|key| record(key, json!({"country": "US"})));
    let backend = Arc::new(FakeBackend::new(records).script_errors(
        0,
        vec![
            PageError::Transient("connection reset".to_string()),
            PageError::Transient("status 502: bad gateway".to_string()),
        ],
    ));
    let request = country_request(1, 4);
    let config = small_domain_config(9, 3);

    let report = run_scan(
        &request,
        &config,
        Arc::clone(&backend),
        CancellationToken::new(),
        ScanProgress::hidden(),
    )
    .await
    .expect("scan should finish");

    assert_eq!(report.summary.status, ScanStatus::Success);
    assert_eq!(report.records.len(), 6);
    assert_eq!(backend.requests().len(), 2 + 3);
}

#[tokio::test]
async fn rejected_request_fails_only_that_partition() {
    let records = (0..20u64).map(|key| record(key, json!({"country": "US"})));
    let backend = Arc::new(FakeBackend::new(records).script_errors(
        0,
        vec![PageError::Rejected {
            status: 400,
            message: "unknown attribute".to_string(),
        }],
    ));
    let request = country_request(2, 100);
    let config = small_domain_config(19, 5);

    let report = run_scan(
        &request,
        &config,
        Arc::clone(&backend),
        CancellationToken::new(),
        ScanProgress::hidden(),
    )
    .await
    .expect("scan should finish");

    assert_eq!(report.summary.status, ScanStatus::Partial);
    assert_eq!(backend.requests_for(0).len(), 1);
    assert_eq!(report.records.len(), 10);
    assert!(report.records.iter().all(|record| record.key >= 10));
}

#[tokio::test]
async fn more_partitions_than_keys_leaves_trailing_partitions_idle() {
    let backend = Arc::new(FakeBackend::new([
        record(0, json!({"country": "US"})),
        record(2, json!({"country": "US"})),
    ]));
    let request = country_request(5, 100);
    let config = small_domain_config(2, 3);

    let report = run_scan(
        &request,
        &config,
        Arc::clone(&backend),
        CancellationToken::new(),
        ScanProgress::hidden(),
    )
    .await
    .expect("scan should finish");

    let plan = compute_partition_plan(&config.key_domain, 5).expect("plan");
    assert!(plan[3].range.is_none() && plan[4].range.is_none());
    assert_eq!(report.summary.succeeded(), 5);
    assert!(backend.requests_for(3).is_empty());
    assert!(backend.requests_for(4).is_empty());
    assert_eq!(report.records.len(), 2);
}

#[tokio::test]
async fn product_scope_filters_records_client_side() {
    let backend = Arc::new(FakeBackend::new([
        record(1, json!({"country": "US", "product": "g2m"})),
        record(2, json!({"country": "US", "product": "g2w"})),
        record(3, json!({"country": "US", "product": ["g2w", "g2m"]})),
        record(4, json!({"country": "US"})),
    ]));
    let request = normalize_request(ScanRequestInput {
        name: "country".to_string(),
        value: "\"US\"".to_string(),
        product: Some("g2m".to_string()),
        partitions: 2,
        ..ScanRequestInput::default()
    })
    .expect("request");
    let config = small_domain_config(9, 3);

    let report = run_scan(
        &request,
        &config,
        backend,
        CancellationToken::new(),
        ScanProgress::hidden(),
    )
    .await
    .expect("scan should finish");

    let keys: Vec<u64> = report.records.iter().map(|record| record.key).collect();
    assert_eq!(keys, vec![1, 3, 4]);
}
