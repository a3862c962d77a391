use std::collections::BTreeMap;

use attr_scan_core::{normalize_request, BackoffPolicy, KeyDomain, Record, ScanRequest, ScanRequestInput};
use attr_scan_runtime::config::{ResourceKind, ScanConfig, DEFAULT_BASE_URL};
use serde_json::Value;

/// Builds a record from a JSON object literal.
pub fn record(key: u64, attributes: Value) -> Record {
    let Value::Object(map) = attributes else {
        panic!("fixture attributes must be a JSON object");
    };
    Record::new(key, map.into_iter().collect::<BTreeMap<_, _>>())
}

pub fn country_request(partitions: i64, count: i64) -> ScanRequest {
    normalize_request(ScanRequestInput {
        name: "country".to_string(),
        value: "\"US\"".to_string(),
        partitions,
        count,
        ..ScanRequestInput::default()
    })
    .expect("fixture request should be valid")
}

/// Config over keys `[0, max_key]` with instant retries.
pub fn small_domain_config(max_key: u64, max_attempts: u32) -> ScanConfig {
    let mut config = ScanConfig::new(DEFAULT_BASE_URL, ResourceKind::Accounts);
    config.key_domain = KeyDomain::new(0, max_key).expect("fixture domain should be valid");
    config.backoff = BackoffPolicy::immediate(max_attempts);
    config
}
