use std::path::PathBuf;
use std::time::Duration;

use attr_scan_core::{BackoffPolicy, KeyDomain};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/account/v2";
pub const DEFAULT_CLIENT_NAME: &str = "test_provisioner";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Which backend collection a scan enumerates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Accounts,
    Licenses,
}

impl ResourceKind {
    pub fn path(self) -> &'static str {
        match self {
            Self::Accounts => "/accounts",
            Self::Licenses => "/licenses",
        }
    }

    pub fn noun(self) -> &'static str {
        match self {
            Self::Accounts => "accounts",
            Self::Licenses => "licenses",
        }
    }
}

/// Client identity sent with every request. Acquired by the caller; the
/// scanner only attaches it.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    pub client_name: String,
    pub client_secret: Option<String>,
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_name", &self.client_name)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

impl Default for ClientCredentials {
    fn default() -> Self {
        Self {
            client_name: DEFAULT_CLIENT_NAME.to_string(),
            client_secret: None,
        }
    }
}

/// Everything a scan needs besides the request itself. Built once and
/// passed to every component.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanConfig {
    pub base_url: String,
    pub resource: ResourceKind,
    pub credentials: ClientCredentials,
    pub request_timeout: Duration,
    pub backoff: BackoffPolicy,
    /// Concurrent partition tasks; `None` runs one task per partition.
    pub workers: Option<usize>,
    pub key_domain: KeyDomain,
    /// Where the JSON run summary goes, if anywhere.
    pub summary_path: Option<PathBuf>,
}

impl ScanConfig {
    pub fn new(base_url: impl Into<String>, resource: ResourceKind) -> Self {
        Self {
            base_url: base_url.into(),
            resource,
            credentials: ClientCredentials::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            backoff: BackoffPolicy::default(),
            workers: None,
            key_domain: KeyDomain::default(),
            summary_path: None,
        }
    }

    /// Effective worker limit for `partitions` scheduled partitions.
    pub fn worker_limit(&self, partitions: usize) -> usize {
        let ceiling = partitions.max(1);
        self.workers.unwrap_or(ceiling).clamp(1, ceiling)
    }
}
