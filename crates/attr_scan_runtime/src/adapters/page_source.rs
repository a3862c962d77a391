use async_trait::async_trait;
use attr_scan_core::{KeyRange, Record};

/// Opaque continuation token for one partition's page sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cursor(String);

impl Cursor {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub partition: usize,
    pub range: KeyRange,
    /// `None` requests the first page of the range.
    pub cursor: Option<Cursor>,
    pub page_size: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub records: Vec<Record>,
    /// `None` once the partition is exhausted.
    pub next: Option<Cursor>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PageError {
    /// Network failure, timeout or server-side error; worth retrying.
    #[error("transient page error: {0}")]
    Transient(String),
    #[error("malformed page response: {0}")]
    Malformed(String),
    #[error("page request rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("credentials rejected with status {status}")]
    Unauthorized { status: u16 },
}

/// One page of a partitioned range query against the backend.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, request: PageRequest) -> Result<Page, PageError>;
}
