use attr_scan_core::{ConfigurationError, ExportError};

pub const EXIT_OK: u8 = 0;
pub const EXIT_OUTPUT_WRITE: u8 = 1;
pub const EXIT_CONFIGURATION: u8 = 2;
pub const EXIT_AUTHENTICATION: u8 = 3;
pub const EXIT_CANCELLED: u8 = 130;

/// Errors that end a scan as a whole. Per-page and per-partition failures
/// never surface here; they become partition outcomes.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("authentication rejected by backend with status {status} (partition {partition})")]
    Authentication { status: u16, partition: usize },
    #[error("scan matched {matched} records but the output could not be written: {source}")]
    OutputWrite {
        matched: usize,
        #[source]
        source: ExportError,
    },
}

impl ScanError {
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Configuration(_) => EXIT_CONFIGURATION,
            Self::Authentication { .. } => EXIT_AUTHENTICATION,
            Self::OutputWrite { .. } => EXIT_OUTPUT_WRITE,
        }
    }
}
