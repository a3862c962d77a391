use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use attr_scan_core::export::{export_summary_to_path, export_to_path, write_records};
use attr_scan_core::{
    normalize_request, ConfigurationError, OutputFormat, OutputTarget, ScanRequest,
    ScanRequestInput, ScanStatus,
};
use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::adapters::http::HttpPageSource;
use crate::adapters::page_source::PageSource;
use crate::config::{ClientCredentials, ResourceKind, ScanConfig, DEFAULT_BASE_URL, DEFAULT_CLIENT_NAME};
use crate::error::{ScanError, EXIT_CANCELLED, EXIT_OK};
use crate::handlers::coordinator::{run_scan, ScanReport};
use crate::progress::ScanProgress;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    Csv,
    Json,
}

impl From<FormatArg> for OutputFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Csv => OutputFormat::Csv,
            FormatArg::Json => OutputFormat::Json,
        }
    }
}

/// Finds every record whose attribute equals a JSON value by scanning the
/// key space in parallel partitions.
#[derive(Debug, Parser)]
#[command(version, long_about = None)]
pub struct ScanArgs {
    /// Base URL of the account service.
    #[arg(long, env = "SCAN_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub url: String,
    /// Attribute to match.
    #[arg(long)]
    pub name: String,
    /// Target value as JSON text. Strings need quotes: '"US"'.
    #[arg(long, allow_hyphen_values = true)]
    pub value: String,
    /// Only consider records belonging to this product.
    #[arg(long)]
    pub product: Option<String>,
    #[arg(long, env = "SCAN_CLIENT_NAME", default_value = DEFAULT_CLIENT_NAME)]
    pub client_name: String,
    #[arg(long, env = "SCAN_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,
    /// Number of key-space partitions scanned in parallel.
    #[arg(long, default_value_t = 10, allow_negative_numbers = true)]
    pub partitions: i64,
    /// Page size per backend request (1-100).
    #[arg(long, default_value_t = 100, allow_negative_numbers = true)]
    pub count: i64,
    /// Comma-separated attribute columns to include in the output.
    #[arg(long, value_delimiter = ',')]
    pub attribute_names: Option<Vec<String>>,
    /// Output file; JSON on stdout when omitted.
    #[arg(long)]
    pub output: Option<PathBuf>,
    #[arg(long, value_enum)]
    pub format: Option<FormatArg>,
    /// Maximum concurrent partitions; defaults to one task per partition.
    #[arg(long)]
    pub workers: Option<usize>,
    /// Per-request timeout in seconds.
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,
    /// Attempts per page before a partition is marked failed.
    #[arg(long, default_value_t = 5)]
    pub max_attempts: u32,
    /// Comma-separated partition indices to scan, e.g. to re-run failures.
    #[arg(long, value_delimiter = ',')]
    pub only_partitions: Option<Vec<usize>>,
    /// Also write the run summary (statuses, failures, plan fingerprint) as JSON.
    #[arg(long)]
    pub summary_output: Option<PathBuf>,
    #[arg(long)]
    pub no_progress: bool,
}

impl ScanArgs {
    pub fn to_request(&self) -> Result<ScanRequest, ConfigurationError> {
        normalize_request(ScanRequestInput {
            name: self.name.clone(),
            value: self.value.clone(),
            product: self.product.clone(),
            partitions: self.partitions,
            count: self.count,
            attribute_names: self.attribute_names.clone(),
            output: self.output.clone(),
            format: self.format.map(OutputFormat::from),
            only_partitions: self.only_partitions.clone(),
        })
    }

    pub fn build_config(&self, resource: ResourceKind) -> Result<ScanConfig, ConfigurationError> {
        if self.workers == Some(0) {
            return Err(ConfigurationError::new("workers must be at least 1, got 0"));
        }
        if self.max_attempts == 0 {
            return Err(ConfigurationError::new("max attempts must be at least 1, got 0"));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigurationError::new("timeout must be at least 1 second, got 0"));
        }
        if self.url.trim().is_empty() {
            return Err(ConfigurationError::new("url cannot be empty"));
        }

        let mut config = ScanConfig::new(self.url.trim(), resource);
        config.credentials = ClientCredentials {
            client_name: self.client_name.clone(),
            client_secret: self.client_secret.clone(),
        };
        config.request_timeout = Duration::from_secs(self.timeout_secs);
        config.backoff = config.backoff.with_max_attempts(self.max_attempts);
        config.workers = self.workers;
        config.summary_path = self.summary_output.clone();
        Ok(config)
    }
}

/// Installs the stderr log subscriber. `RUST_LOG` overrides the default
/// `info` filter. Lines go through `progress` so they never collide with
/// the spinner.
pub fn init_logging(progress: &ScanProgress) {
    // ANSI colors only when stderr is a terminal and NO_COLOR is unset.
    let ansi = std::io::stderr().is_terminal() && std::env::var_os("NO_COLOR").is_none();
    tracing_subscriber::fmt()
        .with_ansi(ansi)
        .with_writer(progress.clone())
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,reqwest=warn,hyper=warn".into()),
        )
        .init();
}

/// Runs one scan end to end and maps the result onto the process exit code.
pub async fn run(resource: ResourceKind, args: ScanArgs, progress: ScanProgress) -> ExitCode {
    let result = execute(resource, &args, progress.clone()).await;
    progress.finish();
    match result {
        Ok(code) => ExitCode::from(code),
        Err(scan_error) => {
            error!(error = %scan_error, "scan_failed");
            ExitCode::from(scan_error.exit_code())
        }
    }
}

async fn execute(
    resource: ResourceKind,
    args: &ScanArgs,
    progress: ScanProgress,
) -> Result<u8, ScanError> {
    let request = args.to_request()?;
    let config = args.build_config(resource)?;
    info!(
        attribute = request.attribute_name(),
        value = %request.attribute_value(),
        "value is a JSON {}",
        request.value_kind()
    );

    let source = Arc::new(HttpPageSource::new(&config, &request)?);
    info!(endpoint = %source.endpoint(), resource = resource.noun(), "scanning");

    let cancel = CancellationToken::new();
    let interrupt = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, stopping after in-flight pages");
                cancel.cancel();
            }
        }
    });

    let result = scan_and_write(&request, &config, source, cancel, progress).await;
    interrupt.abort();
    result
}

/// Scans, logs the summary and writes the records (and the JSON summary
/// when configured). Returns the exit code for a scan that produced a
/// report: 0 for success, partial or failed runs, 130 when cancelled.
/// Outputs are written for cancelled runs too.
pub async fn scan_and_write<S>(
    request: &ScanRequest,
    config: &ScanConfig,
    source: Arc<S>,
    cancel: CancellationToken,
    progress: ScanProgress,
) -> Result<u8, ScanError>
where
    S: PageSource + 'static,
{
    let report = run_scan(request, config, source, cancel, progress.clone()).await?;

    log_summary(&report, &progress);
    if let Some(path) = &config.summary_path {
        write_summary(&report, path)?;
    }
    write_output(request, &report)?;

    Ok(match report.summary.status {
        ScanStatus::Cancelled => EXIT_CANCELLED,
        ScanStatus::Success | ScanStatus::Partial | ScanStatus::Failed => EXIT_OK,
    })
}

fn log_summary(report: &ScanReport, progress: &ScanProgress) {
    let summary = &report.summary;
    info!(
        started_at = %report.started_at.to_rfc3339(),
        duration_ms = report.elapsed.as_millis() as u64,
        pages_scanned = progress.pages(),
        matched_before_dedup = progress.matched(),
        "{}",
        summary.summary_line()
    );

    for (partition, failure) in &summary.failures {
        warn!(
            partition,
            pages_completed = failure.pages_completed,
            error = %failure.cause,
            "partition_error"
        );
    }
    if !summary.failures.is_empty() {
        let indices: Vec<String> = summary
            .failed_indices()
            .iter()
            .map(usize::to_string)
            .collect();
        warn!(
            plan_fingerprint = %summary.plan_fingerprint,
            "re-run failed partitions with --only-partitions {}",
            indices.join(",")
        );
    }
}

fn write_summary(report: &ScanReport, path: &Path) -> Result<(), ScanError> {
    export_summary_to_path(&report.summary, path).map_err(|source| ScanError::OutputWrite {
        matched: report.records.len(),
        source,
    })?;
    info!(path = %path.display(), status = ?report.summary.status, "summary_written");
    Ok(())
}

fn write_output(request: &ScanRequest, report: &ScanReport) -> Result<(), ScanError> {
    let columns = request.attribute_names();
    let result = match request.output() {
        OutputTarget::Stdout(format) => {
            let mut stdout = std::io::stdout().lock();
            write_records(&report.records, *format, columns, &mut stdout)
                .and_then(|()| stdout.flush().map_err(Into::into))
        }
        OutputTarget::File { path, format } => {
            export_to_path(&report.records, *format, columns, path).map(|()| {
                info!(
                    path = %path.display(),
                    format = format.as_str(),
                    records = report.records.len(),
                    "output_written"
                );
            })
        }
    };

    result.map_err(|source| ScanError::OutputWrite {
        matched: report.records.len(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EXIT_CONFIGURATION;

    fn parse(extra: &[&str]) -> ScanArgs {
        let mut argv = vec!["scan-accounts", "--name", "country", "--value", "\"US\""];
        argv.extend_from_slice(extra);
        ScanArgs::try_parse_from(argv).expect("arguments should parse")
    }

    #[test]
    fn defaults_match_documented_values() {
        let args = parse(&[]);
        assert_eq!(args.partitions, 10);
        assert_eq!(args.count, 100);
        assert_eq!(args.timeout_secs, 30);
        assert_eq!(args.max_attempts, 5);

        let request = args.to_request().expect("request");
        assert_eq!(request.partition_count(), 10);
        assert_eq!(request.page_size(), 100);
        assert_eq!(request.output(), &OutputTarget::Stdout(OutputFormat::Json));
    }

    #[test]
    fn out_of_range_count_is_a_configuration_error() {
        for count in ["150", "0"] {
            let error = parse(&["--count", count])
                .to_request()
                .expect_err("count should be rejected");
            assert_eq!(
                error.message(),
                format!("Count must be between 1 and 100, got {count}")
            );
            assert_eq!(ScanError::from(error).exit_code(), EXIT_CONFIGURATION);
        }
    }

    #[test]
    fn zero_or_negative_partitions_are_rejected() {
        assert!(parse(&["--partitions", "0"]).to_request().is_err());
        assert!(parse(&["--partitions", "-3"]).to_request().is_err());
    }

    #[test]
    fn negative_value_is_accepted_as_json() {
        let args =
            ScanArgs::try_parse_from(["scan-licenses", "--name", "seats", "--value", "-5"])
                .expect("arguments should parse");
        assert_eq!(args.value, "-5");
        let request = args.to_request().expect("request");
        assert_eq!(request.value_kind(), "number");
    }

    #[test]
    fn list_flags_split_on_commas() {
        let args = parse(&[
            "--attribute-names",
            "seats,country",
            "--only-partitions",
            "1,3",
            "--partitions",
            "4",
        ]);
        assert_eq!(
            args.attribute_names,
            Some(vec!["seats".to_string(), "country".to_string()])
        );
        assert_eq!(args.only_partitions, Some(vec![1, 3]));
        let request = args.to_request().expect("request");
        assert!(request.selects(3));
        assert!(!request.selects(2));
    }

    #[test]
    fn csv_output_follows_extension_or_format_flag() {
        let request = parse(&["--output", "out/accounts.CSV"]).to_request().expect("request");
        assert_eq!(request.output().format(), OutputFormat::Csv);

        let request = parse(&["--format", "csv"]).to_request().expect("request");
        assert_eq!(request.output(), &OutputTarget::Stdout(OutputFormat::Csv));
    }

    #[test]
    fn config_carries_runtime_flags() {
        let args = parse(&[
            "--url",
            "http://backend:9000/v2/",
            "--client-secret",
            "s3cret",
            "--workers",
            "3",
            "--max-attempts",
            "2",
            "--timeout-secs",
            "7",
            "--summary-output",
            "runs/summary.json",
        ]);
        let config = args.build_config(ResourceKind::Licenses).expect("config");
        assert_eq!(config.base_url, "http://backend:9000/v2/");
        assert_eq!(config.credentials.client_secret.as_deref(), Some("s3cret"));
        assert_eq!(config.workers, Some(3));
        assert_eq!(config.backoff.max_attempts, 2);
        assert_eq!(config.request_timeout, Duration::from_secs(7));
        assert_eq!(config.summary_path, Some(PathBuf::from("runs/summary.json")));
    }

    #[test]
    fn zero_runtime_limits_are_rejected() {
        for flag in ["--workers", "--max-attempts", "--timeout-secs"] {
            let error = parse(&[flag, "0"])
                .build_config(ResourceKind::Accounts)
                .expect_err("zero should be rejected");
            assert!(error.message().ends_with("got 0"));
        }
    }
}
