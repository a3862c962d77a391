use std::process::ExitCode;

use attr_scan_runtime::cli::{self, ScanArgs};
use attr_scan_runtime::config::ResourceKind;
use attr_scan_runtime::progress::ScanProgress;
use clap::Parser;

#[tokio::main]
async fn main() -> ExitCode {
    let args = ScanArgs::parse();
    let progress = ScanProgress::for_terminal(!args.no_progress, ResourceKind::Accounts.noun());
    cli::init_logging(&progress);
    cli::run(ResourceKind::Accounts, args, progress).await
}
