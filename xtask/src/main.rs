use std::process::{exit, Command, ExitStatus};

use clap::{Parser, Subcommand, ValueEnum};

// ── CLI definition ─────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "xtask",
    about = "Task runner for the attribute scan workspace",
    long_about = "A unified CLI for building the scan binaries and running\n\
                  CI checks in the attribute scan workspace."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the scan-accounts and scan-licenses binaries
    Build {
        #[arg(value_enum, long, default_value_t = BuildProfile::Release)]
        profile: BuildProfile,
    },
    /// Run CI checks (fmt, clippy, tests)
    Ci {
        /// Job to run
        #[arg(value_enum, default_value_t = CiJob::All)]
        job: CiJob,
    },
}

#[derive(Clone, ValueEnum)]
enum CiJob {
    /// Formatting check
    Fmt,
    /// Clippy with warnings denied
    Lint,
    /// Unit and integration tests for every crate
    Test,
    /// Run fmt + lint + test
    All,
}

#[derive(Clone, Copy, ValueEnum)]
enum BuildProfile {
    Debug,
    Release,
}

impl BuildProfile {
    fn as_cargo_flag(self) -> Option<&'static str> {
        match self {
            Self::Debug => None,
            Self::Release => Some("--release"),
        }
    }
}

// ── helpers ────────────────────────────────────────────────────────

fn step(label: &str) {
    eprintln!("\n=== {label} ===");
}

fn cargo(args: &[&str]) -> ExitStatus {
    eprintln!("+ cargo {}", args.join(" "));
    Command::new("cargo")
        .args(args)
        .status()
        .expect("failed to execute cargo")
}

fn run_cargo(args: &[&str]) {
    let status = cargo(args);
    if !status.success() {
        exit(status.code().unwrap_or(1));
    }
}

fn build_binaries(profile: BuildProfile) {
    step("Build scan binaries");
    let mut cargo_args = vec![
        "build",
        "-p",
        "attr_scan_runtime",
        "--bin",
        "scan-accounts",
        "--bin",
        "scan-licenses",
    ];
    if let Some(flag) = profile.as_cargo_flag() {
        cargo_args.push(flag);
    }
    run_cargo(&cargo_args);
}

// ── CI jobs ────────────────────────────────────────────────────────

fn ci_fmt() {
    step("Check formatting");
    run_cargo(&["fmt", "--all", "--", "--check"]);
}

fn ci_lint() {
    step("Clippy");
    run_cargo(&[
        "clippy",
        "--all-targets",
        "--all-features",
        "--",
        "-D",
        "warnings",
    ]);
}

fn ci_test() {
    step("Test attr_scan_core");
    run_cargo(&["test", "-p", "attr_scan_core"]);

    step("Test attr_scan_runtime");
    run_cargo(&["test", "-p", "attr_scan_runtime"]);
}

// ── main ───────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { profile } => build_binaries(profile),
        Commands::Ci { job } => {
            match job {
                CiJob::Fmt => ci_fmt(),
                CiJob::Lint => ci_lint(),
                CiJob::Test => ci_test(),
                CiJob::All => {
                    ci_fmt();
                    ci_lint();
                    ci_test();
                }
            }
            eprintln!("\nCI job passed.");
        }
    }
}
