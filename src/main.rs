use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use lockscan::{
    config::ScanConfig,
    error::ScanError,
    model::Severity,
    output::{render_report, OutputFormat},
    pipeline::Pipeline,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Exit codes for CI integration
mod exit_codes {
    pub const SUCCESS: u8 = 0;
    pub const ERROR: u8 = 1;
    pub const CRITICAL_VULN: u8 = 2;
    pub const HIGH_VULN: u8 = 3;
    pub const MEDIUM_VULN: u8 = 4;
    pub const LOW_VULN: u8 = 5;
    pub const INCOMPLETE: u8 = 6;
}

#[derive(Parser)]
#[command(name = "lockscan")]
#[command(
    author,
    version,
    about = "Scan a repository's pinned dependency lock files for known vulnerabilities"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a repository's lock files against the vulnerability index
    Scan {
        /// GitHub repository URL (https://github.com/OWNER/REPO[/tree/REF])
        repo: Option<String>,

        /// Scan a local checkout instead of a hosted repository
        #[arg(long, conflicts_with = "repo")]
        path: Option<PathBuf>,

        /// Output format (table, json)
        #[arg(short, long, default_value = "table")]
        format: String,

        /// Write output to file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Config file path (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Exit with an error if findings at or above this severity exist
        #[arg(long, value_enum)]
        fail_on: Option<FailLevel>,

        /// Exit with an error if any package could not be checked
        #[arg(long)]
        fail_incomplete: bool,
    },

    /// Print the default configuration as TOML
    Config,
}

#[derive(Clone, Copy, ValueEnum)]
enum FailLevel {
    Critical,
    High,
    Medium,
    Low,
}

impl FailLevel {
    fn threshold(self) -> Severity {
        match self {
            FailLevel::Critical => Severity::Critical,
            FailLevel::High => Severity::High,
            FailLevel::Medium => Severity::Medium,
            FailLevel::Low => Severity::Low,
        }
    }

    fn exit_code(severity: Severity) -> u8 {
        match severity {
            Severity::Critical => exit_codes::CRITICAL_VULN,
            Severity::High => exit_codes::HIGH_VULN,
            Severity::Medium => exit_codes::MEDIUM_VULN,
            _ => exit_codes::LOW_VULN,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match run().await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_codes::ERROR)
        }
    }
}

async fn run() -> Result<u8> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Scan {
            repo,
            path,
            format,
            output,
            config,
            fail_on,
            fail_incomplete,
        } => {
            let mut scan_config = match config {
                Some(path) => ScanConfig::from_path(&path)?,
                None => ScanConfig::default(),
            };
            scan_config.apply_env();

            let format = OutputFormat::from_str(&format).map_err(anyhow::Error::msg)?;

            let pipeline = match (repo, path) {
                (Some(url), None) => Pipeline::for_github_url(&url, scan_config)?,
                (None, Some(path)) => Pipeline::for_local_path(path, scan_config)?,
                _ => anyhow::bail!("provide a repository URL or --path <DIR>"),
            };

            let cancel = CancellationToken::new();
            let ctrl_c_cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    eprintln!("Cancelling scan; unresolved packages will be reported as incomplete");
                    ctrl_c_cancel.cancel();
                }
            });

            let spinner = ProgressBar::new_spinner();
            spinner.set_style(ProgressStyle::with_template("{spinner} {msg}")?);
            spinner.set_message("Scanning dependencies...");
            spinner.enable_steady_tick(Duration::from_millis(100));

            let result = pipeline.run(cancel).await;
            spinner.finish_and_clear();

            let report = match result {
                Ok(report) => report,
                Err(ScanError::NoLockFiles { repo, lockfile }) => {
                    println!("No `{lockfile}` files found in {repo}, nothing to scan.");
                    return Ok(exit_codes::SUCCESS);
                }
                Err(e) => return Err(e.into()),
            };

            let rendered = render_report(&report, format)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, &rendered)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!("Report written to {}", path.display());
                }
                None => println!("{rendered}"),
            }

            if fail_incomplete && !report.incomplete.is_empty() {
                return Ok(exit_codes::INCOMPLETE);
            }
            if let (Some(level), Some(max)) = (fail_on, report.max_severity()) {
                if max >= level.threshold() {
                    return Ok(FailLevel::exit_code(max));
                }
            }
            Ok(exit_codes::SUCCESS)
        }

        Commands::Config => {
            let config = ScanConfig::default();
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(exit_codes::SUCCESS)
        }
    }
}
