//! kbench - concurrent session benchmark for Jupyter-style kernel servers
//!
//! Opens N notebook sessions against a backend, drives execute requests on
//! every kernel channel at a fixed rate and records the backend process's
//! CPU, memory and message throughput over time.
//!
//! # Usage
//!
//! ```bash
//! # 16 sessions against a local Jupyter server, one request per 100ms each
//! kbench --target jupyter -n 16 --delay 100 --pid $(pgrep -f jupyter-server)
//!
//! # Same, configured through the environment
//! TARGET=zasper NUM_KERNELS=16 DELAY=100 PID=4242 kbench run
//!
//! # Layer flags over a config file
//! kbench run --config bench.toml --duration 30
//!
//! # Summarise earlier runs
//! kbench summarize data/100ms/*.json
//!
//! # Enable debug logging
//! RUST_LOG=kbench_runner=debug kbench run
//! ```
//!
//! # Signal Handling
//!
//! - SIGTERM/SIGINT: cancel the run; the summary is still printed
//! - A second signal exits immediately with status 130

use std::path::PathBuf;
use std::process;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use kbench_core::ResourceSummary;
use kbench_runner::snapshot::read_snapshot;
use kbench_runner::{BenchmarkConfig, BenchmarkSettings, Orchestrator, SysinfoInspector};

// ============================================================================
// CLI Arguments
// ============================================================================

/// kbench - kernel session load driver
#[derive(Parser, Debug)]
#[command(name = "kbench", version, about)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Run arguments when no subcommand is given
    #[command(flatten)]
    run: RunArgs,

    /// Enable debug logging (ignored when RUST_LOG is set)
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a benchmark (default)
    Run(RunArgs),
    /// Summarise snapshot files written by earlier runs
    Summarize {
        /// Snapshot files
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

#[derive(clap::Args, Debug, Default)]
struct RunArgs {
    /// TOML config file; flags and environment override it
    #[arg(long, short = 'c', value_name = "FILE")]
    config: Option<PathBuf>,

    /// Backend under test: jupyter or zasper
    #[arg(long, short = 't', env = "TARGET")]
    target: Option<String>,

    /// Number of sessions to open
    #[arg(long, short = 'n', env = "NUM_KERNELS")]
    sessions: Option<usize>,

    /// Delay between requests on each connection, in milliseconds
    #[arg(long = "delay", short = 'd', env = "DELAY", value_name = "MS")]
    delay_ms: Option<u64>,

    /// PID of the backend process to sample
    #[arg(long, short = 'p', env = "PID")]
    pid: Option<u32>,

    /// Bearer token
    #[arg(long, env = "TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// XSRF token
    #[arg(long, env = "XSRF_TOKEN", hide_env_values = true)]
    xsrf_token: Option<String>,

    /// Override the target's default http://host:port
    #[arg(long, env = "KBENCH_BASE_URL")]
    base_url: Option<String>,

    /// Snapshot file [default: data/<delay>ms/benchmark_results_<target>_<n>kernels.json]
    #[arg(long, short = 'o', env = "KBENCH_OUTPUT")]
    output: Option<PathBuf>,

    /// Send budget of each connection, in seconds [default: 60]
    #[arg(long = "duration", value_name = "SECS")]
    run_secs: Option<u64>,

    /// Time between resource samples, in milliseconds [default: 5000]
    #[arg(long, value_name = "MS")]
    sample_interval_ms: Option<u64>,

    /// Time between snapshot writes, in milliseconds [default: 2000]
    #[arg(long, value_name = "MS")]
    snapshot_interval_ms: Option<u64>,

    /// Pause between session creation calls, in milliseconds [default: 50]
    #[arg(long, value_name = "MS")]
    spacing_ms: Option<u64>,

    /// Upper bound on waiting for connections, in milliseconds [default: 10000]
    #[arg(long, value_name = "MS")]
    warmup_ms: Option<u64>,

    /// Upper bound on one channel handshake, in milliseconds [default: 10000]
    #[arg(long, value_name = "MS")]
    dial_timeout_ms: Option<u64>,

    /// Pause after the start signal, in milliseconds [default: 0]
    #[arg(long, value_name = "MS")]
    settle_ms: Option<u64>,

    /// Time to keep reading after closing a channel, in milliseconds [default: 2000]
    #[arg(long, value_name = "MS")]
    close_grace_ms: Option<u64>,

    /// Code sent in every execute request [default: 2+2]
    #[arg(long)]
    code: Option<String>,

    /// Username stamped on message headers [default: kbench]
    #[arg(long)]
    username: Option<String>,
}

impl RunArgs {
    /// Splits off the config file path; the rest is the flag/env layer.
    fn into_parts(self) -> (Option<PathBuf>, BenchmarkConfig) {
        let layer = BenchmarkConfig {
            target: self.target,
            base_url: self.base_url,
            sessions: self.sessions,
            delay_ms: self.delay_ms,
            pid: self.pid,
            token: self.token,
            xsrf_token: self.xsrf_token,
            run_secs: self.run_secs,
            sample_interval_ms: self.sample_interval_ms,
            snapshot_interval_ms: self.snapshot_interval_ms,
            spacing_ms: self.spacing_ms,
            warmup_ms: self.warmup_ms,
            dial_timeout_ms: self.dial_timeout_ms,
            settle_ms: self.settle_ms,
            close_grace_ms: self.close_grace_ms,
            code: self.code,
            username: self.username,
            output: self.output,
        };
        (self.config, layer)
    }

    fn resolve(self) -> Result<BenchmarkSettings> {
        let (path, flags) = self.into_parts();
        let file = match path {
            Some(path) => BenchmarkConfig::load(&path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => BenchmarkConfig::default(),
        };
        file.merge(flags)
            .resolve()
            .context("Invalid benchmark configuration")
    }
}

// ============================================================================
// Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug)?;

    match args.command {
        Some(Command::Run(run)) => run_benchmark(run).await,
        None => run_benchmark(args.run).await,
        Some(Command::Summarize { files, json }) => summarize(&files, json).await,
    }
}

fn init_logging(debug: bool) -> Result<()> {
    let filter = if std::env::var_os(EnvFilter::DEFAULT_ENV).is_some() {
        EnvFilter::from_default_env()
    } else {
        let level = if debug { "debug" } else { "info" };
        EnvFilter::new("warn")
            .add_directive(format!("kbench={level}").parse()?)
            .add_directive(format!("kbench_runner={level}").parse()?)
            .add_directive(format!("kbench_core={level}").parse()?)
            .add_directive(format!("kbench_protocol={level}").parse()?)
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

async fn run_benchmark(args: RunArgs) -> Result<()> {
    let settings = args.resolve()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "kbench starting"
    );

    println!(
        "kbench: {} sessions against {} ({}), {}ms between requests, {}s per connection",
        settings.sessions,
        settings.target,
        settings.endpoints.sessions_url,
        settings.tick.as_millis(),
        settings.timing.run_budget.as_secs()
    );
    println!("Sampling PID {} into {}", settings.pid, settings.output.display());

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    let inspector = SysinfoInspector::new(settings.pid);
    let summary = Orchestrator::new(settings, Box::new(inspector))
        .run(cancel)
        .await
        .context("Benchmark failed to start")?;

    println!();
    println!("{summary}");
    Ok(())
}

async fn summarize(files: &[PathBuf], as_json: bool) -> Result<()> {
    if files.is_empty() {
        bail!("No snapshot files given");
    }

    let mut reports = Vec::with_capacity(files.len());
    for path in files {
        let samples = read_snapshot(path)
            .await
            .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
        reports.push((path, ResourceSummary::from_samples(&samples)));
    }

    if as_json {
        let value: Vec<_> = reports
            .iter()
            .map(|(path, summary)| json!({ "file": path, "summary": summary }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    for (path, summary) in reports {
        println!("=== {} ===", path.display());
        if summary.is_empty() {
            println!("No samples");
        } else {
            println!("{summary}");
            println!(
                "Messages:           sent {}  received {}",
                summary.messages_sent, summary.messages_received
            );
        }
        println!();
    }
    Ok(())
}

/// Cancels the run on the first SIGINT/SIGTERM; a second one exits at once.
fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        match next_signal().await {
            Ok(name) => info!(signal = name, "Cancelling run, signal again to exit immediately"),
            Err(e) => {
                error!(error = %e, "Error waiting for shutdown signal");
                return;
            }
        }
        cancel.cancel();

        if let Ok(name) = next_signal().await {
            warn!(signal = name, "Exiting without summary");
            process::exit(130);
        }
    });
}

async fn next_signal() -> Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        let name = tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
        };
        Ok(name)
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        Ok("Ctrl-C")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_run_flags_become_config_layer() {
        let args = Args::try_parse_from([
            "kbench", "run", "--target", "zasper", "-n", "4", "--delay", "250", "--pid", "99",
            "--duration", "5",
        ])
        .unwrap();

        let Some(Command::Run(run)) = args.command else {
            panic!("expected run subcommand");
        };
        let (path, layer) = run.into_parts();
        assert!(path.is_none());
        assert_eq!(layer.target.as_deref(), Some("zasper"));
        assert_eq!(layer.sessions, Some(4));
        assert_eq!(layer.delay_ms, Some(250));
        assert_eq!(layer.run_secs, Some(5));
    }

    #[test]
    fn test_every_timing_setting_has_a_flag() {
        let args = Args::try_parse_from([
            "kbench", "--settle-ms", "500", "--close-grace-ms", "750", "--dial-timeout-ms", "3000",
            "--username", "loadgen",
        ])
        .unwrap();

        assert!(args.command.is_none());
        let (_, layer) = args.run.into_parts();
        assert_eq!(layer.settle_ms, Some(500));
        assert_eq!(layer.close_grace_ms, Some(750));
        assert_eq!(layer.dial_timeout_ms, Some(3000));
        assert_eq!(layer.username.as_deref(), Some("loadgen"));
    }

    #[test]
    fn test_summarize_requires_files() {
        assert!(Args::try_parse_from(["kbench", "summarize"]).is_err());
    }
}
