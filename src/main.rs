//! bqslots - BigQuery reservation slot usage reporter
//!
//! A CLI tool that reads running-job telemetry from a BigQuery observer,
//! splits each reservation's slots across its projects and users, and writes
//! a treemap-ready usage table.
//!
//! Exit codes:
//!   0 - Success (no reservation above threshold, or no --fail-over set)
//!   1 - Runtime error (connection, config, bad input, etc.)
//!   2 - A reservation's usage is above the --fail-over threshold

mod analysis;
mod cli;
mod config;
mod live;
mod models;
mod report;
mod source;

use anyhow::{Context, Result};
use chrono::Utc;
use cli::Args;
use config::{Config, CONFIG_FILE};
use live::LiveSession;
use models::{ReportMetadata, UsageReport};
use source::{FetchOptions, JobFetcher, JobQuery, JobSource};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    init_logging(&args)?;

    info!("bqslots v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run(args).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Run failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .bqslots.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!("⚠️  {} already exists. Remove it first or edit it manually.", CONFIG_FILE);
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE);
    println!("   Edit it to set the endpoint, refresh interval and output format.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
///
/// Logs go to stderr so the usage table can be written to stdout.
fn init_logging(args: &Args) -> Result<()> {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")
}

/// Run a single report or a live session. Returns exit code (0 or 2).
async fn run(args: Args) -> Result<i32> {
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    let job_source = build_source(&args, &config)?;
    info!("Reading jobs from {}", job_source.describe());

    if args.live {
        run_live(&job_source, &config, args.quiet).await?;
        return Ok(0);
    }

    let report = build_report(&job_source).await?;
    write_report(&report, &config)?;

    if !args.quiet {
        print_summary(&report, &config);
    }

    // Check --fail-over threshold
    if let Some(threshold) = config.report.fail_over {
        let peak = report.summary.peak_reservation_usage();
        if peak > threshold {
            eprintln!(
                "\n⛔ Reservation usage {:.1}% is above the {:.1}% threshold. Failing (exit code 2).",
                peak * 100.0,
                threshold * 100.0
            );
            return Ok(2);
        }
    }

    Ok(0)
}

/// Pick the job source and query from arguments and config.
fn build_source(args: &Args, config: &Config) -> Result<JobSource> {
    if let Some(ref path) = args.input {
        return Ok(JobSource::File(path.clone()));
    }

    let endpoint = config
        .source
        .endpoint
        .clone()
        .with_context(|| {
            format!(
                "No job endpoint configured: pass --endpoint or --input, or set [source] endpoint in {}",
                CONFIG_FILE
            )
        })?;
    if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
        anyhow::bail!("Endpoint URL must start with 'http://' or 'https://': {}", endpoint);
    }

    let query = if let Some(ref job_id) = args.job_id {
        JobQuery::JobId(job_id.clone())
    } else if let (Some(start), Some(end)) = (args.start, args.end) {
        JobQuery::window(start, end)?
    } else {
        JobQuery::All
    };

    let fetch_options = FetchOptions {
        timeout_seconds: config.source.timeout_seconds,
        show_progress: !args.quiet && !args.live,
    };

    Ok(JobSource::Http {
        fetcher: JobFetcher::new(endpoint, fetch_options)?,
        query,
    })
}

/// Read one snapshot of jobs and turn it into a usage report.
async fn build_report(job_source: &JobSource) -> Result<UsageReport> {
    let raw_jobs = job_source.load().await?;
    let jobs_received = raw_jobs.len();

    let sanitized = source::sanitize(raw_jobs);
    if !sanitized.rejected.is_empty() {
        warn!(
            "{} of {} jobs rejected during validation",
            sanitized.rejected.len(),
            jobs_received
        );
    }

    let rows = analysis::aggregate(&sanitized.records);
    let summary = analysis::summarize(&rows);
    debug!("Aggregated into {} rows", rows.len());

    Ok(UsageReport {
        metadata: ReportMetadata {
            source: job_source.describe(),
            generated_at: Utc::now(),
            jobs_received,
            jobs_aggregated: sanitized.records.len(),
            jobs_rejected: sanitized.rejected.len(),
            jobs_without_email: sanitized.skipped_no_email,
        },
        summary,
        rows,
        jobs: sanitized.records,
    })
}

/// Render the report and write it to the configured output.
fn write_report(report: &UsageReport, config: &Config) -> Result<()> {
    let output = report::render(report, config.report.format, config.report.include_tooltips)?;

    if config.general.output == "-" {
        println!("{}", output);
    } else {
        std::fs::write(&config.general.output, &output)
            .with_context(|| format!("Failed to write report to {}", config.general.output))?;
        debug!("Report written to {}", config.general.output);
    }

    Ok(())
}

/// Print a short summary of the report to stderr.
fn print_summary(report: &UsageReport, config: &Config) {
    let summary = &report.summary;

    eprintln!("\n📊 Slot Usage Summary:");
    eprintln!(
        "   Jobs: {} aggregated of {} received",
        report.metadata.jobs_aggregated, report.metadata.jobs_received
    );
    eprintln!(
        "   Reservations: {} | Projects: {} | Users: {}",
        summary.reservations, summary.projects, summary.users
    );
    if let Some(busiest) = summary.busiest_reservations.first() {
        eprintln!(
            "   Busiest: {} at {:.1}% of {:.0} slots",
            busiest.label,
            busiest.usage_fraction * 100.0,
            busiest.allocated_slots
        );
    }
    if summary.over_allocated > 0 {
        eprintln!("   ⚠️  {} rows above their slot share", summary.over_allocated);
    }
    if config.general.output != "-" {
        eprintln!("\n✅ Report saved to: {}", config.general.output);
    }
}

/// Refresh the report on an interval until Ctrl-C.
async fn run_live(job_source: &JobSource, config: &Config, quiet: bool) -> Result<()> {
    if !quiet {
        eprintln!(
            "🔴 Live: refreshing every {}s. Press Ctrl-C to stop.",
            config.source.poll_interval_seconds
        );
    }

    let session = run_live_until(job_source, config, tokio::signal::ctrl_c()).await;

    if !quiet {
        eprintln!(
            "\n✅ Live mode stopped after {} refreshes ({} failed).",
            session.refreshes(),
            session.failures()
        );
        if let Some(at) = session.last_refresh() {
            eprintln!("   Last refresh: {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
        }
    }

    Ok(())
}

/// Refresh on every tick until `shutdown` resolves. A refresh still in
/// flight when `shutdown` resolves is abandoned.
async fn run_live_until<F>(job_source: &JobSource, config: &Config, shutdown: F) -> LiveSession
where
    F: std::future::Future<Output = std::io::Result<()>>,
{
    let mut session = LiveSession::new(Duration::from_secs(config.source.poll_interval_seconds));
    session.toggle();

    let mut ticker = tokio::time::interval(session.interval());
    tokio::pin!(shutdown);

    while session.mode().is_on() {
        tokio::select! {
            _ = ticker.tick() => {
                let refresh = async {
                    let report = build_report(job_source).await?;
                    write_report(&report, config)?;
                    Ok::<_, anyhow::Error>(report)
                };

                tokio::select! {
                    result = refresh => record_refresh(&mut session, config, result),
                    signal = &mut shutdown => stop_live(&mut session, signal),
                }
            }
            signal = &mut shutdown => stop_live(&mut session, signal),
        }
    }

    session
}

fn record_refresh(session: &mut LiveSession, config: &Config, result: Result<UsageReport>) {
    match result {
        Ok(report) => {
            session.record_refresh(report.metadata.generated_at);
            info!(
                "Refresh {}: {} jobs, peak reservation usage {:.1}%",
                session.refreshes(),
                report.metadata.jobs_aggregated,
                report.summary.peak_reservation_usage() * 100.0
            );
            if let Some(threshold) = config.report.fail_over {
                if report.summary.peak_reservation_usage() > threshold {
                    warn!("Reservation usage above {:.1}% threshold", threshold * 100.0);
                }
            }
        }
        Err(e) => {
            session.record_failure();
            warn!("Refresh failed: {:#}", e);
        }
    }
}

fn stop_live(session: &mut LiveSession, signal: std::io::Result<()>) {
    if let Err(e) = signal {
        warn!("Failed to listen for Ctrl-C: {}", e);
    }
    session.toggle();
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", CONFIG_FILE);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}
