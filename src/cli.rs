//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use chrono::{DateTime, Utc};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// bqslots - BigQuery reservation slot usage from running-job telemetry
///
/// Reads the job list from a BigQuery observer endpoint (or a saved JSON
/// snapshot), splits each reservation's slots across its projects and users,
/// and writes a treemap-ready usage table.
///
/// Examples:
///   bqslots --endpoint https://observer.example.com
///   bqslots --endpoint https://observer.example.com --format markdown -o usage.md
///   bqslots --input jobs.json --format treemap
///   bqslots --endpoint https://observer.example.com --live --interval 10
///   bqslots --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Base URL of the BigQuery observer
    #[arg(
        short,
        long,
        value_name = "URL",
        env = "BQSLOTS_ENDPOINT",
        conflicts_with = "input"
    )]
    pub endpoint: Option<String>,

    /// Read jobs from a saved JSON file instead of the endpoint
    #[arg(short, long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Only jobs running after this time (RFC 3339)
    #[arg(long, value_name = "TIME", requires = "end")]
    pub start: Option<DateTime<Utc>>,

    /// Only jobs running before this time (RFC 3339)
    #[arg(long, value_name = "TIME", requires = "start")]
    pub end: Option<DateTime<Utc>>,

    /// Look up a single job by id
    #[arg(long, value_name = "ID", conflicts_with_all = ["start", "end"])]
    pub job_id: Option<String>,

    /// Output file path ("-" for stdout)
    ///
    /// Defaults to the config file setting, or stdout.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (json, treemap, markdown)
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,

    /// Leave tooltips out of the treemap table
    #[arg(long)]
    pub no_tooltips: bool,

    /// Keep refreshing until interrupted
    #[arg(long, conflicts_with = "input")]
    pub live: bool,

    /// Seconds between refreshes in live mode
    #[arg(long, value_name = "SECS")]
    pub interval: Option<u64>,

    /// Request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Exit with code 2 when a reservation's usage fraction exceeds this
    ///
    /// Example: --fail-over 0.9 fails when any reservation uses more than 90%.
    #[arg(long, value_name = "FRACTION")]
    pub fail_over: Option<f64>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .bqslots.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .bqslots.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the usage table.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Report metadata, summary and rows as JSON (default)
    #[default]
    Json,
    /// Header row plus one array per row, for treemap charts
    Treemap,
    /// Markdown report
    Markdown,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        // Without --endpoint or --input the endpoint may still come from the
        // config file; that is checked once the config is merged.
        if let Some(ref endpoint) = self.endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err("Endpoint URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if let Some(ref input) = self.input {
            if !input.is_file() {
                return Err(format!("Input file does not exist: {}", input.display()));
            }
            if self.start.is_some() || self.job_id.is_some() {
                return Err("--start/--end and --job-id only apply to --endpoint".to_string());
            }
        }

        if let (Some(start), Some(end)) = (self.start, self.end) {
            if start >= end {
                return Err("--start must be before --end".to_string());
            }
        }

        if let Some(interval) = self.interval {
            if interval == 0 {
                return Err("Interval must be at least 1 second".to_string());
            }
        }

        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        if let Some(threshold) = self.fail_over {
            if !threshold.is_finite() || threshold < 0.0 {
                return Err("--fail-over must be a non-negative number".to_string());
            }
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
