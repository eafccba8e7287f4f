//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.bqslots.toml` files.

use crate::cli::OutputFormat;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE: &str = ".bqslots.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Job source settings.
    #[serde(default)]
    pub source: SourceConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Output file path ("-" for stdout).
    #[serde(default = "default_output")]
    pub output: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
        }
    }
}

fn default_output() -> String {
    "-".to_string()
}

/// Job source settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Observer base URL.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Seconds between refreshes in live mode.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_seconds: default_timeout(),
            poll_interval_seconds: default_poll_interval(),
        }
    }
}

fn default_timeout() -> u64 {
    30
}

fn default_poll_interval() -> u64 {
    10 // the dashboard's refresh cadence
}

/// Report generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Output format.
    #[serde(default)]
    pub format: OutputFormat,

    /// Include row tooltips in the treemap table.
    #[serde(default = "default_true")]
    pub include_tooltips: bool,

    /// Usage fraction above which a reservation fails the run.
    #[serde(default)]
    pub fail_over: Option<f64>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            include_tooltips: true,
            fail_over: None,
        }
    }
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        Self::load_from_dir(Path::new("."))
    }

    /// Try to load `.bqslots.toml` from a directory.
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>> {
        let config_path = dir.join(CONFIG_FILE);

        if config_path.exists() {
            Ok(Some(Self::load(&config_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// This method only overrides config when CLI provides explicit values.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref endpoint) = args.endpoint {
            self.source.endpoint = Some(endpoint.clone());
        }
        if let Some(timeout) = args.timeout {
            self.source.timeout_seconds = timeout;
        }
        if let Some(interval) = args.interval {
            self.source.poll_interval_seconds = interval;
        }

        if let Some(ref output) = args.output {
            self.general.output = output.display().to_string();
        }
        if let Some(format) = args.format {
            self.report.format = format;
        }
        if args.no_tooltips {
            self.report.include_tooltips = false;
        }
        if let Some(threshold) = args.fail_over {
            self.report.fail_over = Some(threshold);
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Args;
    use clap::Parser;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.general.output, "-");
        assert_eq!(config.source.timeout_seconds, 30);
        assert_eq!(config.source.poll_interval_seconds, 10);
        assert_eq!(config.report.format, OutputFormat::Json);
        assert!(config.report.include_tooltips);
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[general]
output = "usage.md"

[source]
endpoint = "https://observer.example.com"
poll_interval_seconds = 5

[report]
format = "markdown"
fail_over = 0.9
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.general.output, "usage.md");
        assert_eq!(
            config.source.endpoint.as_deref(),
            Some("https://observer.example.com")
        );
        assert_eq!(config.source.poll_interval_seconds, 5);
        assert_eq!(config.source.timeout_seconds, 30);
        assert_eq!(config.report.format, OutputFormat::Markdown);
        assert_eq!(config.report.fail_over, Some(0.9));
    }

    #[test]
    fn test_merge_with_args() {
        let mut config: Config = toml::from_str(
            r#"
[source]
endpoint = "https://from-file.example.com"
timeout_seconds = 60

[report]
format = "markdown"
"#,
        )
        .unwrap();

        let args = Args::try_parse_from([
            "bqslots",
            "--endpoint",
            "https://from-cli.example.com",
            "--format",
            "treemap",
            "--no-tooltips",
            "--output",
            "usage.json",
        ])
        .unwrap();
        config.merge_with_args(&args);

        assert_eq!(
            config.source.endpoint.as_deref(),
            Some("https://from-cli.example.com")
        );
        assert_eq!(config.source.timeout_seconds, 60);
        assert_eq!(config.report.format, OutputFormat::Treemap);
        assert!(!config.report.include_tooltips);
        assert_eq!(config.general.output, "usage.json");
    }

    #[test]
    fn test_load_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load_from_dir(dir.path()).unwrap().is_none());

        std::fs::write(dir.path().join(CONFIG_FILE), "[report]\nformat = \"treemap\"\n").unwrap();
        let config = Config::load_from_dir(dir.path()).unwrap().unwrap();
        assert_eq!(config.report.format, OutputFormat::Treemap);

        std::fs::write(dir.path().join(CONFIG_FILE), "[report\n").unwrap();
        assert!(Config::load_from_dir(dir.path()).is_err());
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(!toml_str.is_empty());
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[source]"));
        assert!(toml_str.contains("[report]"));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.source.poll_interval_seconds, 10);
    }
}
