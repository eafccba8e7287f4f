//! Job list retrieval.
//!
//! This module fetches running-job telemetry from the observer's HTTP
//! endpoints, or reads a saved snapshot of the same JSON from disk.

use crate::models::{JobsEnvelope, RawJob};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

const JOBS_PATH: &str = "/_ah/get-handlers/v1/jobs";
const JOB_ID_PATH: &str = "/_ah/get-handlers/v1/jobid";

/// Which jobs to ask the observer for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobQuery {
    /// Every job the observer currently tracks.
    All,
    /// Jobs that started before `end` and finished after `start`.
    Window {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    /// A single job by id.
    JobId(String),
}

impl JobQuery {
    /// Build a time window query, rejecting empty or inverted windows.
    pub fn window(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start >= end {
            bail!(
                "Start time {} must be before end time {}",
                start.to_rfc3339(),
                end.to_rfc3339()
            );
        }
        Ok(JobQuery::Window { start, end })
    }

    /// Path of this query relative to the endpoint root.
    pub fn path(&self) -> String {
        match self {
            JobQuery::All => JOBS_PATH.to_string(),
            JobQuery::Window { start, end } => format!(
                "{}/{}/{}",
                JOBS_PATH,
                start.to_rfc3339_opts(SecondsFormat::Secs, true),
                end.to_rfc3339_opts(SecondsFormat::Secs, true)
            ),
            JobQuery::JobId(id) => format!("{}/{}", JOB_ID_PATH, id),
        }
    }

    /// Full URL of this query against `endpoint`.
    pub fn url(&self, endpoint: &str) -> String {
        format!("{}{}", endpoint.trim_end_matches('/'), self.path())
    }
}

/// Options for fetching from the observer.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Request timeout in seconds.
    pub timeout_seconds: u64,
    /// Whether to show a spinner while waiting.
    pub show_progress: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            show_progress: true,
        }
    }
}

/// HTTP client for the observer's job list endpoints.
pub struct JobFetcher {
    endpoint: String,
    options: FetchOptions,
    http_client: reqwest::Client,
}

impl JobFetcher {
    /// Create a fetcher for the observer at `endpoint`.
    pub fn new(endpoint: impl Into<String>, options: FetchOptions) -> Result<Self> {
        let endpoint = endpoint.into();
        info!("Using job endpoint: {}", endpoint);

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(options.timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            endpoint,
            options,
            http_client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Fetch the jobs matching `query`.
    pub async fn fetch(&self, query: &JobQuery) -> Result<Vec<RawJob>> {
        let url = query.url(&self.endpoint);
        debug!("GET {}", url);

        let spinner = self.options.show_progress.then(|| {
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} [{elapsed_precise}] {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            pb.set_message("Fetching jobs...");
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        });

        let result = self.get(&url).await;

        if let Some(pb) = spinner {
            pb.finish_and_clear();
        }

        let jobs = result?;
        info!("Fetched {} jobs", jobs.len());
        Ok(jobs)
    }

    async fn get(&self, url: &str) -> Result<Vec<RawJob>> {
        let response = self.http_client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                anyhow::anyhow!("Request timed out after {}s", self.options.timeout_seconds)
            } else if e.is_connect() {
                anyhow::anyhow!("Cannot connect to job endpoint at {}", self.endpoint)
            } else {
                anyhow::anyhow!("Failed to send request: {}", e)
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("Job endpoint error {}: {}", status, body.trim());
        }

        let envelope: JobsEnvelope = response
            .json()
            .await
            .context("Failed to parse job list response")?;

        Ok(envelope.into_jobs())
    }
}

/// Parse a job list JSON document.
pub fn parse_jobs(content: &str) -> Result<Vec<RawJob>> {
    let envelope: JobsEnvelope =
        serde_json::from_str(content).context("Failed to parse job list JSON")?;
    Ok(envelope.into_jobs())
}

/// Read a saved job list from disk.
pub fn load_jobs_file(path: &Path) -> Result<Vec<RawJob>> {
    info!("Reading jobs from: {}", path.display());

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read job file: {}", path.display()))?;

    parse_jobs(&content).with_context(|| format!("Invalid job file: {}", path.display()))
}
