//! Job data sources.
//!
//! Jobs come either from the observer's HTTP endpoint or from a JSON file,
//! and pass through [`sanitize`] before they reach the aggregator.

pub mod fetcher;
pub mod validate;

pub use fetcher::{load_jobs_file, FetchOptions, JobFetcher, JobQuery};
pub use validate::sanitize;

use crate::models::RawJob;
use anyhow::Result;
use std::path::PathBuf;

/// Where a snapshot of jobs is read from.
pub enum JobSource {
    Http { fetcher: JobFetcher, query: JobQuery },
    File(PathBuf),
}

impl JobSource {
    /// Human-readable description for report metadata.
    pub fn describe(&self) -> String {
        match self {
            JobSource::Http { fetcher, query } => query.url(fetcher.endpoint()),
            JobSource::File(path) => path.display().to_string(),
        }
    }

    /// Read the current snapshot of jobs.
    pub async fn load(&self) -> Result<Vec<RawJob>> {
        match self {
            JobSource::Http { fetcher, query } => fetcher.fetch(query).await,
            JobSource::File(path) => load_jobs_file(path),
        }
    }
}
