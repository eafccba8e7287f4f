//! Data models for the slot usage reporter.
//!
//! This module contains the wire shape of the observer's job list, the
//! validated job record the aggregator consumes, and the flat usage rows
//! handed to the renderers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Label of the synthetic root row every usage table starts with.
pub const ROOT_LABEL: &str = "all";

/// A job as returned by the observer endpoint, before validation.
///
/// Every field is optional: the endpoint emits whatever it had in its store,
/// and a record only becomes a [`JobRecord`] after passing
/// [`crate::source::sanitize`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawJob {
    #[serde(default, rename = "jobid")]
    pub job_id: Option<String>,
    #[serde(default, rename = "projectid")]
    pub project_id: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, rename = "reservationid")]
    pub reservation_id: Option<String>,
    /// Slot capacity of the job's reservation.
    #[serde(default)]
    pub slots: Option<f64>,
    /// Active slot units per timeline sample.
    #[serde(default, rename = "activeunits")]
    pub active_units: Option<Vec<f64>>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default, rename = "type")]
    pub job_type: Option<String>,
    #[serde(default, rename = "statementtype")]
    pub statement_type: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default, rename = "createtime")]
    pub create_time: Option<String>,
    #[serde(default, rename = "starttime")]
    pub start_time: Option<String>,
    #[serde(default, rename = "endtime")]
    pub end_time: Option<String>,
}

/// Response body of the job list endpoints.
///
/// The live endpoint wraps the list in `{"data": [...]}`; saved snapshots
/// are often just the bare array.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum JobsEnvelope {
    Wrapped {
        #[serde(default)]
        data: Option<Vec<RawJob>>,
    },
    Bare(Vec<RawJob>),
}

impl JobsEnvelope {
    /// Unwrap the job list, treating a `null` list as empty.
    pub fn into_jobs(self) -> Vec<RawJob> {
        match self {
            JobsEnvelope::Wrapped { data } => data.unwrap_or_default(),
            JobsEnvelope::Bare(jobs) => jobs,
        }
    }
}

/// A validated job record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: String,
    pub reservation_id: String,
    pub project_id: String,
    pub user_email: String,
    /// Slot usage samples over the job's lifetime; the last one is the
    /// job's final usage.
    pub slot_usage_series: Vec<f64>,
    /// Declared capacity of the job's reservation.
    pub reserved_slots: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statement_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// Creates a record with only the fields the aggregator reads.
    pub fn new(
        reservation_id: impl Into<String>,
        project_id: impl Into<String>,
        user_email: impl Into<String>,
        reserved_slots: f64,
        slot_usage_series: Vec<f64>,
    ) -> Self {
        Self {
            job_id: String::new(),
            reservation_id: reservation_id.into(),
            project_id: project_id.into(),
            user_email: user_email.into(),
            slot_usage_series,
            reserved_slots,
            location: None,
            state: None,
            job_type: None,
            statement_type: None,
            priority: None,
            create_time: None,
            start_time: None,
            end_time: None,
        }
    }

    /// The job's final slot usage, 0 when there are no usable samples.
    pub fn final_usage(&self) -> f64 {
        match self.slot_usage_series.last() {
            Some(v) if v.is_finite() => *v,
            _ => 0.0,
        }
    }
}

/// Level of the hierarchy a usage row sits at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowLevel {
    Root,
    Reservation,
    Project,
    User,
}

/// One row of the reservation → project → user hierarchy.
///
/// The hierarchy is encoded through `parent_label`; only the root has none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRow {
    pub label: String,
    pub parent_label: Option<String>,
    pub allocated_slots: f64,
    /// Absolute usage over allocation, as a raw ratio.
    pub usage_fraction: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_tooltip: Option<String>,
    /// Hierarchy level, used by the renderers; not part of the row table.
    #[serde(skip)]
    pub level: Option<RowLevel>,
}

impl UsageRow {
    /// The synthetic root row.
    pub fn root() -> Self {
        Self {
            label: ROOT_LABEL.to_string(),
            parent_label: None,
            allocated_slots: 0.0,
            usage_fraction: 0.0,
            display_tooltip: None,
            level: Some(RowLevel::Root),
        }
    }

    /// Absolute slot usage the fraction was derived from.
    pub fn absolute_usage(&self) -> f64 {
        self.usage_fraction * self.allocated_slots
    }

    /// Whether usage exceeds the allocated share.
    pub fn is_over_allocated(&self) -> bool {
        self.usage_fraction > 1.0
    }
}

/// Counts and rankings derived from a usage table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageSummary {
    pub reservations: usize,
    pub projects: usize,
    pub users: usize,
    /// Rows whose usage exceeds their allocation.
    pub over_allocated: usize,
    /// Reservation rows, busiest first.
    pub busiest_reservations: Vec<UsageRow>,
}

impl UsageSummary {
    /// Highest reservation usage fraction, 0 for an empty table.
    pub fn peak_reservation_usage(&self) -> f64 {
        self.busiest_reservations
            .first()
            .map(|r| r.usage_fraction)
            .unwrap_or(0.0)
    }
}

/// Metadata about a generated usage report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Endpoint URL or input file the jobs came from.
    pub source: String,
    /// When the report was generated.
    pub generated_at: DateTime<Utc>,
    /// Jobs received from the source.
    pub jobs_received: usize,
    /// Jobs that made it into the aggregation.
    pub jobs_aggregated: usize,
    /// Jobs rejected at validation.
    pub jobs_rejected: usize,
    /// Jobs skipped for having no user email.
    pub jobs_without_email: usize,
}

/// The complete usage report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageReport {
    pub metadata: ReportMetadata,
    pub summary: UsageSummary,
    pub rows: Vec<UsageRow>,
    /// The jobs behind the table, in source order.
    pub jobs: Vec<JobRecord>,
}
