//! Validation of wire job records.
//!
//! The observer endpoint hands back loosely shaped JSON. This module turns it
//! into [`JobRecord`]s, skipping records with no user and rejecting records
//! that cannot be placed in the reservation hierarchy.

use crate::models::{JobRecord, RawJob};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

/// Why a wire record was rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RecordError {
    #[error("job {job_id}: missing reservation id")]
    MissingReservation { job_id: String },

    #[error("job {job_id}: missing project id")]
    MissingProject { job_id: String },

    #[error("job {job_id}: invalid reserved slot count {slots}")]
    InvalidSlots { job_id: String, slots: f64 },
}

/// Outcome of validating a batch of wire records.
#[derive(Debug, Default)]
pub struct Sanitized {
    /// Records ready for aggregation, in input order.
    pub records: Vec<JobRecord>,
    /// Records that did not conform.
    pub rejected: Vec<RecordError>,
    /// Records dropped for having no user email.
    pub skipped_no_email: usize,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_time(value: Option<&str>) -> Option<DateTime<Utc>> {
    let value = value?;
    match DateTime::parse_from_rfc3339(value) {
        Ok(t) => Some(t.with_timezone(&Utc)),
        Err(e) => {
            debug!("Ignoring unparseable timestamp {:?}: {}", value, e);
            None
        }
    }
}

/// Validate a single wire record.
///
/// Returns `Ok(None)` for records without a user email: those are noise from
/// the observer, not errors.
pub fn validate_job(raw: RawJob) -> Result<Option<JobRecord>, RecordError> {
    let job_id = raw.job_id.clone().unwrap_or_default();

    let Some(user_email) = non_empty(raw.email) else {
        return Ok(None);
    };

    let reservation_id = non_empty(raw.reservation_id).ok_or_else(|| {
        RecordError::MissingReservation {
            job_id: job_id.clone(),
        }
    })?;

    let project_id = non_empty(raw.project_id).ok_or_else(|| RecordError::MissingProject {
        job_id: job_id.clone(),
    })?;

    let reserved_slots = raw.slots.unwrap_or(0.0);
    if !reserved_slots.is_finite() || reserved_slots < 0.0 {
        return Err(RecordError::InvalidSlots {
            job_id,
            slots: reserved_slots,
        });
    }

    let slot_usage_series = raw
        .active_units
        .unwrap_or_default()
        .into_iter()
        .map(|v| if v.is_finite() { v } else { 0.0 })
        .collect();

    Ok(Some(JobRecord {
        job_id,
        location: non_empty(raw.location),
        state: non_empty(raw.state),
        job_type: non_empty(raw.job_type),
        statement_type: non_empty(raw.statement_type),
        priority: non_empty(raw.priority),
        create_time: parse_time(raw.create_time.as_deref()),
        start_time: parse_time(raw.start_time.as_deref()),
        end_time: parse_time(raw.end_time.as_deref()),
        ..JobRecord::new(
            reservation_id,
            project_id,
            user_email,
            reserved_slots,
            slot_usage_series,
        )
    }))
}

/// Validate a batch of wire records, logging what gets dropped.
pub fn sanitize(raw_jobs: Vec<RawJob>) -> Sanitized {
    let mut out = Sanitized::default();

    for raw in raw_jobs {
        let job_id = raw.job_id.clone().unwrap_or_default();
        match validate_job(raw) {
            Ok(Some(record)) => out.records.push(record),
            Ok(None) => {
                debug!("Skipping job {:?} with no user email", job_id);
                out.skipped_no_email += 1;
            }
            Err(e) => {
                warn!("Rejected record: {}", e);
                out.rejected.push(e);
            }
        }
    }

    debug!(
        "Validated {} jobs ({} rejected, {} without email)",
        out.records.len(),
        out.rejected.len(),
        out.skipped_no_email
    );

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(reservation: &str, project: &str, email: &str) -> RawJob {
        RawJob {
            job_id: Some("job_1".to_string()),
            reservation_id: Some(reservation.to_string()),
            project_id: Some(project.to_string()),
            email: Some(email.to_string()),
            slots: Some(100.0),
            active_units: Some(vec![4.0, 9.0]),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_record() {
        let mut job = raw("R1", "P1", "a@example.com");
        job.start_time = Some("2019-05-01T10:00:00Z".to_string());
        job.state = Some("Running".to_string());

        let record = validate_job(job).unwrap().unwrap();
        assert_eq!(record.reservation_id, "R1");
        assert_eq!(record.project_id, "P1");
        assert_eq!(record.user_email, "a@example.com");
        assert_eq!(record.reserved_slots, 100.0);
        assert_eq!(record.final_usage(), 9.0);
        assert_eq!(record.state.as_deref(), Some("Running"));
        assert!(record.start_time.is_some());
        assert!(record.end_time.is_none());
    }

    #[test]
    fn test_missing_email_is_skipped() {
        assert_eq!(validate_job(raw("R1", "P1", "")).unwrap(), None);
        assert_eq!(validate_job(raw("R1", "P1", "   ")).unwrap(), None);

        let mut job = raw("R1", "P1", "a@example.com");
        job.email = None;
        assert_eq!(validate_job(job).unwrap(), None);
    }

    #[test]
    fn test_missing_grouping_keys_are_rejected() {
        assert_eq!(
            validate_job(raw("", "P1", "a@example.com")),
            Err(RecordError::MissingReservation {
                job_id: "job_1".to_string()
            })
        );

        let mut job = raw("R1", "P1", "a@example.com");
        job.project_id = None;
        assert!(matches!(
            validate_job(job),
            Err(RecordError::MissingProject { .. })
        ));
    }

    #[test]
    fn test_missing_numbers_default_to_zero() {
        let mut job = raw("R1", "P1", "a@example.com");
        job.slots = None;
        job.active_units = None;

        let record = validate_job(job).unwrap().unwrap();
        assert_eq!(record.reserved_slots, 0.0);
        assert!(record.slot_usage_series.is_empty());
        assert_eq!(record.final_usage(), 0.0);
    }

    #[test]
    fn test_negative_slots_rejected() {
        let mut job = raw("R1", "P1", "a@example.com");
        job.slots = Some(-5.0);
        assert!(matches!(
            validate_job(job),
            Err(RecordError::InvalidSlots { .. })
        ));
    }

    #[test]
    fn test_bad_timestamp_is_ignored() {
        let mut job = raw("R1", "P1", "a@example.com");
        job.create_time = Some("yesterday".to_string());
        let record = validate_job(job).unwrap().unwrap();
        assert!(record.create_time.is_none());
    }

    #[test]
    fn test_sanitize_counts() {
        let jobs = vec![
            raw("R1", "P1", "a@example.com"),
            raw("R1", "P1", ""),
            raw("", "P1", "b@example.com"),
            raw("R1", "P2", "c@example.com"),
        ];

        let out = sanitize(jobs);
        assert_eq!(out.records.len(), 2);
        assert_eq!(out.skipped_no_email, 1);
        assert_eq!(out.rejected.len(), 1);
        assert_eq!(out.records[1].project_id, "P2");
    }

    #[test]
    fn test_error_messages() {
        let err = RecordError::MissingProject {
            job_id: "bqjob_42".to_string(),
        };
        assert_eq!(err.to_string(), "job bqjob_42: missing project id");
    }
}
