//! Reservation usage aggregation.
//!
//! This module buckets flat job records into a reservation → project → user
//! hierarchy and derives slot allocation and usage for each level.

use crate::models::{JobRecord, RowLevel, UsageRow, UsageSummary, ROOT_LABEL};
use indexmap::IndexMap;
use std::hash::Hash;

/// Group items by a key, keeping keys in first-seen order and items in
/// input order within each group.
pub fn group_by<'a, T, K, F>(
    items: impl IntoIterator<Item = &'a T>,
    key: F,
) -> IndexMap<K, Vec<&'a T>>
where
    T: 'a,
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut grouped: IndexMap<K, Vec<&'a T>> = IndexMap::new();

    for item in items {
        grouped.entry(key(item)).or_default().push(item);
    }

    grouped
}

/// Usage over allocation, 0 whenever the ratio is not a finite number.
fn usage_fraction(absolute_usage: f64, allocated_slots: f64) -> f64 {
    if allocated_slots == 0.0 {
        return 0.0;
    }
    let fraction = absolute_usage / allocated_slots;
    if fraction.is_finite() {
        fraction
    } else {
        0.0
    }
}

fn tooltip(label: &str, absolute_usage: f64, allocated_slots: f64, fraction: f64) -> String {
    format!(
        "{}: {:.1} of {:.1} slots ({:.1}%)",
        label,
        absolute_usage,
        allocated_slots,
        fraction * 100.0
    )
}

fn usage_row(
    level: RowLevel,
    label: String,
    parent: &str,
    allocated_slots: f64,
    absolute_usage: f64,
) -> UsageRow {
    let fraction = usage_fraction(absolute_usage, allocated_slots);
    UsageRow {
        display_tooltip: Some(tooltip(&label, absolute_usage, allocated_slots, fraction)),
        label,
        parent_label: Some(parent.to_string()),
        allocated_slots,
        usage_fraction: fraction,
        level: Some(level),
    }
}

/// Build the usage table for a snapshot of job records.
///
/// Each reservation's capacity is split evenly across its distinct projects,
/// and each project's share evenly across its distinct users. Usage is the
/// sum of each job's final slot sample, rolled up from users to projects to
/// reservations. Rows are emitted users first, then their project, then the
/// reservation, after the root.
pub fn aggregate(jobs: &[JobRecord]) -> Vec<UsageRow> {
    let mut rows = vec![UsageRow::root()];

    for (reservation_id, reservation_jobs) in group_by(jobs, |j| j.reservation_id.clone()) {
        let reserved_slots = reservation_jobs
            .first()
            .map(|j| j.reserved_slots)
            .filter(|s| s.is_finite())
            .unwrap_or(0.0);

        let projects = group_by(reservation_jobs.iter().copied(), |j| j.project_id.clone());
        let project_slots = reserved_slots / projects.len() as f64;
        let mut reservation_usage = 0.0;

        for (project_id, project_jobs) in &projects {
            let users = group_by(project_jobs.iter().copied(), |j| j.user_email.clone());
            let user_slots = project_slots / users.len() as f64;
            let mut project_usage = 0.0;

            for (user_email, user_jobs) in &users {
                let user_usage: f64 = user_jobs.iter().map(|j| j.final_usage()).sum();
                project_usage += user_usage;

                rows.push(usage_row(
                    RowLevel::User,
                    format!("{}/{}", project_id, user_email),
                    project_id,
                    user_slots,
                    user_usage,
                ));
            }

            reservation_usage += project_usage;
            rows.push(usage_row(
                RowLevel::Project,
                project_id.clone(),
                &reservation_id,
                project_slots,
                project_usage,
            ));
        }

        rows.push(usage_row(
            RowLevel::Reservation,
            reservation_id.clone(),
            ROOT_LABEL,
            reserved_slots,
            reservation_usage,
        ));
    }

    rows
}

/// Count rows per level and rank reservations by usage.
pub fn summarize(rows: &[UsageRow]) -> UsageSummary {
    let mut summary = UsageSummary::default();

    for row in rows {
        match row.level {
            Some(RowLevel::Reservation) => {
                summary.reservations += 1;
                summary.busiest_reservations.push(row.clone());
            }
            Some(RowLevel::Project) => summary.projects += 1,
            Some(RowLevel::User) => summary.users += 1,
            _ => {}
        }
        if row.is_over_allocated() {
            summary.over_allocated += 1;
        }
    }

    summary.busiest_reservations.sort_by(|a, b| {
        b.usage_fraction
            .partial_cmp(&a.usage_fraction)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    summary
}

/// Rows whose parent is `parent`, in table order.
pub fn children_of<'a>(rows: &'a [UsageRow], parent: &str) -> Vec<&'a UsageRow> {
    rows.iter()
        .filter(|r| r.parent_label.as_deref() == Some(parent))
        .collect()
}

/// Split a usage table into one slice per reservation.
///
/// Each slice holds the reservation's user and project rows followed by the
/// reservation row itself. Project and user labels are only unique within a
/// slice, so lookups by label should be scoped to one.
pub fn reservation_blocks(rows: &[UsageRow]) -> Vec<&[UsageRow]> {
    let mut blocks = Vec::new();
    let mut start = 0;

    for (i, row) in rows.iter().enumerate() {
        match row.level {
            Some(RowLevel::Root) => start = i + 1,
            Some(RowLevel::Reservation) => {
                blocks.push(&rows[start..=i]);
                start = i + 1;
            }
            _ => {}
        }
    }

    blocks
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn job(reservation: &str, project: &str, user: &str, slots: f64, usage: &[f64]) -> JobRecord {
        JobRecord::new(reservation, project, user, slots, usage.to_vec())
    }

    fn find<'a>(rows: &'a [UsageRow], label: &str) -> &'a UsageRow {
        rows.iter()
            .find(|r| r.label == label)
            .unwrap_or_else(|| panic!("no row labeled {}", label))
    }

    fn sample_jobs() -> Vec<JobRecord> {
        vec![
            job("R1", "P1", "alice@example.com", 100.0, &[10.0, 25.0]),
            job("R1", "P2", "bob@example.com", 100.0, &[40.0]),
            job("R1", "P2", "carol@example.com", 100.0, &[5.0, 10.0]),
            job("R2", "P3", "dave@example.com", 0.0, &[12.0]),
            job("R1", "P2", "bob@example.com", 100.0, &[2.0, 0.0, 6.0]),
        ]
    }

    #[test]
    fn test_group_by_keeps_first_seen_order() {
        let items = vec![("b", 1), ("a", 2), ("b", 3), ("c", 4), ("a", 5)];
        let grouped = group_by(&items, |(k, _)| *k);

        let keys: Vec<_> = grouped.keys().copied().collect();
        assert_eq!(keys, vec!["b", "a", "c"]);

        let b: Vec<_> = grouped["b"].iter().map(|(_, v)| *v).collect();
        assert_eq!(b, vec![1, 3]);
    }

    #[test]
    fn test_empty_input_yields_only_root() {
        let rows = aggregate(&[]);
        assert_eq!(rows, vec![UsageRow::root()]);
        assert_eq!(rows[0].label, "all");
        assert!(rows[0].parent_label.is_none());
        assert_eq!(rows[0].allocated_slots, 0.0);
        assert_eq!(rows[0].usage_fraction, 0.0);
    }

    #[test]
    fn test_even_split_example() {
        let jobs = vec![
            job("R1", "P1", "alice@example.com", 100.0, &[10.0, 25.0]),
            job("R1", "P2", "bob@example.com", 100.0, &[30.0]),
        ];
        let rows = aggregate(&jobs);

        assert_eq!(find(&rows, "P1").allocated_slots, 50.0);
        assert_eq!(find(&rows, "P2").allocated_slots, 50.0);

        let alice = find(&rows, "P1/alice@example.com");
        assert_eq!(alice.allocated_slots, 50.0);
        assert_eq!(alice.usage_fraction, 0.5);
        assert_eq!(alice.parent_label.as_deref(), Some("P1"));

        let r1 = find(&rows, "R1");
        assert_eq!(r1.allocated_slots, 100.0);
        assert_eq!(r1.parent_label.as_deref(), Some("all"));
        assert!((r1.usage_fraction - 0.55).abs() < 1e-12);
    }

    #[test]
    fn test_single_root_and_parent_closure() {
        let rows = aggregate(&sample_jobs());

        let roots: Vec<_> = rows.iter().filter(|r| r.parent_label.is_none()).collect();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].label, "all");

        let labels: HashSet<&str> = rows.iter().map(|r| r.label.as_str()).collect();
        for row in rows.iter().filter(|r| r.parent_label.is_some()) {
            let parent = row.parent_label.as_deref().unwrap();
            assert!(labels.contains(parent), "dangling parent {}", parent);
            assert_ne!(parent, row.label);
        }
    }

    #[test]
    fn test_children_allocation_sums_to_parent() {
        let rows = aggregate(&sample_jobs());

        for parent in ["R1", "P1", "P2"] {
            let total: f64 = children_of(&rows, parent)
                .iter()
                .map(|r| r.allocated_slots)
                .sum();
            assert!((total - find(&rows, parent).allocated_slots).abs() < 1e-9);
        }
    }

    #[test]
    fn test_users_share_project_allocation_evenly() {
        let rows = aggregate(&sample_jobs());

        let bob = find(&rows, "P2/bob@example.com");
        let carol = find(&rows, "P2/carol@example.com");
        assert_eq!(bob.allocated_slots, 25.0);
        assert_eq!(carol.allocated_slots, 25.0);

        // bob: 40 + 6 over 25; carol: 10 over 25
        assert!((bob.usage_fraction - 46.0 / 25.0).abs() < 1e-12);
        assert!((carol.usage_fraction - 0.4).abs() < 1e-12);
        assert!((find(&rows, "P2").usage_fraction - 56.0 / 50.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_allocation_yields_zero_usage() {
        let rows = aggregate(&sample_jobs());

        for label in ["R2", "P3", "P3/dave@example.com"] {
            let row = find(&rows, label);
            assert_eq!(row.allocated_slots, 0.0);
            assert_eq!(row.usage_fraction, 0.0);
            assert!(row.usage_fraction.is_finite());
        }
    }

    #[test]
    fn test_non_finite_capacity_is_treated_as_zero() {
        let rows = aggregate(&[job("R1", "P1", "a@example.com", f64::NAN, &[5.0])]);
        assert!(rows.iter().all(|r| r.usage_fraction.is_finite()));
        assert!(rows.iter().all(|r| r.allocated_slots.is_finite()));
    }

    #[test]
    fn test_emission_order() {
        let rows = aggregate(&sample_jobs());
        let labels: Vec<_> = rows.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(
            labels,
            vec![
                "all",
                "P1/alice@example.com",
                "P1",
                "P2/bob@example.com",
                "P2/carol@example.com",
                "P2",
                "R1",
                "P3/dave@example.com",
                "P3",
                "R2",
            ]
        );
    }

    #[test]
    fn test_reservation_blocks_scope_shared_project_ids() {
        let rows = aggregate(&[
            job("R1", "P1", "alice@example.com", 100.0, &[10.0]),
            job("R2", "P1", "bob@example.com", 100.0, &[20.0]),
        ]);
        let blocks = reservation_blocks(&rows);
        assert_eq!(blocks.len(), 2);

        let last: Vec<_> = blocks.iter().map(|b| b[b.len() - 1].label.as_str()).collect();
        assert_eq!(last, vec!["R1", "R2"]);

        let r1_users: Vec<_> = children_of(blocks[0], "P1")
            .iter()
            .map(|r| r.label.as_str())
            .collect();
        assert_eq!(r1_users, vec!["P1/alice@example.com"]);

        // unscoped lookup sees both reservations' users
        assert_eq!(children_of(&rows, "P1").len(), 2);
    }

    #[test]
    fn test_reservation_blocks_empty_table() {
        assert!(reservation_blocks(&aggregate(&[])).is_empty());
    }

    #[test]
    fn test_aggregate_is_deterministic() {
        let jobs = sample_jobs();
        assert_eq!(aggregate(&jobs), aggregate(&jobs));
    }

    #[test]
    fn test_tooltips() {
        let rows = aggregate(&[job("R1", "P1", "a@example.com", 100.0, &[25.0])]);
        assert!(rows[0].display_tooltip.is_none());
        assert_eq!(
            find(&rows, "P1/a@example.com").display_tooltip.as_deref(),
            Some("P1/a@example.com: 25.0 of 100.0 slots (25.0%)")
        );
    }

    #[test]
    fn test_summarize() {
        let rows = aggregate(&sample_jobs());
        let summary = summarize(&rows);

        assert_eq!(summary.reservations, 2);
        assert_eq!(summary.projects, 3);
        assert_eq!(summary.users, 4);
        // bob and P2 run above their share
        assert_eq!(summary.over_allocated, 2);
        assert_eq!(summary.busiest_reservations[0].label, "R1");
        assert!((summary.peak_reservation_usage() - 81.0 / 100.0).abs() < 1e-12);
    }
}
