//! Usage report generation.
//!
//! Renders a usage table as JSON, as a treemap data table, or as a Markdown
//! report. Usage fractions are formatted as percentages here and nowhere else.

use crate::analysis::{children_of, reservation_blocks};
use crate::cli::OutputFormat;
use crate::models::{JobRecord, ReportMetadata, UsageReport, UsageRow, UsageSummary};
use anyhow::Result;
use serde_json::{json, Value};

/// Render `report` in the requested format.
pub fn render(report: &UsageReport, format: OutputFormat, include_tooltips: bool) -> Result<String> {
    match format {
        OutputFormat::Json => generate_json_report(report),
        OutputFormat::Treemap => generate_treemap_table(&report.rows, include_tooltips),
        OutputFormat::Markdown => Ok(generate_markdown_report(report)),
    }
}

/// Generate a JSON report.
pub fn generate_json_report(report: &UsageReport) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

/// Build the treemap data table: a header row followed by one array per
/// usage row.
pub fn treemap_table(rows: &[UsageRow], include_tooltips: bool) -> Vec<Value> {
    let mut header = vec!["Label", "Parent", "Allocated slots", "Usage"];
    if include_tooltips {
        header.push("Tooltip");
    }

    let mut table = Vec::with_capacity(rows.len() + 1);
    table.push(json!(header));

    for row in rows {
        let mut cells = vec![
            json!(row.label),
            json!(row.parent_label),
            json!(row.allocated_slots),
            json!(row.usage_fraction),
        ];
        if include_tooltips {
            cells.push(json!(row.display_tooltip.as_deref().unwrap_or(&row.label)));
        }
        table.push(Value::Array(cells));
    }

    table
}

/// Generate the treemap data table as JSON text.
pub fn generate_treemap_table(rows: &[UsageRow], include_tooltips: bool) -> Result<String> {
    serde_json::to_string_pretty(&treemap_table(rows, include_tooltips)).map_err(Into::into)
}

fn percent(fraction: f64) -> String {
    format!("{:.1}%", fraction * 100.0)
}

fn usage_marker(row: &UsageRow) -> &'static str {
    if row.is_over_allocated() {
        " (over)"
    } else {
        ""
    }
}

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &UsageReport) -> String {
    let mut output = String::new();

    output.push_str("# Reservation Slot Usage\n\n");
    output.push_str(&generate_metadata_section(&report.metadata));
    output.push_str(&generate_summary_section(&report.summary));
    output.push_str(&generate_reservations_section(&report.summary));
    output.push_str(&generate_breakdown_section(&report.rows));
    output.push_str(&generate_jobs_section(&report.jobs));
    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Source:** {}\n", metadata.source));
    section.push_str(&format!(
        "- **Generated:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Jobs Received:** {}\n", metadata.jobs_received));
    section.push_str(&format!(
        "- **Jobs Aggregated:** {}\n",
        metadata.jobs_aggregated
    ));
    if metadata.jobs_rejected > 0 {
        section.push_str(&format!("- **Jobs Rejected:** {}\n", metadata.jobs_rejected));
    }
    if metadata.jobs_without_email > 0 {
        section.push_str(&format!(
            "- **Jobs Without User:** {}\n",
            metadata.jobs_without_email
        ));
    }
    section.push('\n');

    section
}

/// Generate the summary section.
fn generate_summary_section(summary: &UsageSummary) -> String {
    let mut section = String::new();

    section.push_str("## Summary\n\n");
    section.push_str("| Reservations | Projects | Users | Over Allocation |\n");
    section.push_str("|:---:|:---:|:---:|:---:|\n");
    section.push_str(&format!(
        "| {} | {} | {} | {} |\n\n",
        summary.reservations, summary.projects, summary.users, summary.over_allocated
    ));

    section
}

/// Generate the reservations table, busiest first.
fn generate_reservations_section(summary: &UsageSummary) -> String {
    let mut section = String::new();

    section.push_str("## Reservations\n\n");

    if summary.busiest_reservations.is_empty() {
        section.push_str("No running jobs with a reservation were found.\n\n");
        return section;
    }

    section.push_str("| Reservation | Slots | In Use | Usage |\n");
    section.push_str("|:---|---:|---:|---:|\n");
    for row in &summary.busiest_reservations {
        section.push_str(&format!(
            "| `{}` | {:.0} | {:.1} | {}{} |\n",
            row.label,
            row.allocated_slots,
            row.absolute_usage(),
            percent(row.usage_fraction),
            usage_marker(row)
        ));
    }
    section.push('\n');

    section
}

/// Generate per-reservation project and user tables.
fn generate_breakdown_section(rows: &[UsageRow]) -> String {
    let blocks = reservation_blocks(rows);

    if blocks.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Breakdown\n\n");

    for block in blocks {
        let Some(reservation) = block.last() else {
            continue;
        };
        section.push_str(&format!(
            "### {} ({:.0} slots, {})\n\n",
            reservation.label,
            reservation.allocated_slots,
            percent(reservation.usage_fraction)
        ));
        section.push_str("| Project / User | Share | In Use | Usage |\n");
        section.push_str("|:---|---:|---:|---:|\n");

        for project in children_of(block, &reservation.label) {
            section.push_str(&generate_row_line(project, &format!("**{}**", project.label)));
            for user in children_of(block, &project.label) {
                let email = user
                    .label
                    .strip_prefix(&format!("{}/", project.label))
                    .unwrap_or(&user.label);
                section.push_str(&generate_row_line(user, &format!("↳ {}", email)));
            }
        }
        section.push('\n');
    }

    section
}

fn generate_row_line(row: &UsageRow, name: &str) -> String {
    format!(
        "| {} | {:.1} | {:.1} | {}{} |\n",
        name,
        row.allocated_slots,
        row.absolute_usage(),
        percent(row.usage_fraction),
        usage_marker(row)
    )
}

/// Generate the table of aggregated jobs, in source order.
fn generate_jobs_section(jobs: &[JobRecord]) -> String {
    if jobs.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Jobs\n\n");
    section.push_str("| Job | User | Project | Reservation | Slots | In Use | State | Started |\n");
    section.push_str("|:---|:---|:---|:---|---:|---:|:---|:---|\n");

    for job in jobs {
        let started = job
            .start_time
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        section.push_str(&format!(
            "| `{}` | {} | {} | {} | {:.0} | {:.1} | {} | {} |\n",
            job.job_id,
            job.user_email,
            job.project_id,
            job.reservation_id,
            job.reserved_slots,
            job.final_usage(),
            job.state.as_deref().unwrap_or("-"),
            started
        ));
    }
    section.push('\n');

    section
}

/// Generate the report footer.
fn generate_footer() -> String {
    "---\n\n*Report generated by bqslots*\n".to_string()
}
