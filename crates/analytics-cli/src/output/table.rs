//! Human-readable table output formatting.

use super::{OptimizedQuery, OutlierReport};
use dhis_analytics_core::job::{JobRun, JobRunKind};
use dhis_analytics_core::{GenerationReport, ReplicationReport, Severity};
use is_terminal::IsTerminal;
use owo_colors::OwoColorize;
use std::fmt::{self, Write};
use tabled::settings::Style;
use tabled::{Table, Tabled};

#[derive(Tabled)]
struct TableRow {
    #[tabled(rename = "Table")]
    table: String,
    #[tabled(rename = "Type")]
    table_type: String,
    #[tabled(rename = "Partitions")]
    partitions: usize,
    #[tabled(rename = "Rows")]
    rows: u64,
}

#[derive(Tabled)]
struct ReplicaRow {
    #[tabled(rename = "Table")]
    table: String,
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Rows")]
    rows: u64,
    #[tabled(rename = "Duration (ms)")]
    duration_ms: u64,
}

#[derive(Tabled)]
struct ElementRow {
    #[tabled(rename = "Data element")]
    uid: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Value type")]
    value_type: String,
}

/// Format an analytics table update.
pub fn format_generation(report: &GenerationReport, quiet: bool, use_colors: bool) -> String {
    let colored = colors_enabled(use_colors);
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_generation(&mut out, report, quiet, colored);
    out
}

/// Format one invocation of the continuous job.
pub fn format_job_run(run: &JobRun, quiet: bool, use_colors: bool) -> String {
    let colored = colors_enabled(use_colors);
    let mut out = String::new();
    let _ = write_job_run(&mut out, run, quiet, colored);
    out
}

pub fn format_replication(reports: &[ReplicationReport], use_colors: bool) -> String {
    let colored = colors_enabled(use_colors);
    let mut out = String::new();
    let _ = write_replication(&mut out, reports, colored);
    out
}

pub fn format_outliers(report: &OutlierReport, use_colors: bool) -> String {
    let colored = colors_enabled(use_colors);
    let mut out = String::new();
    let _ = write_outliers(&mut out, report, colored);
    out
}

pub fn format_optimized(queries: &[OptimizedQuery], use_colors: bool) -> String {
    let colored = colors_enabled(use_colors);
    let mut out = String::new();
    for query in queries {
        let _ = write_heading(&mut out, &format!("-- {}", query.source), colored);
        let _ = writeln!(out, "{}\n", query.sql);
    }
    out
}

fn colors_enabled(use_colors: bool) -> bool {
    use_colors && std::io::stdout().is_terminal()
}

fn write_heading(out: &mut String, title: &str, colored: bool) -> fmt::Result {
    if colored {
        writeln!(out, "{}", title.bold())
    } else {
        writeln!(out, "{title}")
    }
}

fn write_generation(
    out: &mut String,
    report: &GenerationReport,
    quiet: bool,
    colored: bool,
) -> fmt::Result {
    let title = if report.latest_update {
        "Latest Analytics Table Update"
    } else {
        "Analytics Table Update"
    };
    write_heading(out, title, colored)?;
    writeln!(out, "{}", "═".repeat(50))?;

    let rows: Vec<TableRow> = report
        .tables
        .iter()
        .map(|t| TableRow {
            table: t.table.clone(),
            table_type: t.table_type.clone(),
            partitions: t.partitions.len(),
            rows: t.rows(),
        })
        .collect();

    if rows.is_empty() {
        writeln!(out, "No tables built")?;
    } else {
        writeln!(out, "{}", Table::new(rows).with(Style::rounded()))?;
    }

    let summary = format!(
        "{} tables | {} rows | {} ms",
        report.tables.len(),
        report.tables.iter().map(|t| t.rows()).sum::<u64>(),
        report.duration_ms
    );
    if colored {
        writeln!(out, "{}", summary.cyan())?;
    } else {
        writeln!(out, "{summary}")?;
    }

    if !quiet && !report.issues.is_empty() {
        writeln!(out)?;
        for issue in &report.issues {
            let label = match issue.severity {
                Severity::Warning => "warning",
                Severity::Info => "info",
            };
            let table = issue
                .table
                .as_deref()
                .map(|t| format!(" [{t}]"))
                .unwrap_or_default();
            if colored {
                match issue.severity {
                    Severity::Warning => write!(out, "{}", label.yellow())?,
                    Severity::Info => write!(out, "{}", label.blue())?,
                }
            } else {
                write!(out, "{label}")?;
            }
            writeln!(out, " {}{table}: {}", issue.code, issue.message)?;
        }
    }
    Ok(())
}

fn write_job_run(out: &mut String, run: &JobRun, quiet: bool, colored: bool) -> fmt::Result {
    let kind = match run.kind {
        JobRunKind::Full => "full",
        JobRunKind::Continuous => "continuous",
    };
    writeln!(out, "Run: {kind}")?;
    writeln!(out, "Next full update: {}", run.watermark.next_full_update)?;
    if let Some(last) = run.watermark.last_full_update {
        writeln!(out, "Last full update: {last}")?;
    }
    writeln!(out)?;

    if let Some(report) = &run.report {
        write_generation(out, report, quiet, colored)?;
    }
    if let Some(error) = &run.error {
        if colored {
            writeln!(out, "{} {error}", "error:".red())?;
        } else {
            writeln!(out, "error: {error}")?;
        }
    }
    Ok(())
}

fn write_replication(out: &mut String, reports: &[ReplicationReport], colored: bool) -> fmt::Result {
    write_heading(out, "Table Replication", colored)?;
    if reports.is_empty() {
        return writeln!(out, "No tables replicated");
    }
    let rows: Vec<ReplicaRow> = reports
        .iter()
        .map(|r| ReplicaRow {
            table: r.table.clone(),
            source: r.source.clone(),
            rows: r.rows,
            duration_ms: r.duration_ms,
        })
        .collect();
    writeln!(out, "{}", Table::new(rows).with(Style::rounded()))
}

fn write_outliers(out: &mut String, report: &OutlierReport, colored: bool) -> fmt::Result {
    let request = &report.request;
    write_heading(out, "Outlier Detection", colored)?;
    writeln!(
        out,
        "Algorithm: {} | threshold {} | order by {} {} | max {}",
        request.algorithm,
        request.threshold,
        request.order_by.header_name(),
        request.sort_order.as_sql(),
        request.max_results
    )?;
    let org_units: Vec<&str> = request.org_units.iter().map(|ou| ou.uid.as_str()).collect();
    writeln!(out, "Organisation units: {}", org_units.join(", "))?;

    let rows: Vec<ElementRow> = request
        .data_elements
        .iter()
        .map(|de| ElementRow {
            uid: de.uid.to_string(),
            name: de.name.clone(),
            value_type: format!("{:?}", de.value_type),
        })
        .collect();
    writeln!(out, "{}", Table::new(rows).with(Style::rounded()))?;
    writeln!(out)?;
    write_heading(out, "SQL", colored)?;
    writeln!(out, "{}", report.sql)
}
