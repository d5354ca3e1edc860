//! Text and JSON rendering of a [`Report`].

use std::fmt::Write as _;

use clap::ValueEnum;

use pgpulse_core::fmt::{format_latency, format_timestamp, normalize_query, truncate};
use pgpulse_core::{MetricValue, RowSet, Snapshot};

use crate::report::{Report, Section};

/// Widest cell in a table column; longer text is cut.
const MAX_CELL_CHARS: usize = 60;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

pub fn render(report: &Report, format: OutputFormat) -> Result<String, serde_json::Error> {
    match format {
        OutputFormat::Text => Ok(render_text(report)),
        OutputFormat::Json => serde_json::to_string(report),
    }
}

pub fn render_text(report: &Report) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "== {} | tick {} | {} ==",
        report.target,
        report.tick,
        format_timestamp(&report.taken_at)
    );

    let status = &report.status;
    match (&status.error, status.latency_ms) {
        (None, Some(ms)) => {
            let latency = std::time::Duration::from_secs_f64(ms / 1000.0);
            let _ = writeln!(
                out,
                "status: {} [{}] latency {}",
                status.state,
                status.color,
                format_latency(latency)
            );
        }
        (Some(err), _) => {
            let _ = writeln!(out, "status: {} [{}] {}", status.state, status.color, err);
        }
        (None, None) => {
            let _ = writeln!(out, "status: {} [{}]", status.state, status.color);
        }
    }

    for section in &report.snapshots {
        write_snapshot(&mut out, section);
    }
    for section in &report.tables {
        write_table(&mut out, section);
    }

    if let Some(probes) = &report.probes {
        let _ = writeln!(out, "-- probes --");
        for probe in probes {
            let result = match (&probe.error, probe.elapsed_ms) {
                (Some(err), _) => format!("failed: {}", err),
                (None, Some(ms)) => format_latency(std::time::Duration::from_secs_f64(ms / 1000.0)),
                (None, None) => "-".to_string(),
            };
            let _ = writeln!(out, "  {:<20} {}", probe.name, result);
        }
    }
    out
}

fn write_snapshot(out: &mut String, section: &Section<Snapshot>) {
    match section.color {
        Some(color) => {
            let _ = writeln!(out, "-- {} [{}] --", section.category, color);
        }
        None => {
            let _ = writeln!(out, "-- {} --", section.category);
        }
    }
    match (&section.data, &section.error) {
        (Some(snapshot), _) => {
            let width = snapshot.names().map(str::len).max().unwrap_or(0);
            for metric in snapshot.metrics() {
                let _ = writeln!(out, "  {:<width$}  {}", metric.name, metric.value, width = width);
            }
        }
        (None, Some(err)) => {
            let _ = writeln!(out, "  unavailable: {}", err);
        }
        (None, None) => {}
    }
}

fn write_table(out: &mut String, section: &Section<RowSet>) {
    let Some(rows) = &section.data else {
        let _ = writeln!(out, "-- {} --", section.category);
        if let Some(err) = &section.error {
            let _ = writeln!(out, "  unavailable: {}", err);
        }
        return;
    };

    let _ = writeln!(out, "-- {} ({} rows) --", section.category, rows.len());
    if rows.is_empty() {
        return;
    }

    let header: Vec<String> = rows.columns().iter().map(|c| c.to_string()).collect();
    let cells: Vec<Vec<String>> = rows
        .rows()
        .iter()
        .map(|row| row.iter().map(cell).collect())
        .collect();

    let mut widths: Vec<usize> = header.iter().map(|h| h.chars().count()).collect();
    for row in &cells {
        for (w, c) in widths.iter_mut().zip(row) {
            *w = (*w).max(c.chars().count());
        }
    }

    write_row(out, &header, &widths);
    for row in &cells {
        write_row(out, row, &widths);
    }
}

fn write_row(out: &mut String, row: &[String], widths: &[usize]) {
    let line: Vec<String> = row
        .iter()
        .zip(widths)
        .map(|(c, w)| format!("{:<w$}", c, w = *w))
        .collect();
    let _ = writeln!(out, "  {}", line.join("  ").trim_end());
}

fn cell(value: &MetricValue) -> String {
    match value {
        MetricValue::Text(s) => truncate(&normalize_query(s), MAX_CELL_CHARS),
        other => other.compact(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::collect;
    use pgpulse_core::mock::MockConnector;
    use pgpulse_core::{Category, Monitor};

    fn typical_report(categories: &[Category], probes: bool) -> Report {
        let mut monitor = Monitor::new(MockConnector::typical_server());
        collect(&mut monitor, 7, categories, probes)
    }

    #[test]
    fn text_has_status_and_metric_lines() {
        let text = render_text(&typical_report(
            &[Category::Connections, Category::DatabaseSize],
            false,
        ));
        assert!(text.starts_with("== mock:5432/app | tick 7 |"));
        assert!(text.contains("status: connected [ok] latency"));
        assert!(text.contains("-- connections [ok] --"));
        assert!(text.contains("usage"));
        assert!(text.contains("12.0%"));
        assert!(text.contains("512.0 MiB"));
    }

    #[test]
    fn text_tables_are_aligned() {
        let text = render_text(&typical_report(&[Category::IndexUsage], false));
        assert!(text.contains("-- index_usage (3 rows) --"));
        let lines: Vec<&str> = text
            .lines()
            .skip_while(|l| !l.starts_with("-- index_usage"))
            .skip(1)
            .collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].trim_start().starts_with("schema_name"));
        // Column two starts at the same offset on every line.
        let offset = lines[0].find("table_name").expect("header");
        for line in &lines[1..] {
            assert_eq!(&line[offset..offset + 6], "orders");
        }
        assert!(lines[3].contains("16.0M"));
    }

    #[test]
    fn text_probes_listed() {
        let text = render_text(&typical_report(&[], true));
        assert!(text.contains("-- probes --"));
        assert!(text.contains("simple_select"));
        assert!(text.contains("table_count"));
    }

    #[test]
    fn unavailable_server_renders_without_data() {
        let mut monitor = Monitor::new(MockConnector::unreachable());
        let report = collect(&mut monitor, 1, &[Category::Connections, Category::Sessions], false);
        let text = render_text(&report);
        assert!(text.contains("status: unavailable [critical]"));
        assert!(text.contains("-- connections [critical] --"));
        assert!(text.contains("  unavailable: "));
    }

    #[test]
    fn json_is_one_object() {
        let report = typical_report(&[Category::CacheHitRatio, Category::Sessions], false);
        let json = render(&report, OutputFormat::Json).expect("serializable");
        assert!(!json.contains('\n'));

        let value: serde_json::Value = serde_json::from_str(&json).expect("valid json");
        assert_eq!(value["tick"], 7);
        assert_eq!(value["status"]["state"], "connected");
        assert_eq!(value["snapshots"][0]["category"], "cache_hit_ratio");
        assert_eq!(value["snapshots"][0]["color"], "ok");
        assert_eq!(value["tables"][0]["data"]["category"], "sessions");
        assert_eq!(value["tables"][0]["data"]["rows"].as_array().map(Vec::len), Some(2));
        assert!(value.get("probes").is_none());
    }
}
