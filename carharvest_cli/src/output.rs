use carharvest_lib::{CleanReport, FieldMapping, HarvestSummary};
use serde::Serialize;
use tabled::{Table, Tabled};

#[derive(Clone, Debug)]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(Tabled, Serialize)]
struct MetricRow {
    #[tabled(rename = "Metric")]
    metric: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

#[derive(Tabled, Serialize)]
struct SchemaRow {
    #[tabled(rename = "#")]
    position: usize,
    #[tabled(rename = "Column")]
    column: String,
    #[tabled(rename = "Label")]
    label: String,
    #[tabled(rename = "Type")]
    data_type: String,
    #[tabled(rename = "Segment")]
    segment: String,
    #[tabled(rename = "Fallback")]
    fallback: String,
}

fn metric(metric: &'static str, value: impl ToString) -> MetricRow {
    MetricRow {
        metric,
        value: value.to_string(),
    }
}

fn build_summary_rows(summary: &HarvestSummary) -> Vec<MetricRow> {
    let mut rows = vec![
        metric("Brands", summary.brands),
        metric("Models", summary.models),
        metric("Trims attempted", summary.trims_attempted),
        metric("Trims admitted", summary.trims_admitted),
        metric("Duplicates skipped", summary.duplicates_skipped),
        metric("Field warnings", summary.field_warnings),
        metric("Permanent skips", summary.permanent_skips),
        metric("Elapsed", format!("{:.1}s", summary.elapsed_secs)),
    ];
    if let Some(requests) = &summary.requests {
        rows.extend([
            metric("Requests", requests.requests_made),
            metric("Transient failures", requests.requests_transient),
            metric("Retries exhausted", requests.retries_exhausted),
            metric("Backoff", format!("{:.1}s", requests.total_backoff_secs)),
        ]);
    }
    rows
}

fn build_schema_rows(mapping: &FieldMapping) -> Vec<SchemaRow> {
    mapping
        .rules()
        .iter()
        .enumerate()
        .map(|(i, rule)| SchemaRow {
            position: i + 1,
            column: rule.output_column.clone(),
            label: rule.source_label.clone(),
            data_type: rule.data_type.to_string(),
            segment: rule.segment.map(|s| s.to_string()).unwrap_or_default(),
            fallback: rule.fallback.clone().unwrap_or_default(),
        })
        .collect()
}

fn build_clean_rows(report: &CleanReport) -> Vec<MetricRow> {
    vec![
        metric("Columns before", report.columns_before),
        metric("Columns after", report.columns_after),
        metric("Dropped columns", report.dropped_columns.join(", ")),
        metric("Rows before", report.rows_before),
        metric("Identity-only rows removed", report.identity_only_rows),
        metric("Price rows removed", report.price_rows),
        metric("Rows after", report.rows_after),
    ]
}

pub fn print_summary_table(summary: &HarvestSummary) {
    println!("{}", Table::new(build_summary_rows(summary)));
}

pub fn print_schema_table(mapping: &FieldMapping) {
    println!("{}", Table::new(build_schema_rows(mapping)));
}

pub fn print_clean_table(report: &CleanReport) {
    println!("{}", Table::new(build_clean_rows(report)));
}

// -- JSON output --

pub fn print_json<T: serde::Serialize>(data: &T) {
    match serde_json::to_string_pretty(data) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to serialize to JSON: {}", e),
    }
}
