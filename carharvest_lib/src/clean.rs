//! Post-processing of a harvested dataset into an analysis-ready copy.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::record::IDENTITY_COLUMNS;

#[derive(Error, Debug)]
pub enum CleanError {
    #[error("failed to open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("dataset has no header row")]
    MissingHeader,
}

/// Which columns and rows `clean_dataset` removes.
#[derive(Debug, Clone)]
pub struct CleanOptions {
    pub drop_columns: Vec<String>,
    /// Drop rows whose only non-empty cells are identity columns.
    pub drop_identity_only: bool,
    /// Rows with this column empty, unparsable or below `price_floor` are dropped.
    /// Skipped when the column is not in the dataset.
    pub price_column: Option<String>,
    pub price_floor: f64,
}

impl Default for CleanOptions {
    fn default() -> Self {
        Self {
            drop_columns: [
                "Multimedia_System",
                "Fog_Lights",
                "Touch_Screen",
                "Alarm_or_Anti_Theft_System",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            drop_identity_only: true,
            price_column: Some("Official_Price_EGP".to_string()),
            price_floor: 1000.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CleanReport {
    pub columns_before: usize,
    pub columns_after: usize,
    pub dropped_columns: Vec<String>,
    pub rows_before: usize,
    pub rows_after: usize,
    pub identity_only_rows: usize,
    pub price_rows: usize,
}

/// Copies a dataset from `reader` to `writer`, applying `opts`.
pub fn clean_dataset<R: Read, W: Write>(
    reader: R,
    writer: W,
    opts: &CleanOptions,
) -> Result<CleanReport, CleanError> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.trim().to_string()).collect();
    if headers.is_empty() {
        return Err(CleanError::MissingHeader);
    }

    let mut report = CleanReport {
        columns_before: headers.len(),
        ..Default::default()
    };

    let keep: Vec<usize> = (0..headers.len())
        .filter(|&i| !opts.drop_columns.contains(&headers[i]))
        .collect();
    report.dropped_columns = headers
        .iter()
        .filter(|h| opts.drop_columns.contains(h))
        .cloned()
        .collect();
    report.columns_after = keep.len();

    let is_identity = |i: usize| IDENTITY_COLUMNS.contains(&headers[i].as_str());
    let price_idx = opts
        .price_column
        .as_ref()
        .and_then(|col| keep.iter().copied().find(|&i| &headers[i] == col));
    if price_idx.is_none() {
        if let Some(col) = &opts.price_column {
            tracing::info!("Column {} not found, skipping price filter", col);
        }
    }

    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(keep.iter().map(|&i| headers[i].as_str()))?;

    for row in rdr.records() {
        let row = row?;
        report.rows_before += 1;
        let cell = |i: usize| row.get(i).unwrap_or("").trim();

        if opts.drop_identity_only
            && keep
                .iter()
                .filter(|&&i| !is_identity(i))
                .all(|&i| is_blank(cell(i)))
        {
            report.identity_only_rows += 1;
            continue;
        }

        if let Some(i) = price_idx {
            let price = cell(i).replace(',', "").parse::<f64>().ok();
            if !price.is_some_and(|p| p >= opts.price_floor) {
                report.price_rows += 1;
                continue;
            }
        }

        wtr.write_record(keep.iter().map(|&i| cell(i)))?;
        report.rows_after += 1;
    }
    wtr.flush().map_err(csv::Error::from)?;
    Ok(report)
}

/// `clean_dataset` between two files.
pub fn clean_file(
    input: &Path,
    output: &Path,
    opts: &CleanOptions,
) -> Result<CleanReport, CleanError> {
    let open_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source: std::io::Error| CleanError::Io { path, source }
    };
    let src = File::open(input).map_err(open_err(input))?;
    let dst = File::create(output).map_err(open_err(output))?;
    let report = clean_dataset(BufReader::new(src), BufWriter::new(dst), opts)?;
    tracing::info!(
        "Cleaned {}: {} -> {} rows, {} -> {} columns",
        input.display(),
        report.rows_before,
        report.rows_after,
        report.columns_before,
        report.columns_after
    );
    Ok(report)
}

/// Empty cells and unchecked equipment flags carry no information.
fn is_blank(cell: &str) -> bool {
    cell.is_empty() || cell == "false"
}
