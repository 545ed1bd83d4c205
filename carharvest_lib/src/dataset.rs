//! Dataset CSV and error-log persistence.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::HarvestError;
use crate::record::{TypedRecord, IDENTITY_COLUMNS};
use crate::run::ErrorEntry;

/// Writes identity columns, then `columns` in order, then one row per record.
/// The header is written even when there are no records.
pub fn write_dataset<W: Write>(
    writer: W,
    columns: &[String],
    records: &[TypedRecord],
) -> Result<(), csv::Error> {
    let mut wtr = csv::Writer::from_writer(writer);
    let header = IDENTITY_COLUMNS
        .iter()
        .copied()
        .chain(columns.iter().map(String::as_str));
    wtr.write_record(header)?;

    for record in records {
        let mut row: Vec<String> = record.identity.cells().into();
        row.extend(
            columns
                .iter()
                .map(|c| record.get(c).map(|v| v.to_cell()).unwrap_or_default()),
        );
        wtr.write_record(&row)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_dataset_file(
    path: &Path,
    columns: &[String],
    records: &[TypedRecord],
) -> Result<(), HarvestError> {
    let file = File::create(path).map_err(|source| HarvestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    write_dataset(BufWriter::new(file), columns, records)?;
    tracing::info!("Wrote {} records to {}", records.len(), path.display());
    Ok(())
}

/// Appends entries to the error log, creating it if needed.
pub fn append_error_log(path: &Path, entries: &[ErrorEntry]) -> Result<(), HarvestError> {
    let io_err = |source: std::io::Error| HarvestError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(io_err)?;
    let mut out = BufWriter::new(file);
    for entry in entries {
        writeln!(out, "{}", entry.to_line()).map_err(io_err)?;
    }
    out.flush().map_err(io_err)?;
    Ok(())
}
