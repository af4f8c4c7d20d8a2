//! CSV writer for generated datasets.
//!
//! Rows are sorted chronologically before writing. The sort is stable, so
//! events sharing a timestamp keep the order they were emitted in.

use crate::error::GenResult;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{fs, io, path::Path};

/// A row type with a fixed column order.
pub trait CsvSchema {
    /// Column names, in the same order as the row's serialized fields.
    const HEADERS: &'static [&'static str];
}

/// A row that can be placed on the timeline.
pub trait TimedRow {
    fn occurred_at(&self) -> DateTime<Utc>;
}

/// References to `rows` in chronological order.
pub fn chronological<R: TimedRow>(rows: &[R]) -> Vec<&R> {
    let mut sorted: Vec<&R> = rows.iter().collect();
    sorted.sort_by_key(|r| r.occurred_at());
    sorted
}

/// Sort and serialize `rows` into `writer`. The header is always written,
/// even for an empty dataset. Returns the number of data rows.
pub fn write_rows<W, R>(writer: W, rows: &[R]) -> GenResult<usize>
where
    W: io::Write,
    R: CsvSchema + TimedRow + Serialize,
{
    let mut csv = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    csv.write_record(R::HEADERS)?;
    let sorted = chronological(rows);
    for row in &sorted {
        csv.serialize(row)?;
    }
    csv.flush()?;
    Ok(sorted.len())
}

/// Write `rows` to `path`, creating missing parent directories.
pub fn write_csv<R>(path: &Path, rows: &[R]) -> GenResult<usize>
where
    R: CsvSchema + TimedRow + Serialize,
{
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file = fs::File::create(path)?;
    let written = write_rows(io::BufWriter::new(file), rows)?;
    log::info!("export: wrote {written} rows to {}", path.display());
    Ok(written)
}
