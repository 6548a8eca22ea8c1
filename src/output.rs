//! CSV output: record writer, missed-list side file, and citation merge.

use crate::error::{Result, ScopusError};
use crate::record::{Record, CITED_BY_COLUMN, CSV_COLUMNS, EID_COLUMN};
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use tracing::{debug, info};

/// Writes harvested records under the fixed header, once per EID.
pub struct RecordWriter<W: Write> {
    writer: csv::Writer<W>,
    seen: HashSet<String>,
    written: usize,
    duplicates: usize,
}

impl RecordWriter<File> {
    /// Create (truncate) `path` and write the header row.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::create(path.as_ref())?;
        Self::new(file)
    }
}

impl<W: Write> RecordWriter<W> {
    /// Wrap any writer and emit the header row.
    pub fn new(inner: W) -> Result<Self> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(inner);
        writer.write_record(CSV_COLUMNS)?;

        Ok(Self {
            writer,
            seen: HashSet::new(),
            written: 0,
            duplicates: 0,
        })
    }

    /// Write `record` unless its key was already written; returns whether it was.
    pub fn write(&mut self, record: &Record) -> Result<bool> {
        let key = record.dedup_key().to_string();
        if !key.is_empty() && !self.seen.insert(key) {
            debug!(eid = %record.eid, "Skipping duplicate record");
            self.duplicates += 1;
            return Ok(false);
        }
        self.writer.serialize(record)?;
        self.written += 1;
        Ok(true)
    }

    /// Rows written so far (header excluded)
    pub fn written(&self) -> usize {
        self.written
    }

    /// Records skipped as repeats
    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    /// Flush and hand back the inner writer.
    pub fn finish(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| ScopusError::Io(e.into_error()))
    }
}

/// Write one missed item per line; no file is created when nothing was missed.
pub fn write_missed(path: impl AsRef<Path>, missed: &[String]) -> Result<()> {
    let path = path.as_ref();
    if missed.is_empty() {
        debug!(path = %path.display(), "Nothing missed, no side file written");
        return Ok(());
    }

    let mut out = BufWriter::new(File::create(path)?);
    for item in missed {
        writeln!(out, "{}", item)?;
    }
    out.flush()?;
    info!(path = %path.display(), count = missed.len(), "Saved missed list");
    Ok(())
}

/// Row counts from a citation merge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub rows: usize,
    pub updated: usize,
    pub unchanged: usize,
}

/// EIDs listed in an existing output CSV, in row order.
pub fn read_eids<R: Read>(reader: R) -> Result<Vec<String>> {
    let mut rdr = csv::Reader::from_reader(reader);
    let eid_idx = column_index(rdr.headers()?, EID_COLUMN)?;

    let mut eids = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let eid = record.get(eid_idx).unwrap_or_default().trim();
        if !eid.is_empty() {
            eids.push(eid.to_string());
        }
    }
    Ok(eids)
}

/// Rewrite a CSV with fresh cited-by counts.
///
/// Columns are matched by name; rows whose EID is absent from `counts` keep
/// their old value. Output always uses the fixed column set, with columns the
/// input lacks written empty.
pub fn merge_citation_counts<R: Read, W: Write>(
    reader: R,
    writer: W,
    counts: &HashMap<String, u64>,
) -> Result<MergeSummary> {
    let mut rdr = csv::Reader::from_reader(reader);
    let headers = rdr.headers()?.clone();
    let eid_idx = column_index(&headers, EID_COLUMN)?;
    column_index(&headers, CITED_BY_COLUMN)?;

    let source_idx: Vec<Option<usize>> = CSV_COLUMNS
        .iter()
        .map(|col| headers.iter().position(|h| h.trim() == *col))
        .collect();

    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(CSV_COLUMNS)?;

    let mut summary = MergeSummary::default();
    for record in rdr.records() {
        let record = record?;
        let eid = record.get(eid_idx).unwrap_or_default().trim();
        let fresh = counts.get(eid);

        let row: Vec<String> = CSV_COLUMNS
            .iter()
            .zip(&source_idx)
            .map(|(col, idx)| {
                let old = idx.and_then(|i| record.get(i)).unwrap_or_default();
                match fresh {
                    Some(count) if *col == CITED_BY_COLUMN => count.to_string(),
                    _ => old.to_string(),
                }
            })
            .collect();
        wtr.write_record(&row)?;

        summary.rows += 1;
        if fresh.is_some() {
            summary.updated += 1;
        } else {
            summary.unchanged += 1;
        }
    }

    wtr.flush()?;
    Ok(summary)
}

fn column_index(headers: &csv::StringRecord, name: &str) -> Result<usize> {
    headers
        .iter()
        .position(|h| h.trim() == name)
        .ok_or_else(|| ScopusError::Validation(format!("CSV has no '{}' column", name)))
}
