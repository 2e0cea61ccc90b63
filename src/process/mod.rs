// src/process/mod.rs
use anyhow::{bail, Context, Result};
use csv::ReaderBuilder;
use glob::{glob, Pattern};
use rayon::prelude::*;
use std::{
    collections::HashMap,
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument};

pub mod date_parser;
pub mod locations;
pub mod merge;
pub mod utils;

pub use locations::{join_key, load_plant_locations, PlantLocation};
pub use merge::{merge, MergedTable, PlantObservation};

/// Field delimiter of the ONS curtailment files.
pub const ONS_DELIMITER: u8 = b';';

#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    /// File (or files, after concatenation) the rows came from.
    pub source: String,
    pub headers: Vec<String>,
    /// One Vec per data row, same width as `headers`.
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Like `column_index` but a missing column is an error.
    pub fn require_column(&self, name: &str) -> Result<usize> {
        self.column_index(name)
            .with_context(|| format!("column {:?} missing from {}", name, self.source))
    }
}

/// Every `*.csv` in `dir`, sorted by path. Files left over from earlier runs are included.
pub fn list_csv_files(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let pattern = format!("{}/*.csv", Pattern::escape(&dir.to_string_lossy()));
    let mut files = Vec::new();
    for entry in glob(&pattern)? {
        let path = entry?;
        if path.is_file() {
            files.push(path);
        }
    }
    Ok(files)
}

/// Read one delimited file: first row is the header, short rows are padded
/// with empty cells, long rows are an error.
pub fn load_raw_csv(path: impl AsRef<Path>, delimiter: u8) -> Result<RawTable> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("opening {:?}", path))?;
    let mut rdr = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(BufReader::new(file));

    let headers: Vec<String> = rdr
        .byte_headers()
        .with_context(|| format!("reading header of {:?}", path))?
        .iter()
        .map(|h| {
            String::from_utf8_lossy(h)
                .trim_start_matches('\u{feff}')
                .trim()
                .to_string()
        })
        .collect();
    if headers.is_empty() || headers.iter().all(String::is_empty) {
        bail!("{:?} has no header row", path);
    }

    let mut rows = Vec::new();
    for (idx, result) in rdr.byte_records().enumerate() {
        let record =
            result.with_context(|| format!("CSV parse error in {:?} at record {}", path, idx))?;
        if record.len() > headers.len() {
            bail!(
                "{:?} record {} has {} fields, header has {}",
                path,
                idx,
                record.len(),
                headers.len()
            );
        }
        let mut row: Vec<String> = record
            .iter()
            .map(|f| String::from_utf8_lossy(f).into_owned())
            .collect();
        row.resize(headers.len(), String::new());
        rows.push(row);
    }

    debug!(file = %path.display(), rows = rows.len(), "loaded csv");
    Ok(RawTable {
        source: path.display().to_string(),
        headers,
        rows,
    })
}

/// Load every CSV in `dir` with the ONS delimiter, parsed in parallel, returned in listing order.
#[instrument(level = "info", skip(dir), fields(dir = %dir.as_ref().display()))]
pub fn load_directory(dir: impl AsRef<Path>) -> Result<Vec<RawTable>> {
    let files = list_csv_files(&dir)?;
    info!(files = files.len(), "loading local CSVs");
    files
        .par_iter()
        .map(|p| load_raw_csv(p, ONS_DELIMITER))
        .collect()
}

/// Stack tables vertically. Columns are unioned by name in first-seen order;
/// a table lacking a column contributes empty cells for it.
pub fn concat_tables(tables: Vec<RawTable>) -> Result<RawTable> {
    if tables.is_empty() {
        bail!("no CSV tables to concatenate");
    }

    let mut headers: Vec<String> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    for t in &tables {
        for h in &t.headers {
            if !positions.contains_key(h) {
                positions.insert(h.clone(), headers.len());
                headers.push(h.clone());
            }
        }
    }

    let total: usize = tables.iter().map(|t| t.rows.len()).sum();
    let mut rows = Vec::with_capacity(total);
    let mut sources = Vec::with_capacity(tables.len());
    for t in tables {
        let mapping: Vec<usize> = t.headers.iter().map(|h| positions[h]).collect();
        for row in t.rows {
            let mut out = vec![String::new(); headers.len()];
            for (cell, &dst) in row.into_iter().zip(&mapping) {
                out[dst] = cell;
            }
            rows.push(out);
        }
        sources.push(t.source);
    }

    Ok(RawTable {
        source: sources.join(", "),
        headers,
        rows,
    })
}
