// src/process/merge.rs
use anyhow::{anyhow, bail, Context, Result};
use arrow::{
    array::{
        Array, ArrayRef, Float64Array, Float64Builder, StringArray, TimestampMillisecondArray,
        TimestampMillisecondBuilder,
    },
    datatypes::{DataType, Field, Schema, TimeUnit},
    record_batch::RecordBatch,
    util::pretty::pretty_format_batches,
};
use chrono::DateTime;
use std::{collections::HashMap, fmt, sync::Arc};
use tracing::{info, instrument, warn};

use crate::process::{date_parser, locations::PlantLocation, utils, RawTable};

pub const INSTANT_COLUMN: &str = "din_instante";
pub const PLANT_COLUMN: &str = "id_ons";
pub const GENERATION_COLUMN: &str = "val_geracao";
pub const NAME_COLUMN: &str = "nom_usina";
pub const LATITUDE: &str = "latitude";
pub const LONGITUDE: &str = "longitude";

/// The ONS rows left-joined with plant coordinates.
///
/// Source columns keep their order and stay `Utf8`, except `din_instante`
/// (`Timestamp(ms)`) and `val_geracao` (`Float64`). `latitude`/`longitude`
/// are appended as nullable `Float64`.
#[derive(Debug, Clone)]
pub struct MergedTable {
    pub batch: RecordBatch,
}

/// Typed view of one merged row that has both coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct PlantObservation {
    pub id_ons: String,
    pub nom_usina: String,
    pub instant_ms: Option<i64>,
    pub val_geracao: Option<f64>,
    pub latitude: f64,
    pub longitude: f64,
}

/// Left join `raw` with `plants` on `id_ons`.
///
/// Row count and order of `raw` are preserved. When the reference table holds
/// the same key twice, the first row wins.
#[instrument(level = "info", skip_all, fields(rows = raw.rows.len(), plants = plants.len()))]
pub fn merge(raw: RawTable, plants: &[PlantLocation]) -> Result<MergedTable> {
    let instant_idx = raw.require_column(INSTANT_COLUMN)?;
    let plant_idx = raw.require_column(PLANT_COLUMN)?;
    let generation_idx = raw.require_column(GENERATION_COLUMN)?;
    raw.require_column(NAME_COLUMN)?;
    for name in [LATITUDE, LONGITUDE] {
        if raw.column_index(name).is_some() {
            bail!("source data already has a {:?} column", name);
        }
    }

    let mut lookup: HashMap<&str, &PlantLocation> = HashMap::with_capacity(plants.len());
    let mut duplicates = 0usize;
    for p in plants {
        if lookup.contains_key(p.id_ons.as_str()) {
            duplicates += 1;
        } else {
            lookup.insert(p.id_ons.as_str(), p);
        }
    }
    if duplicates > 0 {
        warn!(duplicates, "reference table repeats plant ids; keeping first occurrence");
    }

    let mut fields = Vec::with_capacity(raw.headers.len() + 2);
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(raw.headers.len() + 2);

    for (col, name) in raw.headers.iter().enumerate() {
        if col == instant_idx {
            let mut b = TimestampMillisecondBuilder::with_capacity(raw.rows.len());
            for (row_idx, row) in raw.rows.iter().enumerate() {
                let cell = utils::clean_str(&row[col]);
                if cell.is_empty() {
                    b.append_null();
                    continue;
                }
                let ts = date_parser::parse_timestamp_millis(&cell).ok_or_else(|| {
                    anyhow!("row {}: cannot parse {} {:?}", row_idx, INSTANT_COLUMN, cell)
                })?;
                b.append_value(ts);
            }
            fields.push(Field::new(
                name,
                DataType::Timestamp(TimeUnit::Millisecond, None),
                true,
            ));
            columns.push(Arc::new(b.finish()));
        } else if col == generation_idx {
            let mut b = Float64Builder::with_capacity(raw.rows.len());
            for (row_idx, row) in raw.rows.iter().enumerate() {
                let v = utils::parse_f64_cell(&row[col])
                    .map_err(|e| anyhow!("row {}: {}: {}", row_idx, GENERATION_COLUMN, e))?;
                b.append_option(v);
            }
            fields.push(Field::new(name, DataType::Float64, true));
            columns.push(Arc::new(b.finish()));
        } else {
            let arr: StringArray = raw
                .rows
                .iter()
                .map(|row| Some(row[col].as_str()).filter(|s| !s.is_empty()))
                .collect();
            fields.push(Field::new(name, DataType::Utf8, true));
            columns.push(Arc::new(arr));
        }
    }

    let mut lat = Float64Builder::with_capacity(raw.rows.len());
    let mut lon = Float64Builder::with_capacity(raw.rows.len());
    let mut matched = 0usize;
    for row in &raw.rows {
        match lookup.get(utils::clean_str(&row[plant_idx]).as_str()) {
            Some(p) => {
                matched += 1;
                lat.append_option(p.latitude);
                lon.append_option(p.longitude);
            }
            None => {
                lat.append_null();
                lon.append_null();
            }
        }
    }
    fields.push(Field::new(LATITUDE, DataType::Float64, true));
    fields.push(Field::new(LONGITUDE, DataType::Float64, true));
    columns.push(Arc::new(lat.finish()));
    columns.push(Arc::new(lon.finish()));

    let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)
        .context("building merged record batch")?;
    info!(rows = batch.num_rows(), matched, "merged with plant locations");
    Ok(MergedTable { batch })
}

/// Row/column overview logged after the merge.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedSummary {
    pub rows: usize,
    pub columns: Vec<(String, DataType, usize)>,
    pub with_coordinates: usize,
    pub first_instant_ms: Option<i64>,
    pub last_instant_ms: Option<i64>,
}

impl fmt::Display for MergedSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} rows, {} with coordinates", self.rows, self.with_coordinates)?;
        for (name, ty, non_null) in &self.columns {
            writeln!(f, "  {:<24} {:>10} non-null  {}", name, non_null, ty)?;
        }
        let show = |ms: Option<i64>| {
            ms.and_then(DateTime::from_timestamp_millis)
                .map(|d| d.naive_utc().to_string())
                .unwrap_or_else(|| "-".into())
        };
        write!(
            f,
            "  {} range: {} .. {}",
            INSTANT_COLUMN,
            show(self.first_instant_ms),
            show(self.last_instant_ms)
        )
    }
}

impl MergedTable {
    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    fn f64_column(&self, name: &str) -> Result<&Float64Array> {
        self.batch
            .column_by_name(name)
            .with_context(|| format!("merged table has no {:?} column", name))?
            .as_any()
            .downcast_ref::<Float64Array>()
            .with_context(|| format!("column {:?} is not Float64", name))
    }

    fn str_column(&self, name: &str) -> Result<&StringArray> {
        self.batch
            .column_by_name(name)
            .with_context(|| format!("merged table has no {:?} column", name))?
            .as_any()
            .downcast_ref::<StringArray>()
            .with_context(|| format!("column {:?} is not Utf8", name))
    }

    fn instant_column(&self) -> Result<&TimestampMillisecondArray> {
        self.batch
            .column_by_name(INSTANT_COLUMN)
            .with_context(|| format!("merged table has no {:?} column", INSTANT_COLUMN))?
            .as_any()
            .downcast_ref::<TimestampMillisecondArray>()
            .with_context(|| format!("column {:?} is not a timestamp", INSTANT_COLUMN))
    }

    pub fn summary(&self) -> Result<MergedSummary> {
        let schema = self.batch.schema();
        let columns = schema
            .fields()
            .iter()
            .zip(self.batch.columns())
            .map(|(f, c)| (f.name().clone(), f.data_type().clone(), c.len() - c.null_count()))
            .collect();

        let lat = self.f64_column(LATITUDE)?;
        let lon = self.f64_column(LONGITUDE)?;
        let with_coordinates = (0..self.num_rows())
            .filter(|&i| lat.is_valid(i) && lon.is_valid(i))
            .count();

        let instants = self.instant_column()?;
        Ok(MergedSummary {
            rows: self.num_rows(),
            columns,
            with_coordinates,
            first_instant_ms: instants.iter().flatten().min(),
            last_instant_ms: instants.iter().flatten().max(),
        })
    }

    /// Pretty-printed table of the first `n` rows.
    pub fn head(&self, n: usize) -> Result<String> {
        let n = n.min(self.num_rows());
        Ok(pretty_format_batches(&[self.batch.slice(0, n)])?.to_string())
    }

    /// Pretty-printed table of the last `n` rows.
    pub fn tail(&self, n: usize) -> Result<String> {
        let n = n.min(self.num_rows());
        let start = self.num_rows() - n;
        Ok(pretty_format_batches(&[self.batch.slice(start, n)])?.to_string())
    }

    /// Rows with both latitude and longitude, in table order.
    pub fn observations(&self) -> Result<Vec<PlantObservation>> {
        let lat = self.f64_column(LATITUDE)?;
        let lon = self.f64_column(LONGITUDE)?;
        let ids = self.str_column(PLANT_COLUMN)?;
        let names = self.str_column(NAME_COLUMN)?;
        let generation = self.f64_column(GENERATION_COLUMN)?;
        let instants = self.instant_column()?;

        let mut out = Vec::new();
        for i in 0..self.num_rows() {
            if lat.is_null(i) || lon.is_null(i) {
                continue;
            }
            out.push(PlantObservation {
                id_ons: ids.is_valid(i).then(|| ids.value(i).to_string()).unwrap_or_default(),
                nom_usina: names
                    .is_valid(i)
                    .then(|| names.value(i).to_string())
                    .unwrap_or_default(),
                instant_ms: instants.is_valid(i).then(|| instants.value(i)),
                val_geracao: generation.is_valid(i).then(|| generation.value(i)),
                latitude: lat.value(i),
                longitude: lon.value(i),
            });
        }
        Ok(out)
    }
}
