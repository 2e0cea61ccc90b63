// src/process/locations.rs
use anyhow::{anyhow, Context, Result};
use std::path::Path;
use tracing::info;

use crate::process::{load_raw_csv, utils};

pub const PLANT_ID_COLUMN: &str = "id_usina";
pub const LATITUDE_COLUMN: &str = "Val Latitude Sindat";
pub const LONGITUDE_COLUMN: &str = "Val Longitude Sindat";

/// Prefix turning a reference `id_usina` into the operator's `id_ons`.
pub const JOIN_KEY_PREFIX: &str = "CJU_";

/// One row of the plant geolocation reference table.
#[derive(Debug, Clone, PartialEq)]
pub struct PlantLocation {
    pub id_usina: String,
    /// `CJU_` + `id_usina`
    pub id_ons: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

pub fn join_key(id_usina: &str) -> String {
    format!("{}{}", JOIN_KEY_PREFIX, id_usina)
}

/// Load the comma-delimited reference table. A missing column or an
/// unparsable coordinate is an error.
pub fn load_plant_locations(path: impl AsRef<Path>) -> Result<Vec<PlantLocation>> {
    let path = path.as_ref();
    let table = load_raw_csv(path, b',')
        .with_context(|| format!("loading plant reference table {:?}", path))?;

    let id_col = table.require_column(PLANT_ID_COLUMN)?;
    let lat_col = table.require_column(LATITUDE_COLUMN)?;
    let lon_col = table.require_column(LONGITUDE_COLUMN)?;

    let mut plants = Vec::with_capacity(table.rows.len());
    for (idx, row) in table.rows.iter().enumerate() {
        let coord = |col: usize, name: &str| {
            utils::parse_f64_cell(&row[col])
                .map_err(|e| anyhow!("{:?} row {} column {:?}: {}", path, idx, name, e))
        };
        let id_usina = row[id_col].trim().to_string();
        plants.push(PlantLocation {
            id_ons: join_key(&id_usina),
            id_usina,
            latitude: coord(lat_col, LATITUDE_COLUMN)?,
            longitude: coord(lon_col, LONGITUDE_COLUMN)?,
        });
    }

    info!(plants = plants.len(), file = %path.display(), "loaded plant locations");
    Ok(plants)
}
