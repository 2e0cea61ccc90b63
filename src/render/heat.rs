use anyhow::Result;
use std::path::Path;
use tracing::instrument;

use super::{
    group_means,
    html::{HeatPoint, Layer, LeafletMap},
    latest_month_only, CoordKey,
};
use crate::process::PlantObservation;

/// Latest month only, mean generation per (latitude, longitude).
pub fn build_heat_points(obs: &[PlantObservation]) -> Vec<HeatPoint> {
    group_means(latest_month_only(obs), CoordKey::of)
        .into_iter()
        .map(|(k, mean)| [k.lat, k.lon, mean])
        .collect()
}

#[instrument(level = "info", skip(obs, path), fields(path = %path.as_ref().display()))]
pub fn render_heat_map(obs: &[PlantObservation], path: impl AsRef<Path>) -> Result<usize> {
    let points = build_heat_points(obs);
    let n = points.len();
    LeafletMap::brazil("Mapa de calor da geração")
        .with_layer(Layer::Heat { points })
        .save(path)?;
    Ok(n)
}
