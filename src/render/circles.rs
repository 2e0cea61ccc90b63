use anyhow::Result;
use std::path::Path;
use tracing::{info, instrument};

use super::{
    group_means,
    html::{CircleMarker, Layer, LeafletMap},
    latest_month_only, CoordKey,
};
use crate::process::PlantObservation;

pub const CIRCLE_RADIUS: u32 = 10;
pub const CIRCLE_COLOR: &str = "deeppink";

/// Fill opacity of a group: its mean over the largest mean, kept in [0, 1].
pub fn opacity(mean: f64, max_mean: f64) -> f64 {
    if max_mean.is_nan() || max_mean <= 0.0 {
        return 0.0;
    }
    let ratio = mean / max_mean;
    if ratio.is_finite() {
        ratio.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Latest month only, grouped by (latitude, longitude, id_ons), one fixed-size
/// circle per group shaded by its mean generation.
pub fn build_circles(obs: &[PlantObservation]) -> Vec<CircleMarker> {
    let recent = latest_month_only(obs);
    let means = group_means(recent, |o| (CoordKey::of(o), o.id_ons.clone()));
    let max_mean = means.values().copied().fold(f64::NEG_INFINITY, f64::max);

    means
        .into_iter()
        .map(|((k, _id), mean)| CircleMarker {
            lat: k.lat,
            lon: k.lon,
            radius: CIRCLE_RADIUS,
            fill_color: CIRCLE_COLOR.to_string(),
            fill_opacity: opacity(mean, max_mean),
            popup: format!("Variação de Geração: {:?}", mean),
        })
        .collect()
}

#[instrument(level = "info", skip(obs, path), fields(path = %path.as_ref().display()))]
pub fn render_circle_map(obs: &[PlantObservation], path: impl AsRef<Path>) -> Result<usize> {
    let circles = build_circles(obs);
    let n = circles.len();
    info!(groups = n, "shading plants by latest-month mean generation");
    LeafletMap::brazil("Geração média no último mês")
        .with_layer(Layer::Circles { circles })
        .save(path)?;
    Ok(n)
}
