use anyhow::Result;
use std::{collections::BTreeMap, path::Path};
use tracing::instrument;

use super::{
    html::{Layer, LeafletMap, Marker},
    CoordKey,
};
use crate::process::PlantObservation;

/// One marker per distinct coordinate pair, labelled with the plant name of
/// the first observation at that spot.
pub fn build_markers(obs: &[PlantObservation]) -> Vec<Marker> {
    let mut first_name: BTreeMap<CoordKey, &str> = BTreeMap::new();
    for o in obs {
        first_name.entry(CoordKey::of(o)).or_insert(&o.nom_usina);
    }
    first_name
        .into_iter()
        .map(|(k, name)| Marker {
            lat: k.lat,
            lon: k.lon,
            popup: name.to_string(),
        })
        .collect()
}

#[instrument(level = "info", skip(obs, path), fields(path = %path.as_ref().display()))]
pub fn render_marker_map(obs: &[PlantObservation], path: impl AsRef<Path>) -> Result<usize> {
    let markers = build_markers(obs);
    let n = markers.len();
    LeafletMap::brazil("Usinas eólicas")
        .with_layer(Layer::Markers { markers })
        .save(path)?;
    Ok(n)
}
