// src/render/mod.rs
//! The three map passes over merged observations. Each pass is independent
//! and writes one standalone HTML file.

use std::{
    cmp::Ordering,
    collections::BTreeMap,
};

use crate::process::{date_parser::month_of, PlantObservation};

pub mod circles;
pub mod heat;
pub mod html;
pub mod markers;

pub use circles::{build_circles, render_circle_map};
pub use heat::{build_heat_points, render_heat_map};
pub use markers::{build_markers, render_marker_map};

/// (latitude, longitude) usable as an ordered map key.
#[derive(Debug, Clone, Copy)]
pub struct CoordKey {
    pub lat: f64,
    pub lon: f64,
}

impl CoordKey {
    pub fn of(o: &PlantObservation) -> Self {
        Self {
            lat: o.latitude,
            lon: o.longitude,
        }
    }
}

impl PartialEq for CoordKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for CoordKey {}

impl PartialOrd for CoordKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CoordKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.lat
            .total_cmp(&other.lat)
            .then_with(|| self.lon.total_cmp(&other.lon))
    }
}

/// Month of the latest timestamp among `obs`.
pub fn latest_month(obs: &[PlantObservation]) -> Option<(i32, u32)> {
    obs.iter().filter_map(|o| o.instant_ms).max().and_then(month_of)
}

/// Observations whose timestamp falls in the latest month.
pub fn latest_month_only(obs: &[PlantObservation]) -> Vec<&PlantObservation> {
    let Some(month) = latest_month(obs) else {
        return Vec::new();
    };
    obs.iter()
        .filter(|o| o.instant_ms.and_then(month_of) == Some(month))
        .collect()
}

/// Running mean that skips missing values.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct Mean {
    sum: f64,
    count: usize,
}

impl Mean {
    pub(crate) fn push(&mut self, v: Option<f64>) {
        if let Some(v) = v {
            self.sum += v;
            self.count += 1;
        }
    }

    pub(crate) fn value(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

/// Mean `val_geracao` per key, groups without any value dropped.
pub(crate) fn group_means<'a, K: Ord>(
    obs: impl IntoIterator<Item = &'a PlantObservation>,
    key: impl Fn(&PlantObservation) -> K,
) -> BTreeMap<K, f64> {
    let mut groups: BTreeMap<K, Mean> = BTreeMap::new();
    for o in obs {
        groups.entry(key(o)).or_default().push(o.val_geracao);
    }
    groups
        .into_iter()
        .filter_map(|(k, m)| m.value().map(|v| (k, v)))
        .collect()
}
