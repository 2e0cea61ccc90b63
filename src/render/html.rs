// src/render/html.rs
use anyhow::{Context, Result};
use serde::Serialize;
use std::{fs, path::Path};
use tracing::info;

/// Initial view: Brasília, whole country visible.
pub const BRAZIL_CENTER: [f64; 2] = [-15.793889, -47.882778];
pub const BRAZIL_ZOOM: u8 = 4;

const LEAFLET_CSS: &str = "https://cdn.jsdelivr.net/npm/leaflet@1.9.3/dist/leaflet.css";
const LEAFLET_JS: &str = "https://cdn.jsdelivr.net/npm/leaflet@1.9.3/dist/leaflet.js";
const LEAFLET_HEAT_JS: &str = "https://cdn.jsdelivr.net/npm/leaflet.heat@0.2.0/dist/leaflet-heat.js";
const OSM_TILES: &str = "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png";
const OSM_ATTRIBUTION: &str =
    "&copy; <a href=\"https://www.openstreetmap.org/copyright\">OpenStreetMap</a> contributors";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Marker {
    pub lat: f64,
    pub lon: f64,
    pub popup: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircleMarker {
    pub lat: f64,
    pub lon: f64,
    pub radius: u32,
    pub fill_color: String,
    pub fill_opacity: f64,
    pub popup: String,
}

/// `[lat, lon, weight]`
pub type HeatPoint = [f64; 3];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Layer {
    Markers { markers: Vec<Marker> },
    Circles { circles: Vec<CircleMarker> },
    Heat { points: Vec<HeatPoint> },
}

/// A standalone Leaflet page over OpenStreetMap tiles.
#[derive(Debug, Clone, Serialize)]
pub struct LeafletMap {
    title: String,
    center: [f64; 2],
    zoom: u8,
    tiles: &'static str,
    attribution: &'static str,
    layers: Vec<Layer>,
}

impl LeafletMap {
    pub fn brazil(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            center: BRAZIL_CENTER,
            zoom: BRAZIL_ZOOM,
            tiles: OSM_TILES,
            attribution: OSM_ATTRIBUTION,
            layers: Vec::new(),
        }
    }

    pub fn with_layer(mut self, layer: Layer) -> Self {
        self.layers.push(layer);
        self
    }

    fn needs_heat_plugin(&self) -> bool {
        self.layers.iter().any(|l| matches!(l, Layer::Heat { .. }))
    }

    pub fn to_html(&self) -> Result<String> {
        // "</" inside the inline JSON would close the script element
        let data = serde_json::to_string(self)
            .context("serializing map data")?
            .replace("</", "<\\/");

        let mut scripts = format!("<script src=\"{}\"></script>", LEAFLET_JS);
        if self.needs_heat_plugin() {
            scripts.push_str(&format!("\n<script src=\"{}\"></script>", LEAFLET_HEAT_JS));
        }

        Ok(PAGE_TEMPLATE
            .replace("{{TITLE}}", &escape_text(&self.title))
            .replace("{{CSS}}", LEAFLET_CSS)
            .replace("{{SCRIPTS}}", &scripts)
            .replace("{{DATA}}", &data))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let html = self.to_html()?;
        fs::write(path, html).with_context(|| format!("writing map {:?}", path))?;
        info!(file = %path.display(), layers = self.layers.len(), "saved map");
        Ok(())
    }
}

fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

const PAGE_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8" />
<meta name="viewport" content="width=device-width, initial-scale=1.0" />
<title>{{TITLE}}</title>
<link rel="stylesheet" href="{{CSS}}" />
{{SCRIPTS}}
<style>html, body, #map { width: 100%; height: 100%; margin: 0; padding: 0; }</style>
</head>
<body>
<div id="map"></div>
<script>
const spec = {{DATA}};
const map = L.map("map").setView(spec.center, spec.zoom);
L.tileLayer(spec.tiles, { attribution: spec.attribution, maxZoom: 18 }).addTo(map);

function popup(text) {
  const el = document.createElement("div");
  el.textContent = text;
  return el;
}

for (const layer of spec.layers) {
  if (layer.kind === "markers") {
    for (const m of layer.markers) {
      L.marker([m.lat, m.lon]).bindPopup(popup(m.popup)).addTo(map);
    }
  } else if (layer.kind === "circles") {
    for (const c of layer.circles) {
      L.circleMarker([c.lat, c.lon], {
        radius: c.radius,
        stroke: false,
        fill: true,
        fillColor: c.fill_color,
        fillOpacity: c.fill_opacity,
      }).bindPopup(popup(c.popup)).addTo(map);
    }
  } else if (layer.kind === "heat") {
    L.heatLayer(layer.points).addTo(map);
  }
}
</script>
</body>
</html>
"#;
