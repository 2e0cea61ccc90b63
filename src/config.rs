// src/config.rs

use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::info;

/// ONS dataset page listing the curtailment CSVs.
pub const INDEX_URL: &str = "https://dados.ons.org.br/dataset/restricao_coff_eolica_usi";
pub const DOWNLOAD_DIR: &str = "arquivos";
pub const PLANTS_CSV: &str = "8 - fator de capacidade Mapa - ODS_data.csv";
pub const MARKER_MAP_HTML: &str = "mapa_usinas.html";
pub const CIRCLE_MAP_HTML: &str = "mapa_pontos_coloridos.html";
pub const HEAT_MAP_HTML: &str = "mapa_calor.html";
pub const DOWNLOAD_WORKERS: usize = 5;

/// Optional override file looked up in the working directory.
pub const CONFIG_FILE: &str = "pipeline.yaml";

/// Every path and URL the pipeline touches.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub index_url: String,
    pub download_dir: PathBuf,
    pub plants_csv: PathBuf,
    pub marker_map: PathBuf,
    pub circle_map: PathBuf,
    pub heat_map: PathBuf,
    pub workers: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            index_url: INDEX_URL.to_string(),
            download_dir: PathBuf::from(DOWNLOAD_DIR),
            plants_csv: PathBuf::from(PLANTS_CSV),
            marker_map: PathBuf::from(MARKER_MAP_HTML),
            circle_map: PathBuf::from(CIRCLE_MAP_HTML),
            heat_map: PathBuf::from(HEAT_MAP_HTML),
            workers: DOWNLOAD_WORKERS,
        }
    }
}

impl PipelineConfig {
    /// Read overrides from `path` if it exists, otherwise use the built-in constants.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let text =
            fs::read_to_string(path).with_context(|| format!("reading config {:?}", path))?;
        let mut cfg: Self = serde_yaml::from_str(&text)
            .with_context(|| format!("parsing config {:?}", path))?;
        // a zero-sized pool would never drain
        cfg.workers = cfg.workers.max(1);
        info!(path = %path.display(), "loaded pipeline config");
        Ok(cfg)
    }
}
