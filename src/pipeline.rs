// src/pipeline.rs
use anyhow::{Context, Result};
use reqwest::Client;
use tracing::{debug, error, info, instrument};

use crate::{
    config::PipelineConfig,
    fetch::{self, DownloadReport},
    process::{self, load_plant_locations, merge},
    render,
};

#[derive(Debug)]
pub struct PipelineOutcome {
    pub links: Vec<String>,
    pub downloads: DownloadReport,
    pub maps: RenderOutcome,
}

/// What the merge and render stages produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOutcome {
    pub files_loaded: usize,
    pub merged_rows: usize,
    pub observations: usize,
    pub markers: usize,
    pub circles: usize,
    pub heat_points: usize,
}

/// Discover, download, merge and render.
///
/// A failing index page only empties the link list; merge-time errors end the run.
#[instrument(level = "info", skip_all, fields(index = %cfg.index_url))]
pub async fn run(cfg: &PipelineConfig) -> Result<PipelineOutcome> {
    let client = Client::new();

    let links = match fetch::discover_csv_links(&client, &cfg.index_url).await {
        Ok(links) => links,
        Err(err) => {
            error!("index page {} unavailable: {:#}", cfg.index_url, err);
            Vec::new()
        }
    };

    let downloads =
        fetch::download_all(&client, links.clone(), &cfg.download_dir, cfg.workers).await?;

    // CSV parsing and rendering are CPU-bound
    let maps = tokio::task::spawn_blocking({
        let cfg = cfg.clone();
        move || render_only(&cfg)
    })
    .await
    .context("merge/render task panicked")??;

    Ok(PipelineOutcome {
        links,
        downloads,
        maps,
    })
}

/// Merge whatever CSVs sit in the download directory and write the three maps.
#[instrument(level = "info", skip_all, fields(dir = %cfg.download_dir.display()))]
pub fn render_only(cfg: &PipelineConfig) -> Result<RenderOutcome> {
    let tables = process::load_directory(&cfg.download_dir)?;
    let files_loaded = tables.len();
    let raw = process::concat_tables(tables)
        .with_context(|| format!("no CSV files in {:?}", cfg.download_dir))?;

    let plants = load_plant_locations(&cfg.plants_csv)?;
    let merged = merge(raw, &plants)?;

    info!("merged dataset:\n{}", merged.summary()?);
    debug!("first rows:\n{}", merged.head(5)?);
    debug!("last rows:\n{}", merged.tail(5)?);

    let obs = merged.observations()?;
    info!(
        with_coordinates = obs.len(),
        without = merged.num_rows() - obs.len(),
        "rows usable for maps"
    );

    let markers = render::render_marker_map(&obs, &cfg.marker_map)?;
    let circles = render::render_circle_map(&obs, &cfg.circle_map)?;
    let heat_points = render::render_heat_map(&obs, &cfg.heat_map)?;

    Ok(RenderOutcome {
        files_loaded,
        merged_rows: merged.num_rows(),
        observations: obs.len(),
        markers,
        circles,
        heat_points,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{fs, path::Path};
    use tempfile::tempdir;
    use tracing_subscriber::EnvFilter;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn init_test_logging() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("info,ons_curtailment=debug")),
            )
            .with_test_writer()
            .try_init();
    }

    const JAN: &str = "id_subsistema;nom_usina;id_ons;din_instante;val_geracao\n\
        NE;Parque X1;CJU_X1;2024-01-01 00:00:00;10\n\
        NE;Parque X1;CJU_X1;2024-01-01 00:30:00;20\n\
        NE;Parque Z;CJU_Z;2024-01-01 00:30:00;5\n";

    const FEB: &str = "id_subsistema;nom_usina;id_ons;din_instante;val_geracao\n\
        NE;Parque X1;CJU_X1;2024-02-01 00:00:00;30\n\
        NE;Parque X1;CJU_X1;2024-02-01 00:30:00;50\n\
        NE;Parque Y2;CJU_Y2;2024-02-01 00:00:00;20\n\
        NE;Parque Y2;CJU_Y2;2024-02-01 00:30:00;\n\
        NE;Parque Z;CJU_Z;2024-02-01 00:30:00;7\n";

    const PLANTS: &str = "id_usina,nom,Val Latitude Sindat,Val Longitude Sindat\n\
        X1,Parque X1,-5.1,-35.9\n\
        Y2,Parque Y2,-3.7,-38.5\n";

    fn config(root: &Path, index_url: String) -> PipelineConfig {
        let plants_csv = root.join("plants.csv");
        fs::write(&plants_csv, PLANTS).unwrap();
        PipelineConfig {
            index_url,
            download_dir: root.join("arquivos"),
            plants_csv,
            marker_map: root.join("mapa_usinas.html"),
            circle_map: root.join("mapa_pontos_coloridos.html"),
            heat_map: root.join("mapa_calor.html"),
            workers: 5,
        }
    }

    #[tokio::test]
    async fn end_to_end_against_mock_portal() {
        init_test_logging();
        let server = MockServer::start().await;
        let page = format!(
            r#"<a href="{0}/files/jan.csv">jan</a>
               <a href="{0}/files/gone.csv">gone</a>
               <a href="{0}/files/readme.pdf">pdf</a>
               <a href="{0}/files/feb.csv">feb</a>"#,
            server.uri()
        );
        Mock::given(method("GET"))
            .and(path("/dataset/restricao_coff_eolica_usi"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/files/jan.csv"))
            .respond_with(ResponseTemplate::new(200).set_body_string(JAN))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/files/feb.csv"))
            .respond_with(ResponseTemplate::new(200).set_body_string(FEB))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/files/gone.csv"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let tmp = tempdir().unwrap();
        let cfg = config(
            tmp.path(),
            format!("{}/dataset/restricao_coff_eolica_usi", server.uri()),
        );
        let outcome = run(&cfg).await.unwrap();

        assert_eq!(outcome.links.len(), 3);
        assert_eq!(outcome.downloads.succeeded.len(), 2);
        assert_eq!(outcome.downloads.failed.len(), 1);
        assert_eq!(
            outcome.maps,
            RenderOutcome {
                files_loaded: 2,
                merged_rows: 8,
                observations: 6,
                markers: 2,
                circles: 2,
                heat_points: 2,
            }
        );

        let circles = fs::read_to_string(&cfg.circle_map).unwrap();
        // X1 february mean 40 is the maximum, Y2 mean 20
        assert!(circles.contains(r#""fill_opacity":1.0"#));
        assert!(circles.contains(r#""fill_opacity":0.5"#));
        assert!(fs::read_to_string(&cfg.marker_map)
            .unwrap()
            .contains("Parque Y2"));
        assert!(cfg.heat_map.exists());
    }

    #[tokio::test]
    async fn unreachable_index_still_renders_leftover_files() {
        init_test_logging();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let tmp = tempdir().unwrap();
        let cfg = config(tmp.path(), format!("{}/dataset", server.uri()));
        fs::create_dir_all(&cfg.download_dir).unwrap();
        fs::write(cfg.download_dir.join("old.csv"), JAN).unwrap();

        let outcome = run(&cfg).await.unwrap();
        assert!(outcome.links.is_empty());
        assert_eq!(outcome.maps.merged_rows, 3);
        assert_eq!(outcome.maps.markers, 1);
    }

    #[test]
    fn empty_download_directory_is_fatal() {
        init_test_logging();
        let tmp = tempdir().unwrap();
        let cfg = config(tmp.path(), "http://localhost/".into());
        fs::create_dir_all(&cfg.download_dir).unwrap();
        assert!(render_only(&cfg).is_err());
        assert!(!cfg.marker_map.exists());
    }

    #[test]
    fn missing_reference_file_is_fatal() {
        init_test_logging();
        let tmp = tempdir().unwrap();
        let mut cfg = config(tmp.path(), "http://localhost/".into());
        cfg.plants_csv = tmp.path().join("absent.csv");
        fs::create_dir_all(&cfg.download_dir).unwrap();
        fs::write(cfg.download_dir.join("feb.csv"), FEB).unwrap();
        assert!(render_only(&cfg).is_err());
    }
}
