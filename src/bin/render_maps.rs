// Re-render the three maps from CSVs already in the download directory,
// without touching the network.

use anyhow::Result;
use ons_curtailment::{config::CONFIG_FILE, pipeline, PipelineConfig};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> Result<()> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(env).init();

    let cfg = PipelineConfig::load_or_default(CONFIG_FILE)?;
    let outcome = pipeline::render_only(&cfg)?;

    info!(
        files = outcome.files_loaded,
        rows = outcome.merged_rows,
        markers = outcome.markers,
        circles = outcome.circles,
        heat_points = outcome.heat_points,
        "maps written to {}, {}, {}",
        cfg.marker_map.display(),
        cfg.circle_map.display(),
        cfg.heat_map.display()
    );
    Ok(())
}
