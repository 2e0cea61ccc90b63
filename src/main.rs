use anyhow::Result;
use ons_curtailment::{config::CONFIG_FILE, pipeline, PipelineConfig};
use tokio::time::Instant;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();
    info!("startup");

    std::panic::set_hook(Box::new(|info| {
        eprintln!("panic: {:?}", info);
    }));

    // ─── 2) config ───────────────────────────────────────────────────
    let cfg = PipelineConfig::load_or_default(CONFIG_FILE)?;

    // ─── 3) discover → download → merge → render ─────────────────────
    let start = Instant::now();
    let outcome = pipeline::run(&cfg).await?;

    info!(
        links = outcome.links.len(),
        downloaded = outcome.downloads.succeeded.len(),
        failed = outcome.downloads.failed.len(),
        rows = outcome.maps.merged_rows,
        elapsed = ?start.elapsed(),
        "all done"
    );
    Ok(())
}
