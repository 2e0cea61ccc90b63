// src/fetch/urls.rs
use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::{debug, info, instrument};
use url::Url;

static CSV_LINK_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"a[href$=".csv"]"#).expect("CSS selector for CSV links should be valid")
});

/// Fetch the index page and return every `.csv` link on it, in document order.
///
/// A non-success status or transport error is returned as `Err`; the caller
/// decides whether that aborts anything.
#[instrument(level = "info", skip(client))]
pub async fn discover_csv_links(client: &Client, index_url: &str) -> Result<Vec<String>> {
    let base = Url::parse(index_url).with_context(|| format!("parsing index URL {}", index_url))?;
    let html = client
        .get(base.clone())
        .send()
        .await
        .with_context(|| format!("GET {}", base))?
        .error_for_status()?
        .text()
        .await
        .with_context(|| format!("reading body from {}", base))?;

    let links = extract_csv_links(&html, &base);
    info!(count = links.len(), "discovered CSV links");
    Ok(links)
}

/// Anchors whose `href` ends in `.csv`. Absolute hrefs are returned exactly
/// as written; relative ones are resolved against `base`. Duplicates are kept.
pub fn extract_csv_links(html: &str, base: &Url) -> Vec<String> {
    Html::parse_document(html)
        .select(&CSV_LINK_SELECTOR)
        .filter_map(|e| e.value().attr("href"))
        .filter_map(|href| {
            if Url::parse(href).is_ok() {
                return Some(href.to_string());
            }
            match base.join(href) {
                Ok(u) => Some(u.to_string()),
                Err(e) => {
                    debug!(href, error = %e, "skipping unresolvable link");
                    None
                }
            }
        })
        .collect()
}
