// src/fetch/csvs.rs
use anyhow::{Context, Result};
use futures::StreamExt;
use percent_encoding::percent_decode_str;
use reqwest::{Client, Response};
use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use tokio::{fs, io::AsyncWriteExt, sync::Semaphore, time::Instant};
use tracing::{debug, error, info, instrument, warn};
use url::Url;

/// Outcome of one `download_all` pass.
#[derive(Debug, Default)]
pub struct DownloadReport {
    pub succeeded: Vec<PathBuf>,
    /// (url, error message)
    pub failed: Vec<(String, String)>,
}

/// Local file name for `url`: its last path segment, percent-decoded.
pub fn local_file_name(url: &Url) -> String {
    let segment = url
        .path_segments()
        .and_then(|segments| segments.last())
        .filter(|name| !name.is_empty())
        .unwrap_or("download.csv");
    // a decoded %2F must not leave dest_dir
    percent_decode_str(segment)
        .decode_utf8_lossy()
        .replace(['/', '\\'], "_")
}

/// Distinguishes concurrent downloads of the same URL.
static PART_SEQ: AtomicU64 = AtomicU64::new(0);

/// Stream `url_str` into `dest_dir/<last path segment>` and return the written path.
///
/// The body goes to a `.part` file that is renamed into place only once it is
/// complete, so a failed download never replaces or truncates an existing CSV.
pub async fn download_csv(
    client: &Client,
    url_str: &str,
    dest_dir: impl AsRef<Path>,
) -> Result<PathBuf> {
    let url = Url::parse(url_str).with_context(|| format!("parsing CSV URL {}", url_str))?;
    let name = local_file_name(&url);
    let dest_path = dest_dir.as_ref().join(&name);
    let part_path = dest_dir.as_ref().join(format!(
        "{}.{}.part",
        name,
        PART_SEQ.fetch_add(1, Ordering::Relaxed)
    ));

    let resp = client
        .get(url_str)
        .send()
        .await
        .with_context(|| format!("GET {}", url_str))?
        .error_for_status()?;

    if let Err(err) = stream_to_file(resp, &part_path).await {
        if let Err(e) = fs::remove_file(&part_path).await {
            debug!(file = %part_path.display(), error = %e, "no partial file to remove");
        }
        return Err(err.context(format!("downloading {}", url_str)));
    }

    fs::rename(&part_path, &dest_path)
        .await
        .with_context(|| format!("moving {:?} to {:?}", part_path, dest_path))?;
    Ok(dest_path)
}

async fn stream_to_file(resp: Response, path: &Path) -> Result<()> {
    let mut file = fs::File::create(path)
        .await
        .with_context(|| format!("creating {:?}", path))?;
    let mut body = resp.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.context("reading response body")?;
        file.write_all(&chunk)
            .await
            .with_context(|| format!("writing {:?}", path))?;
    }
    file.flush().await?;
    Ok(())
}

/// Download every URL into `dest_dir` with at most `workers` requests in flight.
///
/// Failures are logged and recorded in the report, never retried. Returns once
/// every download has finished or failed.
#[instrument(level = "info", skip(client, urls, dest_dir), fields(count = urls.len(), dest = %dest_dir.as_ref().display()))]
pub async fn download_all(
    client: &Client,
    urls: Vec<String>,
    dest_dir: impl AsRef<Path>,
    workers: usize,
) -> Result<DownloadReport> {
    let dest_dir = dest_dir.as_ref().to_path_buf();
    fs::create_dir_all(&dest_dir)
        .await
        .with_context(|| format!("creating download directory {:?}", dest_dir))?;

    let sem = Arc::new(Semaphore::new(workers.max(1)));
    let mut handles = Vec::with_capacity(urls.len());

    for url in urls {
        let client = client.clone();
        let dest_dir = dest_dir.clone();
        let sem = sem.clone();

        handles.push(tokio::spawn(async move {
            // the semaphore is never closed
            let _permit = sem.acquire_owned().await.ok();
            let start = Instant::now();
            match download_csv(&client, &url, &dest_dir).await {
                Ok(path) => {
                    info!(file = %path.display(), elapsed = ?start.elapsed(), "downloaded");
                    Ok(path)
                }
                Err(err) => {
                    error!("download {} failed: {:#}", url, err);
                    Err((url, format!("{:#}", err)))
                }
            }
        }));
    }

    let mut report = DownloadReport::default();
    for h in handles {
        match h.await {
            Ok(Ok(path)) => report.succeeded.push(path),
            Ok(Err(failure)) => report.failed.push(failure),
            Err(join_err) => warn!("download task aborted: {}", join_err),
        }
    }

    info!(
        succeeded = report.succeeded.len(),
        failed = report.failed.len(),
        "downloads finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;
    use tracing_subscriber::EnvFilter;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn init_test_logging() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("info,ons_curtailment::fetch=debug")),
            )
            .with_test_writer()
            .try_init();
    }

    fn leftover_parts(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.extension().map_or(false, |ext| ext == "part"))
            .collect()
    }

    const BODY: &str = "din_instante;id_ons;nom_usina;val_geracao\n\
                        2024-01-01 00:00:00;CJU_A;Usina A;10.5\n";

    #[test]
    fn file_name_is_last_segment() {
        let u = Url::parse("https://ons.org.br/files/a/RESTRICAO_2024_01.csv?x=1").unwrap();
        assert_eq!(local_file_name(&u), "RESTRICAO_2024_01.csv");
        let root = Url::parse("https://ons.org.br/").unwrap();
        assert_eq!(local_file_name(&root), "download.csv");
    }

    #[test]
    fn file_name_is_percent_decoded() {
        let u = Url::parse("HTTPS://Dados.ONS.org.br/files/RESTRICAO 2024.csv").unwrap();
        assert_eq!(local_file_name(&u), "RESTRICAO 2024.csv");
        let sneaky = Url::parse("https://ons.org.br/files/..%2Fescape.csv").unwrap();
        assert_eq!(local_file_name(&sneaky), ".._escape.csv");
    }

    #[tokio::test]
    async fn writes_remote_bytes_verbatim() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files/jan.csv"))
            .respond_with(ResponseTemplate::new(200).set_body_string(BODY))
            .mount(&server)
            .await;

        let tmp = tempdir().unwrap();
        let client = Client::new();
        let url = format!("{}/files/jan.csv", server.uri());
        let written = download_csv(&client, &url, tmp.path()).await.unwrap();

        assert_eq!(written, tmp.path().join("jan.csv"));
        assert_eq!(std::fs::read(&written).unwrap(), BODY.as_bytes());
    }

    #[tokio::test]
    async fn bad_status_leaves_no_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let tmp = tempdir().unwrap();
        let client = Client::new();
        let url = format!("{}/files/missing.csv", server.uri());
        assert!(download_csv(&client, &url, tmp.path()).await.is_err());
        assert!(!tmp.path().join("missing.csv").exists());
    }

    #[tokio::test]
    async fn download_all_logs_failures_and_keeps_going() {
        let server = MockServer::start().await;
        for name in ["a.csv", "b.csv", "c.csv", "d.csv", "e.csv", "f.csv"] {
            Mock::given(method("GET"))
                .and(path(format!("/files/{}", name)))
                .respond_with(ResponseTemplate::new(200).set_body_string(name))
                .mount(&server)
                .await;
        }
        Mock::given(method("GET"))
            .and(path("/files/broken.csv"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let tmp = tempdir().unwrap();
        let dest = tmp.path().join("arquivos");
        let mut urls: Vec<String> = ["a", "b", "c", "broken", "d", "e", "f"]
            .iter()
            .map(|n| format!("{}/files/{}.csv", server.uri(), n))
            .collect();
        urls.push("not a url".to_string());

        let client = Client::new();
        let report = download_all(&client, urls, &dest, 5).await.unwrap();

        assert_eq!(report.succeeded.len(), 6);
        assert_eq!(report.failed.len(), 2);
        assert!(dest.is_dir());
        assert_eq!(std::fs::read_to_string(dest.join("e.csv")).unwrap(), "e.csv");
        assert!(!dest.join("broken.csv").exists());
    }

    #[tokio::test]
    async fn empty_url_list_still_creates_directory() {
        let tmp = tempdir().unwrap();
        let dest = tmp.path().join("nested").join("arquivos");
        let report = download_all(&Client::new(), Vec::new(), &dest, 5)
            .await
            .unwrap();
        assert!(report.succeeded.is_empty() && report.failed.is_empty());
        assert!(dest.is_dir());
    }

    #[tokio::test]
    async fn truncated_body_keeps_previous_file() {
        init_test_logging();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 2048];
            let _ = sock.read(&mut buf).await;
            let _ = sock
                .write_all(
                    b"HTTP/1.1 200 OK\r\nContent-Length: 1000\r\n\r\n\
                      din_instante;id_ons;nom_usina",
                )
                .await;
            // closing here leaves the body ~970 bytes short
        });

        let tmp = tempdir().unwrap();
        let dest = tmp.path().join("arquivos");
        std::fs::create_dir_all(&dest).unwrap();
        std::fs::write(dest.join("jan.csv"), BODY).unwrap();

        let url = format!("http://{}/files/jan.csv", addr);
        let report = download_all(&Client::new(), vec![url], &dest, 5)
            .await
            .unwrap();

        assert_eq!(report.failed.len(), 1);
        assert!(report.succeeded.is_empty());
        assert_eq!(std::fs::read_to_string(dest.join("jan.csv")).unwrap(), BODY);
        assert!(leftover_parts(&dest).is_empty());
    }

    #[tokio::test]
    async fn duplicate_links_do_not_interleave() {
        init_test_logging();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files/jan.csv"))
            .respond_with(ResponseTemplate::new(200).set_body_string(BODY))
            .mount(&server)
            .await;

        let tmp = tempdir().unwrap();
        let url = format!("{}/files/jan.csv", server.uri());
        let report = download_all(&Client::new(), vec![url.clone(), url.clone(), url], tmp.path(), 5)
            .await
            .unwrap();

        assert_eq!(report.succeeded.len(), 3);
        assert_eq!(std::fs::read_to_string(tmp.path().join("jan.csv")).unwrap(), BODY);
        assert!(leftover_parts(tmp.path()).is_empty());
    }
}
