// src/fetch/mod.rs

/// Link discovery on the ONS dataset page
pub mod urls;

/// Bounded parallel CSV downloads
pub mod csvs;

pub use csvs::{download_all, download_csv, DownloadReport};
pub use urls::{discover_csv_links, extract_csv_links};
