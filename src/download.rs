//! Asset download stage: fetches product data files beside a source
//! collection document.
//!
//! Downloads run on a fixed pool of scoped worker threads claiming products
//! from a shared counter. A failed product never aborts the batch, and the
//! report lists products in document order whatever the completion order.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::{DEFAULT_CONCURRENCY, DEFAULT_DOWNLOAD_LIMIT};
use crate::domain::file_name_from_url;
use crate::error::LabError;
use crate::psup::{ParsePolicy, RecordFailure, data_dir, read_products_metadata};
use crate::registry::TransformerRegistry;

/// Fetches one URL into a local file.
pub trait DataDownloader: Send + Sync {
    /// Returns the number of bytes written. Implementations bound each
    /// transfer with their own timeout.
    fn download(&self, url: &str, destination: &Path) -> Result<u64, LabError>;
}

/// Cooperative cancellation shared between the caller and the workers.
/// Products not yet started when the flag is raised are reported as
/// cancelled; transfers in flight run to completion or timeout.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub overwrite: bool,
    /// Only the first `max_products` records are fetched; `None` fetches all.
    pub max_products: Option<usize>,
    pub concurrency: usize,
    pub cancel: CancelFlag,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            overwrite: false,
            max_products: Some(DEFAULT_DOWNLOAD_LIMIT),
            concurrency: DEFAULT_CONCURRENCY,
            cancel: CancelFlag::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "lowercase")]
pub enum DownloadStatus {
    Downloaded,
    /// The file was already present and left untouched.
    Exists,
    Failed(String),
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductDownload {
    pub url: String,
    /// Local file, `None` unless the file is present after the attempt.
    pub path: Option<PathBuf>,
    pub status: DownloadStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadReport {
    pub data_dir: PathBuf,
    pub products: Vec<ProductDownload>,
    /// Records that could not be parsed and were left out.
    pub skipped_records: Vec<RecordFailure>,
}

impl DownloadReport {
    pub fn count(&self, matches: impl Fn(&DownloadStatus) -> bool) -> usize {
        self.products
            .iter()
            .filter(|product| matches(&product.status))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.count(|status| matches!(status, DownloadStatus::Failed(_)))
    }
}

/// Downloads the data files of the products listed in a source collection
/// document into its sibling `data/` directory.
pub fn download_data_files(
    source_collection_file: &Path,
    registry: &TransformerRegistry,
    downloader: &dyn DataDownloader,
    options: &DownloadOptions,
) -> Result<DownloadReport, LabError> {
    let batch = read_products_metadata(source_collection_file, registry, ParsePolicy::Skip)?;
    let data_dir = data_dir(source_collection_file);

    if batch.is_empty() {
        info!(path = %source_collection_file.display(), "no products found");
        return Ok(DownloadReport {
            data_dir,
            products: Vec::new(),
            skipped_records: batch.failures,
        });
    }

    let limit = options.max_products.unwrap_or(batch.records.len());
    let urls: Vec<&str> = batch
        .records
        .iter()
        .take(limit)
        .map(|record| record.download_url())
        .collect();

    fs::create_dir_all(&data_dir).map_err(|err| LabError::Filesystem(err.to_string()))?;
    let products = run_pool(&urls, options.concurrency.max(1), |url| {
        if options.cancel.is_cancelled() {
            return ProductDownload {
                url: url.to_string(),
                path: None,
                status: DownloadStatus::Cancelled,
            };
        }
        fetch_one(url, &data_dir, downloader, options.overwrite)
    });

    let report = DownloadReport {
        data_dir,
        products,
        skipped_records: batch.failures,
    };
    info!(
        downloaded = report.count(|status| *status == DownloadStatus::Downloaded),
        exists = report.count(|status| *status == DownloadStatus::Exists),
        failed = report.failed(),
        "data files processed"
    );
    Ok(report)
}

fn fetch_one(
    url: &str,
    data_dir: &Path,
    downloader: &dyn DataDownloader,
    overwrite: bool,
) -> ProductDownload {
    let Some(file_name) = file_name_from_url(url) else {
        warn!(url, "download URL has no file name");
        return ProductDownload {
            url: url.to_string(),
            path: None,
            status: DownloadStatus::Failed("download URL has no file name".to_string()),
        };
    };
    let path = data_dir.join(file_name);

    if path.exists() && !overwrite {
        info!(file = file_name, "data file already exists");
        return ProductDownload {
            url: url.to_string(),
            path: Some(path),
            status: DownloadStatus::Exists,
        };
    }

    match downloader.download(url, &path) {
        Ok(bytes) => {
            info!(file = file_name, bytes, "downloaded data file");
            ProductDownload {
                url: url.to_string(),
                path: Some(path),
                status: DownloadStatus::Downloaded,
            }
        }
        Err(err) => {
            warn!(file = file_name, error = %err, "data file download failed");
            ProductDownload {
                url: url.to_string(),
                path: None,
                status: DownloadStatus::Failed(err.to_string()),
            }
        }
    }
}

/// Runs `task` over `inputs` on at most `workers` threads and returns the
/// outputs in input order.
fn run_pool<I, O, F>(inputs: &[I], workers: usize, task: F) -> Vec<O>
where
    I: Sync,
    O: Send,
    F: Fn(&I) -> O + Sync,
{
    let workers = workers.min(inputs.len());
    let next = AtomicUsize::new(0);

    let mut indexed: Vec<(usize, O)> = thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                let next = &next;
                let task = &task;
                scope.spawn(move || {
                    let mut done = Vec::new();
                    loop {
                        let index = next.fetch_add(1, Ordering::Relaxed);
                        let Some(input) = inputs.get(index) else {
                            break;
                        };
                        done.push((index, task(input)));
                    }
                    done
                })
            })
            .collect();

        handles
            .into_iter()
            .flat_map(|handle| match handle.join() {
                Ok(done) => done,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect()
    });

    indexed.sort_by_key(|(index, _)| *index);
    indexed.into_iter().map(|(_, output)| output).collect()
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn pool_keeps_input_order() {
        let inputs: Vec<u64> = (0..20).collect();
        let outputs = run_pool(&inputs, 4, |value| {
            thread::sleep(Duration::from_millis((20 - value) % 5));
            value * 2
        });
        assert_eq!(outputs, (0..20).map(|value| value * 2).collect::<Vec<_>>());
    }

    #[test]
    fn pool_handles_empty_input() {
        let outputs: Vec<u8> = run_pool(&[] as &[u8], 4, |value| *value);
        assert!(outputs.is_empty());
    }

    #[test]
    fn cancel_flag_is_shared() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        clone.cancel();
        assert!(flag.is_cancelled());
    }
}
