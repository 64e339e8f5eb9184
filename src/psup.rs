//! PSUP catalog service client and source collection documents.
//!
//! A source collection document holds the harvested collection metadata and
//! the raw product records exactly as the service returned them:
//! `{"collection": {...}, "products": [...]}`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::DEFAULT_TIMEOUT_SECS;
use crate::domain::{RawRecord, SourceCollection};
use crate::download::DataDownloader;
use crate::error::LabError;
use crate::fs_util::{write_atomic, write_json_atomic};
use crate::registry::TransformerRegistry;
use crate::transformer::MetadataRecord;

/// Paginated record service queried with a `limit` parameter.
pub trait CatalogService: Send + Sync {
    fn query(&self, url: &str, limit: u64) -> Result<Value, LabError>;
}

#[derive(Clone)]
pub struct PsupHttpClient {
    client: Client,
}

impl PsupHttpClient {
    pub fn new() -> Result<Self, LabError> {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// The timeout bounds every request, including each data file transfer.
    pub fn with_timeout(timeout: Duration) -> Result<Self, LabError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("pdssp-labtools/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| LabError::ServiceHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| LabError::ServiceHttp(err.to_string()))?;
        Ok(Self { client })
    }

    fn handle_status(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, LabError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "PSUP request failed".to_string());
        Err(LabError::ServiceStatus { status, message })
    }

    fn send_with_retries<F>(&self, mut make_req: F) -> Result<reqwest::blocking::Response, LabError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            match make_req().send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        debug!(status, attempt, "retrying PSUP request");
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        debug!(error = %err, attempt, "retrying PSUP request");
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(LabError::ServiceHttp(err.to_string()));
                }
            }
        }
    }
}

impl CatalogService for PsupHttpClient {
    fn query(&self, url: &str, limit: u64) -> Result<Value, LabError> {
        let limit = limit.to_string();
        let response =
            self.send_with_retries(|| self.client.get(url).query(&[("limit", limit.as_str())]))?;
        let response = Self::handle_status(response)?;
        response
            .json()
            .map_err(|err| LabError::MalformedResponse(err.to_string()))
    }
}

impl DataDownloader for PsupHttpClient {
    fn download(&self, url: &str, destination: &Path) -> Result<u64, LabError> {
        let response = self
            .send_with_retries(|| self.client.get(url))
            .map_err(|err| LabError::Download(err.to_string()))?;
        let mut response =
            Self::handle_status(response).map_err(|err| LabError::Download(err.to_string()))?;
        let mut written = 0;
        write_atomic(destination, |file| {
            written = io::copy(&mut response, file)?;
            Ok(())
        })?;
        Ok(written)
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

/// What a harvest request asks for.
#[derive(Debug, Clone)]
pub struct HarvestRequest<'a> {
    pub collection_id: &'a str,
    pub service_url: &'a str,
    pub schema_name: &'a str,
    pub output_dir: &'a Utf8Path,
    pub overwrite: bool,
    /// Soft ceiling: larger collections are harvested with a warning.
    pub max_products: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "path", rename_all = "lowercase")]
pub enum HarvestOutcome {
    /// The document already existed and was left untouched.
    Skipped(Utf8PathBuf),
    Written(Utf8PathBuf),
}

impl HarvestOutcome {
    pub fn path(&self) -> &Utf8Path {
        match self {
            HarvestOutcome::Skipped(path) | HarvestOutcome::Written(path) => path,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SourceCollectionDocument {
    collection: SourceCollection,
    products: Vec<RawRecord>,
}

/// `<output_dir>/<output_dir name>.json`
pub fn source_collection_path(output_dir: &Utf8Path) -> Result<Utf8PathBuf, LabError> {
    let basename = output_dir
        .file_name()
        .ok_or_else(|| LabError::Filesystem(format!("invalid output directory {output_dir}")))?;
    Ok(output_dir.join(format!("{basename}.json")))
}

/// Harvests one collection into its source collection document.
///
/// Nothing is written unless both service queries succeed.
pub fn download_collection(
    service: &dyn CatalogService,
    request: &HarvestRequest<'_>,
) -> Result<HarvestOutcome, LabError> {
    let path = source_collection_path(request.output_dir)?;
    if path.as_std_path().exists() && !request.overwrite {
        info!(path = %path, "source collection file already exists");
        return Ok(HarvestOutcome::Skipped(path));
    }

    let counted = service
        .query(request.service_url, 0)
        .map_err(|err| malformed(request, err))?;
    let total = read_total(&counted).ok_or_else(|| {
        LabError::MalformedResponse(format!(
            "no \"total\" field in response for {}",
            request.collection_id
        ))
    })?;
    if total > request.max_products {
        warn!(
            collection = request.collection_id,
            total,
            max = request.max_products,
            "number of products higher than expected"
        );
    }

    let response = service
        .query(request.service_url, total)
        .map_err(|err| malformed(request, err))?;
    let products = read_data(&response).ok_or_else(|| {
        LabError::MalformedResponse(format!(
            "no \"data\" records in response for {}",
            request.collection_id
        ))
    })?;

    let document = SourceCollectionDocument {
        collection: SourceCollection {
            id: request.collection_id.to_string(),
            schema_name: request.schema_name.to_string(),
            n_products: total,
        },
        products,
    };
    write_json_atomic(path.as_std_path(), &document)?;
    info!(path = %path, products = document.products.len(), "source collection written");
    Ok(HarvestOutcome::Written(path))
}

fn malformed(request: &HarvestRequest<'_>, err: LabError) -> LabError {
    LabError::MalformedResponse(format!("{} query failed: {err}", request.collection_id))
}

fn read_total(response: &Value) -> Option<u64> {
    match response.get("total")? {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn read_data(response: &Value) -> Option<Vec<RawRecord>> {
    response
        .get("data")?
        .as_array()?
        .iter()
        .map(|record| record.as_object().cloned())
        .collect()
}

fn read_document(path: &Path) -> Result<Value, LabError> {
    let content = fs::read_to_string(path)
        .map_err(|err| LabError::Filesystem(format!("{}: {err}", path.display())))?;
    serde_json::from_str(&content)
        .map_err(|_| LabError::InvalidSourceCollection(path.to_path_buf()))
}

fn collection_of(document: &Value, path: &Path) -> Result<SourceCollection, LabError> {
    document
        .get("collection")
        .ok_or_else(|| LabError::InvalidSourceCollection(path.to_path_buf()))
        .and_then(|collection| {
            SourceCollection::deserialize(collection)
                .map_err(|_| LabError::InvalidSourceCollection(path.to_path_buf()))
        })
}

pub fn read_collection_metadata(path: &Path) -> Result<SourceCollection, LabError> {
    collection_of(&read_document(path)?, path)
}

/// What to do when a product record does not parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParsePolicy {
    /// Fail the whole batch on the first bad record.
    Abort,
    /// Keep going and report bad records in [`ProductBatch::failures`].
    #[default]
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordFailure {
    /// Position of the record in the source document.
    pub index: usize,
    pub message: String,
}

#[derive(Debug)]
pub struct ProductBatch {
    pub collection: SourceCollection,
    /// Parsed records, in document order.
    pub records: Vec<Box<dyn MetadataRecord>>,
    pub failures: Vec<RecordFailure>,
}

impl ProductBatch {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Parses every product record with the transformer registered for the
/// collection's schema.
pub fn read_products_metadata(
    path: &Path,
    registry: &TransformerRegistry,
    policy: ParsePolicy,
) -> Result<ProductBatch, LabError> {
    let document = read_document(path)?;
    let collection = collection_of(&document, path)?;
    let transformer = registry.create_transformer(&collection.schema_name)?;
    let products = document
        .get("products")
        .and_then(Value::as_array)
        .ok_or_else(|| LabError::InvalidSourceCollection(path.to_path_buf()))?;

    let mut records = Vec::with_capacity(products.len());
    let mut failures = Vec::new();
    for (index, product) in products.iter().enumerate() {
        let parsed = match product.as_object() {
            Some(raw) => transformer.parse_record(raw),
            None => Err(LabError::RecordParse {
                schema: collection.schema_name.clone(),
                message: "record is not a JSON object".to_string(),
            }),
        };
        match parsed {
            Ok(record) => records.push(record),
            Err(err) if policy == ParsePolicy::Skip => {
                warn!(path = %path.display(), index, error = %err, "skipping product record");
                failures.push(RecordFailure {
                    index,
                    message: err.to_string(),
                });
            }
            Err(err) => return Err(err),
        }
    }
    debug!(
        path = %path.display(),
        records = records.len(),
        failures = failures.len(),
        "read product records"
    );

    Ok(ProductBatch {
        collection,
        records,
        failures,
    })
}

/// Data directory beside a source collection document.
pub fn data_dir(source_collection_file: &Path) -> PathBuf {
    source_collection_file
        .parent()
        .map(|parent| parent.join("data"))
        .unwrap_or_else(|| PathBuf::from("data"))
}

