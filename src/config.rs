use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::error::LabError;

pub const DEFAULT_MAX_PRODUCTS: u64 = 13_000;
pub const DEFAULT_DOWNLOAD_LIMIT: usize = 10;
pub const DEFAULT_CONCURRENCY: usize = 4;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub source_dir: Option<String>,
    #[serde(default)]
    pub stac_dir: Option<String>,
    #[serde(default)]
    pub definitions: Option<String>,
    #[serde(default)]
    pub max_products: Option<u64>,
    /// Number of data files fetched per collection; `null` lifts the limit.
    #[serde(default = "default_download_limit")]
    pub download_limit: Option<usize>,
    #[serde(default)]
    pub concurrency: Option<usize>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub source_dir: Utf8PathBuf,
    pub stac_dir: Utf8PathBuf,
    pub definitions: Utf8PathBuf,
    pub max_products: u64,
    pub download_limit: Option<usize>,
    pub concurrency: usize,
    pub timeout_secs: u64,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, LabError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from("labtools.json"),
        };

        if path.is_none() && !config_path.exists() {
            return Err(LabError::MissingConfig);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| LabError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| LabError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, LabError> {
        let schema_version = config.schema_version.unwrap_or(1);

        let source_dir = match config.source_dir {
            Some(dir) => Utf8PathBuf::from(dir),
            None => default_data_root()?.join("source"),
        };
        let stac_dir = match config.stac_dir {
            Some(dir) => Utf8PathBuf::from(dir),
            None => default_data_root()?.join("stac"),
        };
        let definitions = config
            .definitions
            .map(Utf8PathBuf::from)
            .unwrap_or_else(|| Utf8PathBuf::from("definitions.json"));

        let concurrency = config.concurrency.unwrap_or(DEFAULT_CONCURRENCY);
        if concurrency == 0 {
            return Err(LabError::ConfigParse(
                "concurrency must be at least 1".to_string(),
            ));
        }

        Ok(ResolvedConfig {
            schema_version,
            source_dir,
            stac_dir,
            definitions,
            max_products: config.max_products.unwrap_or(DEFAULT_MAX_PRODUCTS),
            download_limit: config.download_limit,
            concurrency,
            timeout_secs: config.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
        })
    }
}

fn default_download_limit() -> Option<usize> {
    Some(DEFAULT_DOWNLOAD_LIMIT)
}

fn default_data_root() -> Result<Utf8PathBuf, LabError> {
    BaseDirs::new()
        .and_then(|dirs| Utf8PathBuf::from_path_buf(dirs.data_dir().join("pdssp-labtools")).ok())
        .ok_or_else(|| LabError::Filesystem("unable to resolve data directory".to_string()))
}
