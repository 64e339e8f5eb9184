use std::path::PathBuf;
use std::str::FromStr;

use serde::Serialize;
use tracing::{info, warn};

use crate::builder::{BuildSummary, ItemWindow, build_catalog};
use crate::config::ResolvedConfig;
use crate::definitions::{CollectionDefinition, Definitions};
use crate::download::{
    CancelFlag, DataDownloader, DownloadOptions, DownloadReport, download_data_files,
};
use crate::error::LabError;
use crate::psup::{CatalogService, HarvestOutcome, HarvestRequest, download_collection};
use crate::registry::TransformerRegistry;

/// Collections selected on the command line: `all` or a comma list of ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionSelector {
    All,
    Ids(Vec<String>),
}

impl FromStr for CollectionSelector {
    type Err = LabError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        if value.eq_ignore_ascii_case("all") {
            return Ok(CollectionSelector::All);
        }
        let ids: Vec<String> = value
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect();
        if ids.is_empty() {
            return Err(LabError::DefinitionNotFound(value.to_string()));
        }
        Ok(CollectionSelector::Ids(ids))
    }
}

#[derive(Debug, Clone, Default)]
pub struct DownloadRequest {
    pub overwrite: bool,
    /// Overrides the configured per-collection download limit.
    pub max_items: Option<usize>,
    pub cancel: CancelFlag,
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionDownload {
    pub id: String,
    pub harvest: Option<HarvestOutcome>,
    pub data: Option<DownloadReport>,
    pub action: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadResult {
    pub collections: Vec<CollectionDownload>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DefinitionEntry {
    pub id: String,
    pub title: String,
    pub schema: Option<String>,
    pub source_url: Option<String>,
    pub parents: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DefinitionsResult {
    pub collections: Vec<DefinitionEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchemasResult {
    pub schemas: Vec<String>,
}

pub struct App<'r, S: CatalogService, D: DataDownloader> {
    config: ResolvedConfig,
    definitions: Definitions,
    registry: &'r TransformerRegistry,
    service: S,
    downloader: D,
}

impl<'r, S: CatalogService, D: DataDownloader> App<'r, S, D> {
    pub fn new(
        config: ResolvedConfig,
        definitions: Definitions,
        registry: &'r TransformerRegistry,
        service: S,
        downloader: D,
    ) -> Self {
        Self {
            config,
            definitions,
            registry,
            service,
            downloader,
        }
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn schemas(&self) -> SchemasResult {
        SchemasResult {
            schemas: self
                .registry
                .schema_names()
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }

    pub fn definitions(&self) -> Result<DefinitionsResult, LabError> {
        let mut collections = Vec::with_capacity(self.definitions.collections.len());
        for collection in &self.definitions.collections {
            collections.push(DefinitionEntry {
                id: collection.id.clone(),
                title: collection.title.clone(),
                schema: collection
                    .source
                    .as_ref()
                    .map(|source| source.metadata_schema.clone()),
                source_url: collection.source.as_ref().map(|source| source.url.clone()),
                parents: self
                    .definitions
                    .parent_path(&collection.id)?
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
            });
        }
        Ok(DefinitionsResult { collections })
    }

    pub fn select(
        &self,
        selector: &CollectionSelector,
    ) -> Result<Vec<&CollectionDefinition>, LabError> {
        match selector {
            CollectionSelector::All => Ok(self.definitions.collections.iter().collect()),
            CollectionSelector::Ids(ids) => ids
                .iter()
                .map(|id| self.definitions.collection(id))
                .collect(),
        }
    }

    /// Harvests each selected collection, then fetches its data files.
    pub fn download(
        &self,
        selector: &CollectionSelector,
        request: &DownloadRequest,
    ) -> Result<DownloadResult, LabError> {
        let mut collections = Vec::new();
        for definition in self.select(selector)? {
            let Some(source) = &definition.source else {
                warn!(collection = %definition.id, "collection has no source service");
                collections.push(CollectionDownload {
                    id: definition.id.clone(),
                    harvest: None,
                    data: None,
                    action: "no source".to_string(),
                });
                continue;
            };

            let file = self
                .definitions
                .source_collection_file(&self.config.source_dir, &definition.id)?;
            let output_dir = file
                .parent()
                .ok_or_else(|| LabError::Filesystem(format!("invalid source path {file}")))?;
            info!(collection = %definition.id, url = %source.url, "harvesting collection");
            let harvest = download_collection(
                &self.service,
                &HarvestRequest {
                    collection_id: definition.short_id(),
                    service_url: &source.url,
                    schema_name: &source.metadata_schema,
                    output_dir,
                    overwrite: request.overwrite,
                    max_products: self.config.max_products,
                },
            )?;

            let options = DownloadOptions {
                overwrite: request.overwrite,
                max_products: request.max_items.or(self.config.download_limit),
                concurrency: self.config.concurrency,
                cancel: request.cancel.clone(),
            };
            let report = download_data_files(
                harvest.path().as_std_path(),
                self.registry,
                &self.downloader,
                &options,
            )?;
            let action = match (&harvest, report.failed()) {
                (HarvestOutcome::Skipped(_), 0) => "cached",
                (HarvestOutcome::Written(_), 0) => "downloaded",
                _ => "partial",
            };
            collections.push(CollectionDownload {
                id: definition.id.clone(),
                harvest: Some(harvest),
                data: Some(report),
                action: action.to_string(),
            });
        }
        Ok(DownloadResult { collections })
    }

    /// Builds the STAC catalog from the selected collections that have been
    /// harvested.
    pub fn build(
        &self,
        selector: &CollectionSelector,
        window: ItemWindow,
    ) -> Result<BuildSummary, LabError> {
        let mut source_files: Vec<PathBuf> = Vec::new();
        for definition in self.select(selector)? {
            let file = self
                .definitions
                .source_collection_file(&self.config.source_dir, &definition.id)?;
            if file.as_std_path().exists() {
                source_files.push(file.into_std_path_buf());
            } else {
                warn!(collection = %definition.id, path = %file, "source collection not downloaded");
            }
        }
        build_catalog(
            &self.definitions,
            &source_files,
            self.registry,
            &self.config.stac_dir,
            window,
        )
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_selector() {
        assert_eq!("all".parse::<CollectionSelector>().unwrap(), CollectionSelector::All);
        assert_eq!(
            "a, b".parse::<CollectionSelector>().unwrap(),
            CollectionSelector::Ids(vec!["a".to_string(), "b".to_string()])
        );
        assert_matches!(
            " , ".parse::<CollectionSelector>(),
            Err(LabError::DefinitionNotFound(_))
        );
    }
}
