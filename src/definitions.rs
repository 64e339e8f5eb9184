use std::collections::{BTreeMap, HashSet};
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::Extension;
use crate::error::LabError;
use crate::stac::{Asset, Bbox, Geometry, Provider};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Publication {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citation: Option<String>,
}

/// Where a collection's source metadata is harvested from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDefinition {
    pub url: String,
    pub metadata_schema: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemDefinition {
    pub id: String,
    #[serde(default)]
    pub geometry: Option<Geometry>,
    #[serde(default)]
    pub bbox: Option<Bbox>,
    #[serde(default)]
    pub assets: BTreeMap<String, Asset>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionDefinition {
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(default = "default_license")]
    pub license: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub providers: Vec<Provider>,
    #[serde(default)]
    pub ssys_targets: Vec<String>,
    #[serde(default)]
    pub processing_level: Option<String>,
    #[serde(default)]
    pub sci_publications: Vec<Publication>,
    #[serde(default)]
    pub summaries: Option<serde_json::Map<String, Value>>,
    #[serde(default)]
    pub source: Option<SourceDefinition>,
}

impl CollectionDefinition {
    /// Last `:`-separated segment of the id, so that
    /// `urn:pdssp:ias:collection:mex_omega_cubes_rdr` maps to
    /// `mex_omega_cubes_rdr`.
    pub fn short_id(&self) -> &str {
        short_id(&self.id)
    }

    pub fn stac_extensions(&self) -> Result<Vec<Extension>, LabError> {
        self.extensions.iter().map(|name| name.parse()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogDefinition {
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub ssys_targets: Vec<String>,
    /// Child catalog ids.
    #[serde(default)]
    pub catalogs: Vec<String>,
    /// Collection ids.
    #[serde(default)]
    pub collections: Vec<String>,
}

impl CatalogDefinition {
    pub fn short_id(&self) -> &str {
        short_id(&self.id)
    }
}

/// Catalog tree loaded from a definitions file. The first catalog is the
/// root.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Definitions {
    #[serde(default)]
    pub catalogs: Vec<CatalogDefinition>,
    #[serde(default)]
    pub collections: Vec<CollectionDefinition>,
}

impl Definitions {
    pub fn load(path: &Utf8Path) -> Result<Self, LabError> {
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|_| LabError::ConfigRead(path.as_std_path().to_path_buf()))?;
        let definitions: Definitions = serde_json::from_str(&content)
            .map_err(|err| LabError::ConfigParse(err.to_string()))?;
        definitions.validate()?;
        Ok(definitions)
    }

    fn validate(&self) -> Result<(), LabError> {
        for catalog in &self.catalogs {
            for child in &catalog.catalogs {
                self.catalog(child)?;
            }
            for collection in &catalog.collections {
                self.collection(collection)?;
            }
        }
        if let Ok(root) = self.root_catalog() {
            self.check_acyclic(root, &mut Vec::new())?;
        }
        Ok(())
    }

    fn check_acyclic<'a>(
        &'a self,
        catalog: &'a CatalogDefinition,
        ancestors: &mut Vec<&'a str>,
    ) -> Result<(), LabError> {
        if ancestors.contains(&catalog.id.as_str()) {
            return Err(LabError::ConfigParse(format!(
                "catalog {} is its own ancestor",
                catalog.id
            )));
        }
        ancestors.push(catalog.id.as_str());
        for child in &catalog.catalogs {
            self.check_acyclic(self.catalog(child)?, ancestors)?;
        }
        ancestors.pop();
        Ok(())
    }

    pub fn root_catalog(&self) -> Result<&CatalogDefinition, LabError> {
        self.catalogs
            .first()
            .ok_or_else(|| LabError::DefinitionNotFound("root catalog".to_string()))
    }

    pub fn catalog(&self, id: &str) -> Result<&CatalogDefinition, LabError> {
        self.catalogs
            .iter()
            .find(|catalog| catalog.id == id || catalog.short_id() == id)
            .ok_or_else(|| LabError::DefinitionNotFound(id.to_string()))
    }

    /// Looks a collection up by full or short id.
    pub fn collection(&self, id: &str) -> Result<&CollectionDefinition, LabError> {
        self.collections
            .iter()
            .find(|collection| collection.id == id || collection.short_id() == id)
            .ok_or_else(|| LabError::DefinitionNotFound(id.to_string()))
    }

    pub fn collection_ids(&self) -> Vec<&str> {
        self.collections
            .iter()
            .map(|collection| collection.short_id())
            .collect()
    }

    /// Chain of catalog ids from the root down to the catalog holding the
    /// collection.
    pub fn parent_path(&self, collection_id: &str) -> Result<Vec<&str>, LabError> {
        let collection = self.collection(collection_id)?;
        let root = self.root_catalog()?;
        let mut path = Vec::new();
        let mut visited = HashSet::new();
        if self.find_path(root, &collection.id, &mut path, &mut visited) {
            Ok(path)
        } else {
            Err(LabError::DefinitionNotFound(format!(
                "no catalog holds collection {}",
                collection.id
            )))
        }
    }

    fn find_path<'a>(
        &'a self,
        catalog: &'a CatalogDefinition,
        collection_id: &str,
        path: &mut Vec<&'a str>,
        visited: &mut HashSet<&'a str>,
    ) -> bool {
        if !visited.insert(catalog.id.as_str()) {
            return false;
        }
        path.push(catalog.short_id());
        if catalog.collections.iter().any(|id| {
            id == collection_id || short_id(id) == short_id(collection_id)
        }) {
            return true;
        }
        for child in &catalog.catalogs {
            if let Ok(child) = self.catalog(child) {
                if self.find_path(child, collection_id, path, visited) {
                    return true;
                }
            }
        }
        path.pop();
        false
    }

    /// `<source_dir>/<child catalogs...>/<collection>/<collection>.json`.
    /// The root catalog is not part of the path.
    pub fn source_collection_file(
        &self,
        source_dir: &Utf8Path,
        collection_id: &str,
    ) -> Result<Utf8PathBuf, LabError> {
        let collection = self.collection(collection_id)?;
        let mut dir = source_dir.to_path_buf();
        for segment in self.parent_path(collection_id)?.into_iter().skip(1) {
            dir.push(segment);
        }
        dir.push(collection.short_id());
        Ok(dir.join(format!("{}.json", collection.short_id())))
    }
}

pub fn short_id(id: &str) -> &str {
    id.rsplit(':').next().unwrap_or(id)
}

fn default_license() -> String {
    "proprietary".to_string()
}
