//! Geometry and property extraction from downloaded data files.
//!
//! Reading mission file formats is delegated to a [`DataExtractor`].
//! Transformers go through [`extract_footprint`] and [`extract_properties`],
//! which never fail: a missing file or an extractor error is logged and
//! yields no value.

use std::fs;
use std::path::Path;

use serde_json::Value;
use tracing::warn;

use crate::error::LabError;
use crate::stac::{Geometry, PropertyMap};

pub trait DataExtractor: Send + Sync {
    fn footprint(&self, path: &Path, schema_name: &str) -> Result<Option<Geometry>, LabError>;
    fn properties(&self, path: &Path, schema_name: &str) -> Result<PropertyMap, LabError>;
}

/// Extractor for deployments without data-file readers.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullExtractor;

impl DataExtractor for NullExtractor {
    fn footprint(&self, _path: &Path, _schema_name: &str) -> Result<Option<Geometry>, LabError> {
        Ok(None)
    }

    fn properties(&self, _path: &Path, _schema_name: &str) -> Result<PropertyMap, LabError> {
        Ok(PropertyMap::new())
    }
}

/// Reads GeoJSON data files (geometry, `Feature` or `FeatureCollection`).
#[derive(Debug, Clone, Copy, Default)]
pub struct GeoJsonExtractor;

impl GeoJsonExtractor {
    fn read(path: &Path) -> Result<Value, LabError> {
        let content = fs::read_to_string(path).map_err(|err| extraction_error(path, err))?;
        serde_json::from_str(&content).map_err(|err| extraction_error(path, err))
    }
}

impl DataExtractor for GeoJsonExtractor {
    fn footprint(&self, path: &Path, _schema_name: &str) -> Result<Option<Geometry>, LabError> {
        let document = Self::read(path)?;
        match document.get("type").and_then(Value::as_str) {
            Some("Feature") => match document.get("geometry") {
                Some(Value::Null) | None => Ok(None),
                Some(geometry) => serde_json::from_value(geometry.clone())
                    .map(Some)
                    .map_err(|err| extraction_error(path, err)),
            },
            Some("FeatureCollection") => {
                let features = document
                    .get("features")
                    .and_then(Value::as_array)
                    .ok_or_else(|| extraction_error(path, "missing features"))?;
                let bbox = features
                    .iter()
                    .filter_map(|feature| feature.get("geometry"))
                    .filter_map(|geometry| serde_json::from_value::<Geometry>(geometry.clone()).ok())
                    .filter_map(|geometry| geometry.bbox())
                    .reduce(|[w, s, e, n], [w2, s2, e2, n2]| {
                        [w.min(w2), s.min(s2), e.max(e2), n.max(n2)]
                    });
                Ok(bbox.map(|[w, s, e, n]| Geometry::polygon(vec![[w, s], [w, n], [e, n], [e, s]])))
            }
            Some(_) => serde_json::from_value(document)
                .map(Some)
                .map_err(|err| extraction_error(path, err)),
            None => Err(extraction_error(path, "not a GeoJSON document")),
        }
    }

    fn properties(&self, path: &Path, _schema_name: &str) -> Result<PropertyMap, LabError> {
        let document = Self::read(path)?;
        let mut properties = PropertyMap::new();
        match document.get("type").and_then(Value::as_str) {
            Some("Feature") => {
                if let Some(Value::Object(map)) = document.get("properties") {
                    properties.extend(map.clone());
                }
            }
            Some("FeatureCollection") => {
                let count = document
                    .get("features")
                    .and_then(Value::as_array)
                    .map(Vec::len)
                    .unwrap_or(0);
                properties.insert("n_features".to_string(), Value::from(count));
            }
            _ => {}
        }
        Ok(properties)
    }
}

pub fn extract_footprint(
    extractor: &dyn DataExtractor,
    data_file: &Path,
    schema_name: &str,
) -> Option<Geometry> {
    if !data_file.exists() {
        warn!(path = %data_file.display(), "source data file not found");
        return None;
    }
    match extractor.footprint(data_file, schema_name) {
        Ok(geometry) => geometry,
        Err(err) => {
            warn!(path = %data_file.display(), error = %err, "unable to extract footprint geometry");
            None
        }
    }
}

pub fn extract_properties(
    extractor: &dyn DataExtractor,
    data_file: &Path,
    schema_name: &str,
) -> Option<PropertyMap> {
    if !data_file.exists() {
        warn!(path = %data_file.display(), "source data file not found");
        return None;
    }
    match extractor.properties(data_file, schema_name) {
        Ok(properties) => Some(properties),
        Err(err) => {
            warn!(path = %data_file.display(), error = %err, "unable to extract properties");
            None
        }
    }
}

fn extraction_error(path: &Path, err: impl ToString) -> LabError {
    LabError::Extraction {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}
