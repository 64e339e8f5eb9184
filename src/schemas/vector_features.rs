//! PSUP vector datasets (GeoJSON feature files with a rectangular footprint).

use std::any::Any;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::definitions::{CollectionDefinition, ItemDefinition};
use crate::domain::{RawRecord, SourceCollection, file_stem};
use crate::error::LabError;
use crate::extract::{DataExtractor, extract_properties};
use crate::stac::{Asset, Bbox, Geometry, Properties, PropertyMap};
use crate::transformer::{MetadataRecord, Transformer, downcast_record, parse_typed};

use super::harvest_time;

pub const VECTOR_FEATURES: &str = "VECTOR_FEATURES";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorFeaturesRecord {
    pub download: String,
    pub linktopubli: String,
    pub vector_description: String,
    pub vector_name: String,
    /// `((lon,lat),(lon,lat),...)`
    pub vector_footprint: String,
    pub vector_keywords: String,
}

impl MetadataRecord for VectorFeaturesRecord {
    fn download_url(&self) -> &str {
        &self.download
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn point_regex() -> &'static Regex {
    static POINT_RE: OnceLock<Regex> = OnceLock::new();
    POINT_RE.get_or_init(|| {
        Regex::new(r"\(\s*([-+]?[0-9]*\.?[0-9]+(?:[eE][-+]?[0-9]+)?)\s*,\s*([-+]?[0-9]*\.?[0-9]+(?:[eE][-+]?[0-9]+)?)\s*\)")
            .unwrap()
    })
}

/// Parses a footprint ring and closes it.
pub fn parse_footprint(footprint: &str) -> Result<Geometry, LabError> {
    let invalid = |message: String| LabError::RecordParse {
        schema: VECTOR_FEATURES.to_string(),
        message,
    };
    let mut ring = Vec::new();
    for captures in point_regex().captures_iter(footprint) {
        let lon: f64 = captures[1]
            .parse()
            .map_err(|_| invalid(format!("invalid longitude in {footprint:?}")))?;
        let lat: f64 = captures[2]
            .parse()
            .map_err(|_| invalid(format!("invalid latitude in {footprint:?}")))?;
        ring.push([lon, lat]);
    }
    if ring.len() < 3 {
        return Err(invalid(format!("footprint needs at least 3 points: {footprint:?}")));
    }
    Ok(Geometry::polygon(ring))
}

pub struct VectorFeaturesTransformer {
    extractor: Arc<dyn DataExtractor>,
}

impl VectorFeaturesTransformer {
    pub fn new(extractor: Arc<dyn DataExtractor>) -> Self {
        Self { extractor }
    }

    fn record<'a>(
        &self,
        record: &'a dyn MetadataRecord,
    ) -> Result<&'a VectorFeaturesRecord, LabError> {
        downcast_record(record, VECTOR_FEATURES)
    }
}

impl Transformer for VectorFeaturesTransformer {
    fn schema_name(&self) -> &str {
        VECTOR_FEATURES
    }

    fn parse_record(&self, raw: &RawRecord) -> Result<Box<dyn MetadataRecord>, LabError> {
        let record: VectorFeaturesRecord = parse_typed(raw, VECTOR_FEATURES)?;
        parse_footprint(&record.vector_footprint)?;
        Ok(Box::new(record))
    }

    fn item_id(
        &self,
        record: &dyn MetadataRecord,
        _definition: Option<&ItemDefinition>,
    ) -> Result<String, LabError> {
        Ok(file_stem(&self.record(record)?.vector_name).to_string())
    }

    fn collection_id(
        &self,
        collection: &SourceCollection,
        _definition: Option<&CollectionDefinition>,
    ) -> String {
        collection.id.clone()
    }

    fn geometry(
        &self,
        record: &dyn MetadataRecord,
        _definition: Option<&ItemDefinition>,
        _data_dir: Option<&Path>,
    ) -> Result<Option<Geometry>, LabError> {
        parse_footprint(&self.record(record)?.vector_footprint).map(Some)
    }

    fn bbox(
        &self,
        record: &dyn MetadataRecord,
        definition: Option<&ItemDefinition>,
    ) -> Result<Option<Bbox>, LabError> {
        // Footprints are already in [-180, 180] and are not folded.
        Ok(self
            .geometry(record, definition, None)?
            .and_then(|geometry| geometry.bbox()))
    }

    fn item_assets(
        &self,
        record: &dyn MetadataRecord,
        definition: Option<&ItemDefinition>,
    ) -> Result<BTreeMap<String, Asset>, LabError> {
        let vector = self.record(record)?;
        let mut asset = Asset::data(
            &vector.download,
            self.item_id(record, definition)?,
            "application/json",
        );
        asset.description = Some("JSON data file".to_string());
        Ok(BTreeMap::from([("json_data_file".to_string(), asset)]))
    }

    fn properties(
        &self,
        record: &dyn MetadataRecord,
        _definition: Option<&ItemDefinition>,
        data_dir: Option<&Path>,
    ) -> Result<PropertyMap, LabError> {
        let vector = self.record(record)?;
        let description = vector.vector_description.trim_matches('"').to_lowercase();
        let mut extra = PropertyMap::new();
        if !vector.linktopubli.is_empty() {
            extra.insert(
                "publication".to_string(),
                Value::from(vector.linktopubli.as_str()),
            );
        }

        let properties = Properties {
            datetime: Some(harvest_time()),
            title: Some(format!("Locations of \"{description}\"")),
            extra,
            ..Properties::default()
        };
        let mut map = properties.to_map()?;

        if let Some(data_dir) = data_dir {
            let extracted = self
                .data_file(record, data_dir)
                .and_then(|path| extract_properties(self.extractor.as_ref(), &path, VECTOR_FEATURES));
            if let Some(extracted) = extracted {
                map.extend(extracted);
            }
        }
        Ok(map)
    }

    fn item_targets(&self, _record: &dyn MetadataRecord) -> Vec<String> {
        vec!["Mars".to_string()]
    }
}
