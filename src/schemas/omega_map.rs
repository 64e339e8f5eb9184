//! Global OMEGA mineral and albedo maps distributed as FITS rasters.

use std::any::Any;
use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::definitions::{CollectionDefinition, ItemDefinition};
use crate::domain::{RawRecord, SourceCollection, file_stem};
use crate::error::LabError;
use crate::stac::{Asset, Bbox, Geometry, Properties, PropertyMap};
use crate::transformer::{MetadataRecord, Transformer, downcast_record, parse_typed};

use super::harvest_time;

pub const OMEGA_MAP: &str = "OMEGA_MAP";

/// Acquisition span of the OMEGA observations merged into the maps.
const MAP_START: &str = "2004-01-08T12:46:15.000Z";
const MAP_END: &str = "2010-08-20T00:46:05.000Z";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OmegaMapRecord {
    pub preview: String,
    pub download: String,
    pub raster_description: String,
    pub raster_name: String,
    pub raster_ldescription: String,
    pub linktopubli: String,
    /// `{"albedo","filled","global"}`
    pub raster_keywords: String,
}

impl OmegaMapRecord {
    pub fn keywords(&self) -> Vec<String> {
        self.raster_keywords
            .trim()
            .trim_start_matches('{')
            .trim_end_matches('}')
            .split(',')
            .map(|keyword| keyword.trim().trim_matches('"').to_string())
            .filter(|keyword| !keyword.is_empty())
            .collect()
    }
}

impl MetadataRecord for OmegaMapRecord {
    fn download_url(&self) -> &str {
        &self.download
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct OmegaMapTransformer;

impl OmegaMapTransformer {
    fn record<'a>(&self, record: &'a dyn MetadataRecord) -> Result<&'a OmegaMapRecord, LabError> {
        downcast_record(record, OMEGA_MAP)
    }
}

impl Transformer for OmegaMapTransformer {
    fn schema_name(&self) -> &str {
        OMEGA_MAP
    }

    fn parse_record(&self, raw: &RawRecord) -> Result<Box<dyn MetadataRecord>, LabError> {
        let record: OmegaMapRecord = parse_typed(raw, OMEGA_MAP)?;
        Ok(Box::new(record))
    }

    fn item_id(
        &self,
        record: &dyn MetadataRecord,
        _definition: Option<&ItemDefinition>,
    ) -> Result<String, LabError> {
        Ok(file_stem(&self.record(record)?.raster_name).to_string())
    }

    fn collection_id(
        &self,
        collection: &SourceCollection,
        _definition: Option<&CollectionDefinition>,
    ) -> String {
        collection.id.clone()
    }

    /// Every map covers the whole planet.
    fn geometry(
        &self,
        _record: &dyn MetadataRecord,
        _definition: Option<&ItemDefinition>,
        _data_dir: Option<&Path>,
    ) -> Result<Option<Geometry>, LabError> {
        Ok(Some(Geometry::polygon(vec![
            [-180.0, -90.0],
            [-180.0, 90.0],
            [180.0, 90.0],
            [180.0, -90.0],
        ])))
    }

    fn bbox(
        &self,
        record: &dyn MetadataRecord,
        definition: Option<&ItemDefinition>,
    ) -> Result<Option<Bbox>, LabError> {
        Ok(self
            .geometry(record, definition, None)?
            .and_then(|geometry| geometry.bbox()))
    }

    fn item_assets(
        &self,
        record: &dyn MetadataRecord,
        _definition: Option<&ItemDefinition>,
    ) -> Result<BTreeMap<String, Asset>, LabError> {
        let map = self.record(record)?;
        let mut preview = Asset::data(&map.preview, "Preview PNG image file", "image/png");
        preview.roles = vec!["thumbnail".to_string()];
        Ok(BTreeMap::from([
            (
                "fits_data_file".to_string(),
                Asset::data(&map.download, "FITS data file", "application/fits"),
            ),
            ("fits_preview_file".to_string(), preview),
        ]))
    }

    fn properties(
        &self,
        record: &dyn MetadataRecord,
        _definition: Option<&ItemDefinition>,
        _data_dir: Option<&Path>,
    ) -> Result<PropertyMap, LabError> {
        let map = self.record(record)?;
        let mut extra = PropertyMap::new();
        extra.insert(
            "description".to_string(),
            Value::from(map.raster_ldescription.trim_matches('"')),
        );
        if !map.linktopubli.is_empty() {
            extra.insert("publication".to_string(), Value::from(map.linktopubli.as_str()));
        }
        let keywords = map.keywords();
        if !keywords.is_empty() {
            extra.insert("keywords".to_string(), Value::from(keywords));
        }

        Properties {
            datetime: Some(harvest_time()),
            start_datetime: Some(MAP_START.to_string()),
            end_datetime: Some(MAP_END.to_string()),
            title: Some(format!(
                "{} Global Map",
                map.raster_description.trim_matches('"')
            )),
            mission: Some("Mars Express".to_string()),
            platform: Some("MEX".to_string()),
            instruments: Some(vec!["OMEGA".to_string()]),
            extra,
            ..Properties::default()
        }
        .to_map()
    }

    fn item_targets(&self, _record: &dyn MetadataRecord) -> Vec<String> {
        vec!["Mars".to_string()]
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn raw() -> RawRecord {
        json!({
            "uri": "http://localhost:8282/pgismarsraster/records/3",
            "preview": "http://psup.ias.u-psud.fr/sitools/datastorage/user/storage/marsdata/omega/png/albedo_filled_reduce.png",
            "download": "http://psup.ias.u-psud.fr/sitools/datastorage/user/storage/marsdata/omega/fits/albedo_filled.fits",
            "raster_description": "\"OMEGA Albedo Filled\"",
            "raster_name": "albedo_filled.fits",
            "raster_ldescription": "\"Global NIR 1-micrometer albedo with filled gaps\"",
            "linktopubli": "http://doi.org/10.1016/j.icarus.2014.10.029",
            "raster_keywords": "{\"albedo\",\"filled\",\"global\"}"
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[test]
    fn item_from_record() {
        let record = OmegaMapTransformer.parse_record(&raw()).unwrap();
        let source = SourceCollection {
            id: "mex_omega_global_maps".to_string(),
            schema_name: OMEGA_MAP.to_string(),
            n_products: 1,
        };
        let collection = OmegaMapTransformer.collection_id(&source, None);
        let item = OmegaMapTransformer
            .transform_item(record.as_ref(), None, Some(collection.as_str()), None)
            .unwrap();

        assert_eq!(item.id, "albedo_filled");
        assert_eq!(item.collection.as_deref(), Some("mex_omega_global_maps"));
        assert_eq!(item.bbox, Some([-180.0, -90.0, 180.0, 90.0]));
        assert_eq!(item.properties["title"], json!("OMEGA Albedo Filled Global Map"));
        assert_eq!(
            item.properties["description"],
            json!("Global NIR 1-micrometer albedo with filled gaps")
        );
        assert_eq!(item.properties["start_datetime"], json!(MAP_START));
        assert_eq!(item.properties["keywords"], json!(["albedo", "filled", "global"]));
        assert_eq!(item.properties["ssys:targets"], json!(["Mars"]));

        let preview = &item.assets["fits_preview_file"];
        assert_eq!(preview.roles, vec!["thumbnail"]);
        assert_eq!(preview.media_type.as_deref(), Some("image/png"));
        assert_eq!(item.assets["fits_data_file"].roles, vec!["data"]);
        assert!(record.download_url().ends_with("albedo_filled.fits"));
    }

    #[test]
    fn empty_keywords_are_dropped() {
        let mut raw = raw();
        raw.insert("raster_keywords".to_string(), json!("{}"));
        let record: OmegaMapRecord = parse_typed(&raw, OMEGA_MAP).unwrap();
        assert!(record.keywords().is_empty());
    }
}
