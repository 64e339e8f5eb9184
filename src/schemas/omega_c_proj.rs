//! Mars Express OMEGA L3 cubes projected on a cylindrical grid.

use std::any::Any;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::definitions::ItemDefinition;
use crate::domain::{RawRecord, file_stem, normalize_longitude};
use crate::error::LabError;
use crate::extract::{DataExtractor, extract_footprint, extract_properties};
use crate::stac::{Asset, Bbox, Geometry, Properties, PropertyMap};
use crate::transformer::{MetadataRecord, Transformer, downcast_record, parse_typed};

use super::{lenient_f64, lenient_string, utc_datetime};

pub const OMEGA_C_PROJ: &str = "OMEGA_C_PROJ";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OmegaCProjRecord {
    #[serde(deserialize_with = "lenient_string")]
    pub orbit_number: String,
    #[serde(deserialize_with = "lenient_string")]
    pub cube_number: String,
    pub download_sav: String,
    pub sav_human_file_size: String,
    pub download_nc: String,
    pub nc_human_file_size: String,
    #[serde(deserialize_with = "utc_datetime")]
    pub start_date: String,
    #[serde(deserialize_with = "utc_datetime")]
    pub end_date: String,
    #[serde(deserialize_with = "lenient_f64")]
    pub solar_longitude: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub easternmost_longitude: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub westernmost_longitude: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub maximum_latitude: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub minimum_latitude: f64,
    #[serde(deserialize_with = "lenient_string")]
    pub data_quality_id: String,
}

impl MetadataRecord for OmegaCProjRecord {
    fn download_url(&self) -> &str {
        &self.download_sav
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct OmegaCProjTransformer {
    extractor: Arc<dyn DataExtractor>,
}

impl OmegaCProjTransformer {
    pub fn new(extractor: Arc<dyn DataExtractor>) -> Self {
        Self { extractor }
    }

    fn record<'a>(&self, record: &'a dyn MetadataRecord) -> Result<&'a OmegaCProjRecord, LabError> {
        downcast_record(record, OMEGA_C_PROJ)
    }
}

impl Transformer for OmegaCProjTransformer {
    fn schema_name(&self) -> &str {
        OMEGA_C_PROJ
    }

    fn parse_record(&self, raw: &RawRecord) -> Result<Box<dyn MetadataRecord>, LabError> {
        let record: OmegaCProjRecord = parse_typed(raw, OMEGA_C_PROJ)?;
        Ok(Box::new(record))
    }

    /// NetCDF file stem, e.g. `0018_0`.
    fn item_id(
        &self,
        record: &dyn MetadataRecord,
        _definition: Option<&ItemDefinition>,
    ) -> Result<String, LabError> {
        Ok(file_stem(&self.record(record)?.download_nc).to_string())
    }

    fn geometry(
        &self,
        record: &dyn MetadataRecord,
        _definition: Option<&ItemDefinition>,
        data_dir: Option<&Path>,
    ) -> Result<Option<Geometry>, LabError> {
        let Some(data_dir) = data_dir else {
            return Ok(None);
        };
        Ok(self
            .data_file(record, data_dir)
            .and_then(|path| extract_footprint(self.extractor.as_ref(), &path, OMEGA_C_PROJ)))
    }

    fn bbox(
        &self,
        record: &dyn MetadataRecord,
        _definition: Option<&ItemDefinition>,
    ) -> Result<Option<Bbox>, LabError> {
        let record = self.record(record)?;
        Ok(Some([
            normalize_longitude(record.westernmost_longitude),
            record.minimum_latitude,
            normalize_longitude(record.easternmost_longitude),
            record.maximum_latitude,
        ]))
    }

    fn item_assets(
        &self,
        record: &dyn MetadataRecord,
        definition: Option<&ItemDefinition>,
    ) -> Result<BTreeMap<String, Asset>, LabError> {
        let cube = self.record(record)?;
        let id = self.item_id(record, definition)?;
        let mut nc = Asset::data(&cube.download_nc, id.as_str(), "application/netcdf");
        nc.description = Some("NetCDF4 data file".to_string());
        let mut sav = Asset::data(&cube.download_sav, id, "application/octet-stream");
        sav.description = Some("IDL SAV data file".to_string());
        Ok(BTreeMap::from([
            ("nc_data_file".to_string(), nc),
            ("sav_data_file".to_string(), sav),
        ]))
    }

    fn properties(
        &self,
        record: &dyn MetadataRecord,
        _definition: Option<&ItemDefinition>,
        data_dir: Option<&Path>,
    ) -> Result<PropertyMap, LabError> {
        let cube = self.record(record)?;
        let mut extra = PropertyMap::new();
        for (key, value) in [
            ("orbit_number", &cube.orbit_number),
            ("cube_number", &cube.cube_number),
            ("data_quality_id", &cube.data_quality_id),
        ] {
            extra.insert(key.to_string(), Value::from(value.as_str()));
        }
        extra.insert("solar_longitude".to_string(), Value::from(cube.solar_longitude));

        let properties = Properties {
            datetime: Some(cube.start_date.clone()),
            start_datetime: Some(cube.start_date.clone()),
            end_datetime: Some(cube.end_date.clone()),
            mission: Some("Mars Express".to_string()),
            platform: Some("MEX".to_string()),
            instruments: Some(vec!["OMEGA".to_string()]),
            extra,
            ..Properties::default()
        };
        let mut map = properties.to_map()?;

        if let Some(data_dir) = data_dir {
            let extracted = self
                .data_file(record, data_dir)
                .and_then(|path| extract_properties(self.extractor.as_ref(), &path, OMEGA_C_PROJ));
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

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;
    use crate::extract::NullExtractor;

    fn raw() -> RawRecord {
        json!({
            "uri": "http://localhost:8282/ds/omega_c_proj/records/1",
            "id": "1",
            "orbit_number": "18",
            "cube_number": "0",
            "download_sav": "http://psup.ias.u-psud.fr/sitools/datastorage/user/storage/omegacubes/cubes_L3/0018_0.sav",
            "sav_human_file_size": "2.4 MB",
            "download_nc": "http://psup.ias.u-psud.fr/sitools/datastorage/user/storage/omegacubes/cubes_L3/0018_0.nc",
            "nc_human_file_size": "1.8 MB",
            "start_date": "2004-01-14T00:19:12.032",
            "end_date": "2004-01-14T00:23:03.059",
            "solar_longitude": "333.063",
            "easternmost_longitude": "322.961",
            "westernmost_longitude": "318.133",
            "maximum_latitude": "-54.5625",
            "minimum_latitude": "-60.0",
            "data_quality_id": "3"
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[test]
    fn item_from_record() {
        let transformer = OmegaCProjTransformer::new(Arc::new(NullExtractor));
        let record = transformer.parse_record(&raw()).unwrap();
        assert!(record.download_url().ends_with("0018_0.sav"));

        let item = transformer
            .transform_item(record.as_ref(), None, Some("urn:pdssp:ias:collection:omega_c_proj"), None)
            .unwrap();
        assert_eq!(item.id, "0018_0");
        let bbox = item.bbox.unwrap();
        let expected = [318.133 - 360.0, -60.0, 322.961 - 360.0, -54.5625];
        for (actual, expected) in bbox.iter().zip(expected) {
            assert!((actual - expected).abs() < 1e-9, "{bbox:?}");
        }
        assert_eq!(item.datetime(), Some("2004-01-14T00:19:12.032Z"));
        assert_eq!(item.properties["start_datetime"], json!("2004-01-14T00:19:12.032Z"));
        assert_eq!(item.properties["end_datetime"], json!("2004-01-14T00:23:03.059Z"));
        assert_eq!(item.properties["instruments"], json!(["OMEGA"]));
        assert_eq!(item.properties["ssys:targets"], json!(["Mars"]));

        let nc = &item.assets["nc_data_file"];
        assert_eq!(nc.title.as_deref(), Some("0018_0"));
        assert_eq!(nc.description.as_deref(), Some("NetCDF4 data file"));
        let sav = &item.assets["sav_data_file"];
        assert_eq!(sav.media_type.as_deref(), Some("application/octet-stream"));
        assert_eq!(sav.description.as_deref(), Some("IDL SAV data file"));
    }

    #[test]
    fn unreadable_start_date_fails_record() {
        let transformer = OmegaCProjTransformer::new(Arc::new(NullExtractor));
        let mut raw = raw();
        raw.insert("start_date".to_string(), json!("yesterday"));
        assert_matches!(
            transformer.parse_record(&raw).err(),
            Some(LabError::RecordParse { schema, .. }) if schema == OMEGA_C_PROJ
        );
    }
}
