//! Mars Express OMEGA L2 data cubes.

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

use super::{harvest_time, lenient_f64, lenient_string};

pub const OMEGA_CUBE: &str = "OMEGA_CUBE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OmegaCubeRecord {
    #[serde(deserialize_with = "lenient_string")]
    pub orbit_number: String,
    #[serde(deserialize_with = "lenient_string")]
    pub cube_number: String,
    pub download_sav: String,
    pub sav_human_file_size: String,
    pub download_nc: String,
    pub nc_human_file_size: String,
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
    #[serde(deserialize_with = "lenient_string")]
    pub martian_year: String,
    pub pointing_mode: String,
    pub l_channel_ok: String,
    pub c_channel_ok: String,
    pub vis_channel_ok: String,
    #[serde(deserialize_with = "lenient_string")]
    pub trimmed_orbit_number: String,
}

impl MetadataRecord for OmegaCubeRecord {
    fn download_url(&self) -> &str {
        &self.download_nc
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct OmegaCubeTransformer {
    extractor: Arc<dyn DataExtractor>,
}

impl OmegaCubeTransformer {
    pub fn new(extractor: Arc<dyn DataExtractor>) -> Self {
        Self { extractor }
    }

    fn record<'a>(&self, record: &'a dyn MetadataRecord) -> Result<&'a OmegaCubeRecord, LabError> {
        downcast_record(record, OMEGA_CUBE)
    }
}

impl Transformer for OmegaCubeTransformer {
    fn schema_name(&self) -> &str {
        OMEGA_CUBE
    }

    fn parse_record(&self, raw: &RawRecord) -> Result<Box<dyn MetadataRecord>, LabError> {
        let record: OmegaCubeRecord = parse_typed(raw, OMEGA_CUBE)?;
        Ok(Box::new(record))
    }

    /// `OMEGA_L2_<cube file stem>`, e.g. `OMEGA_L2_0018_6`.
    fn item_id(
        &self,
        record: &dyn MetadataRecord,
        _definition: Option<&ItemDefinition>,
    ) -> Result<String, LabError> {
        let record = self.record(record)?;
        Ok(format!("OMEGA_L2_{}", file_stem(&record.download_nc)))
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
            .and_then(|path| extract_footprint(self.extractor.as_ref(), &path, OMEGA_CUBE)))
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
        _definition: Option<&ItemDefinition>,
    ) -> Result<BTreeMap<String, Asset>, LabError> {
        let record = self.record(record)?;
        Ok(BTreeMap::from([
            (
                "nc_data_file".to_string(),
                Asset::data(&record.download_nc, "NetCDF4 data file", "application/netcdf"),
            ),
            (
                "sav_data_file".to_string(),
                Asset::data(
                    &record.download_sav,
                    "IDL SAV data file",
                    "application/octet-stream",
                ),
            ),
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
            ("martian_year", &cube.martian_year),
            ("pointing_mode", &cube.pointing_mode),
            ("l_channel_ok", &cube.l_channel_ok),
            ("c_channel_ok", &cube.c_channel_ok),
            ("vis_channel_ok", &cube.vis_channel_ok),
            ("trimmed_orbit_number", &cube.trimmed_orbit_number),
        ] {
            extra.insert(key.to_string(), Value::from(value.as_str()));
        }
        extra.insert("solar_longitude".to_string(), Value::from(cube.solar_longitude));

        let properties = Properties {
            datetime: Some(harvest_time()),
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
                .and_then(|path| extract_properties(self.extractor.as_ref(), &path, OMEGA_CUBE));
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
