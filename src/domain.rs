use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::LabError;

/// Raw product record as returned by the catalog service, kept verbatim.
pub type RawRecord = Map<String, Value>;

/// Kind of catalog entity being produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectType {
    Item,
    Collection,
    Catalog,
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectType::Item => write!(f, "item"),
            ObjectType::Collection => write!(f, "collection"),
            ObjectType::Catalog => write!(f, "catalog"),
        }
    }
}

/// A harvested batch of product records, as persisted in the source
/// collection document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCollection {
    pub id: String,
    pub schema_name: String,
    pub n_products: u64,
}

/// STAC extension namespaces a transformer may contribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Extension {
    Ssys,
    Sci,
    Processing,
}

impl Extension {
    pub fn prefix(&self) -> &'static str {
        match self {
            Extension::Ssys => "ssys:",
            Extension::Sci => "sci:",
            Extension::Processing => "processing:",
        }
    }

    pub fn schema_uri(&self) -> &'static str {
        match self {
            Extension::Ssys => "https://raw.githubusercontent.com/thareUSGS/ssys/main/json-schema/schema.json",
            Extension::Sci => "https://stac-extensions.github.io/scientific/v1.0.0/schema.json",
            Extension::Processing => "https://stac-extensions.github.io/processing/v1.1.0/schema.json",
        }
    }
}

impl fmt::Display for Extension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Extension::Ssys => write!(f, "ssys"),
            Extension::Sci => write!(f, "sci"),
            Extension::Processing => write!(f, "processing"),
        }
    }
}

impl FromStr for Extension {
    type Err = LabError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "ssys" => Ok(Extension::Ssys),
            "sci" | "scientific" => Ok(Extension::Sci),
            "processing" => Ok(Extension::Processing),
            _ => Err(LabError::UnknownExtension(value.to_string())),
        }
    }
}

/// Maps a longitude onto the canonical `(-180, 180]` range.
///
/// Computes `((lon + 180) mod 360) - 180` with a Euclidean remainder, then
/// folds the `-180` antimeridian onto `180`.
pub fn normalize_longitude(lon: f64) -> f64 {
    let wrapped = (lon + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped <= -180.0 { 180.0 } else { wrapped }
}

/// Last path segment of a download URL, used as the local file name.
pub fn file_name_from_url(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/').next().filter(|name| !name.is_empty())
}

/// File name without its final extension.
pub fn file_stem(name: &str) -> &str {
    let name = name.rsplit('/').next().unwrap_or(name);
    match name.rfind('.') {
        Some(0) | None => name,
        Some(idx) => &name[..idx],
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn longitude_is_wrapped() {
        assert!((normalize_longitude(322.961) - (322.961 - 360.0)).abs() < 1e-9);
        assert_eq!(normalize_longitude(87.5), 87.5);
        assert_eq!(normalize_longitude(-190.0), 170.0);
        assert_eq!(normalize_longitude(540.0), 180.0);
        assert_eq!(normalize_longitude(-180.0), 180.0);
    }

    #[test]
    fn longitude_normalization_is_idempotent() {
        for lon in [-720.5, -180.0, -0.25, 0.0, 179.999, 180.0, 359.0, 1234.5] {
            let once = normalize_longitude(lon);
            assert!(once > -180.0 && once <= 180.0, "{lon} -> {once}");
            assert!((normalize_longitude(once) - once).abs() < 1e-9);
        }
    }

    #[test]
    fn file_name_from_download_url() {
        let url = "http://psup.ias.u-psud.fr/sitools/datastorage/user/storage/omegacubes/cubes_L2/0006_0.nc";
        assert_eq!(file_name_from_url(url), Some("0006_0.nc"));
        assert_eq!(file_name_from_url("http://host/dir/"), None);
        assert_eq!(file_name_from_url("http://host/a.json?x=1"), Some("a.json"));
    }

    #[test]
    fn stem_strips_last_extension() {
        assert_eq!(file_stem("0018_0.nc"), "0018_0");
        assert_eq!(file_stem("hyd_global_290615.json"), "hyd_global_290615");
        assert_eq!(file_stem("http://host/x/ORB0018_6.nc"), "ORB0018_6");
        assert_eq!(file_stem("noext"), "noext");
    }

    #[test]
    fn extension_names() {
        assert_eq!("scientific".parse::<Extension>().unwrap(), Extension::Sci);
        assert_eq!(Extension::Processing.prefix(), "processing:");
        let err = "eo".parse::<Extension>().unwrap_err();
        assert_matches!(err, LabError::UnknownExtension(_));
    }
}
