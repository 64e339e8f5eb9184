//! STAC output documents built by transformers.
//!
//! Items, collections and catalogs serialize to STAC 1.0.0 JSON. Extension
//! fields never live in their own struct field: they are merged into the
//! item `properties` map, or flattened into the collection and catalog
//! documents, under their namespace prefix.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::Extension;
use crate::error::LabError;

pub const STAC_VERSION: &str = "1.0.0";

pub type PropertyMap = Map<String, Value>;

pub type Bbox = [f64; 4];

/// GeoJSON geometry, restricted to the shapes footprints use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Geometry {
    Point { coordinates: [f64; 2] },
    LineString { coordinates: Vec<[f64; 2]> },
    Polygon { coordinates: Vec<Vec<[f64; 2]>> },
    MultiPolygon { coordinates: Vec<Vec<Vec<[f64; 2]>>> },
}

impl Geometry {
    /// Builds a polygon from an exterior ring, closing it when needed.
    pub fn polygon(mut ring: Vec<[f64; 2]>) -> Self {
        if let (Some(first), Some(last)) = (ring.first().copied(), ring.last().copied()) {
            if first != last {
                ring.push(first);
            }
        }
        Geometry::Polygon {
            coordinates: vec![ring],
        }
    }

    /// Bounding box `[west, south, east, north]` of all positions.
    pub fn bbox(&self) -> Option<Bbox> {
        let positions: Vec<[f64; 2]> = match self {
            Geometry::Point { coordinates } => vec![*coordinates],
            Geometry::LineString { coordinates } => coordinates.clone(),
            Geometry::Polygon { coordinates } => coordinates.iter().flatten().copied().collect(),
            Geometry::MultiPolygon { coordinates } => {
                coordinates.iter().flatten().flatten().copied().collect()
            }
        };
        bbox_of(positions.iter().copied())
    }
}

fn bbox_of(positions: impl Iterator<Item = [f64; 2]>) -> Option<Bbox> {
    positions.fold(None, |acc, [lon, lat]| match acc {
        None => Some([lon, lat, lon, lat]),
        Some([w, s, e, n]) => Some([w.min(lon), s.min(lat), e.max(lon), n.max(lat)]),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub href: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Asset {
    pub fn data(href: impl Into<String>, title: impl Into<String>, media_type: &str) -> Self {
        Self {
            href: href.into(),
            title: Some(title.into()),
            description: None,
            media_type: Some(media_type.to_string()),
            roles: vec!["data".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub rel: String,
    pub href: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl Link {
    pub fn json(rel: &str, href: impl Into<String>) -> Self {
        Self {
            rel: rel.to_string(),
            href: href.into(),
            media_type: Some("application/json".to_string()),
            title: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Base properties block (STAC common metadata).
///
/// Every field is always emitted, `null` when unknown. Schema-specific fields
/// go in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Properties {
    pub datetime: Option<String>,
    pub created: Option<String>,
    pub start_datetime: Option<String>,
    pub end_datetime: Option<String>,
    pub title: Option<String>,
    pub mission: Option<String>,
    pub platform: Option<String>,
    pub instruments: Option<Vec<String>>,
    pub gsd: Option<f64>,
    #[serde(flatten)]
    pub extra: PropertyMap,
}

impl Properties {
    pub fn to_map(&self) -> Result<PropertyMap, LabError> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Ok(PropertyMap::new()),
            Err(err) => Err(LabError::Serialize(err.to_string())),
        }
    }
}

/// Fields contributed by one STAC extension, every key carrying the
/// extension's namespace prefix.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtensionFields {
    extension: Extension,
    fields: PropertyMap,
}

impl ExtensionFields {
    pub fn new(extension: Extension) -> Self {
        Self {
            extension,
            fields: PropertyMap::new(),
        }
    }

    /// Inserts a field; a bare name gets the extension prefix.
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        let prefix = self.extension.prefix();
        let key = if name.starts_with(prefix) {
            name.to_string()
        } else {
            format!("{prefix}{name}")
        };
        self.fields.insert(key, value.into());
        self
    }

    pub fn extension(&self) -> Extension {
        self.extension
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn into_map(self) -> PropertyMap {
        self.fields
    }
}

/// Merges extension blocks into a base map, rejecting any key that is
/// already present.
pub fn merge_namespaced(
    mut base: PropertyMap,
    blocks: impl IntoIterator<Item = ExtensionFields>,
) -> Result<PropertyMap, LabError> {
    for block in blocks {
        for (key, value) in block.into_map() {
            if base.contains_key(&key) {
                return Err(LabError::PropertyCollision(key));
            }
            base.insert(key, value);
        }
    }
    Ok(base)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    #[serde(rename = "type")]
    pub object_type: String,
    pub stac_version: String,
    pub stac_extensions: Vec<String>,
    pub id: String,
    pub geometry: Option<Geometry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<Bbox>,
    pub properties: PropertyMap,
    pub links: Vec<Link>,
    pub assets: BTreeMap<String, Asset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
}

impl Item {
    pub fn datetime(&self) -> Option<&str> {
        self.properties.get("datetime").and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialExtent {
    pub bbox: Vec<Bbox>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalExtent {
    pub interval: Vec<[Option<String>; 2]>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub spatial: SpatialExtent,
    pub temporal: TemporalExtent,
}

impl Default for Extent {
    fn default() -> Self {
        Self {
            spatial: SpatialExtent {
                bbox: vec![[-180.0, -90.0, 180.0, 90.0]],
            },
            temporal: TemporalExtent {
                interval: vec![[None, None]],
            },
        }
    }
}

impl Extent {
    /// Union of item bounding boxes and datetimes; `None` without items.
    pub fn from_items(items: &[Item]) -> Option<Self> {
        if items.is_empty() {
            return None;
        }
        let bbox = items
            .iter()
            .filter_map(|item| item.bbox)
            .reduce(|[w, s, e, n], [w2, s2, e2, n2]| {
                [w.min(w2), s.min(s2), e.max(e2), n.max(n2)]
            })
            .unwrap_or([-180.0, -90.0, 180.0, 90.0]);

        // RFC 3339 UTC timestamps sort lexicographically.
        let mut datetimes: Vec<&str> = items.iter().filter_map(Item::datetime).collect();
        datetimes.sort_unstable();
        let interval = [
            datetimes.first().map(|value| value.to_string()),
            datetimes.last().map(|value| value.to_string()),
        ];

        Some(Self {
            spatial: SpatialExtent { bbox: vec![bbox] },
            temporal: TemporalExtent {
                interval: vec![interval],
            },
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    #[serde(rename = "type")]
    pub object_type: String,
    pub stac_version: String,
    pub stac_extensions: Vec<String>,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub description: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub license: String,
    #[serde(default)]
    pub providers: Vec<Provider>,
    pub extent: Extent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summaries: Option<PropertyMap>,
    pub links: Vec<Link>,
    #[serde(default)]
    pub assets: BTreeMap<String, Asset>,
    #[serde(flatten)]
    pub extra_fields: PropertyMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(rename = "type")]
    pub object_type: String,
    pub stac_version: String,
    pub stac_extensions: Vec<String>,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub description: String,
    pub links: Vec<Link>,
    #[serde(flatten)]
    pub extra_fields: PropertyMap,
}
