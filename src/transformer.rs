//! Source metadata to STAC transformation contract.
//!
//! A [`Transformer`] turns records of one source schema into STAC items and a
//! harvested [`SourceCollection`] into a STAC collection. The default methods
//! implement the composition algorithm; schema modules override identity,
//! geometry, bbox, assets and base properties.
//!
//! Extension accessors are split by the object type they serve:
//! `*_properties` blocks are merged into item properties, `*_fields` blocks
//! are flattened into collection documents. Calling either with a target of
//! another kind is a caller bug and fails with
//! [`LabError::InvalidObjectType`].

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::definitions::{CatalogDefinition, CollectionDefinition, ItemDefinition};
use crate::domain::{Extension, ObjectType, RawRecord, SourceCollection, file_name_from_url};
use crate::error::LabError;
use crate::stac::{
    Asset, Bbox, Collection, Extent, ExtensionFields, Geometry, Item, PropertyMap, STAC_VERSION,
    merge_namespaced,
};

/// Typed view over one raw product record of a given schema.
pub trait MetadataRecord: Any + fmt::Debug + Send + Sync {
    /// URL of the product's primary data file.
    fn download_url(&self) -> &str;
    fn as_any(&self) -> &dyn Any;
}

/// Deserializes a raw record into a schema record type. Either every
/// required field is present and well-typed, or the whole record fails.
pub fn parse_typed<T: DeserializeOwned>(raw: &RawRecord, schema_name: &str) -> Result<T, LabError> {
    serde_json::from_value(Value::Object(raw.clone())).map_err(|err| LabError::RecordParse {
        schema: schema_name.to_string(),
        message: err.to_string(),
    })
}

pub fn downcast_record<'a, T: MetadataRecord>(
    record: &'a dyn MetadataRecord,
    schema_name: &str,
) -> Result<&'a T, LabError> {
    record
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| LabError::RecordTypeMismatch(schema_name.to_string()))
}

/// The entity an extension accessor is asked about.
#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
    Item {
        record: &'a dyn MetadataRecord,
        definition: Option<&'a ItemDefinition>,
    },
    Collection {
        collection: &'a SourceCollection,
        definition: Option<&'a CollectionDefinition>,
    },
    Catalog {
        definition: &'a CatalogDefinition,
    },
}

impl Target<'_> {
    pub fn object_type(&self) -> ObjectType {
        match self {
            Target::Item { .. } => ObjectType::Item,
            Target::Collection { .. } => ObjectType::Collection,
            Target::Catalog { .. } => ObjectType::Catalog,
        }
    }

    fn invalid(&self, operation: &'static str) -> LabError {
        LabError::InvalidObjectType {
            operation,
            object_type: self.object_type(),
        }
    }
}

pub trait Transformer: Send + Sync {
    fn schema_name(&self) -> &str;

    fn parse_record(&self, raw: &RawRecord) -> Result<Box<dyn MetadataRecord>, LabError>;

    fn item_id(
        &self,
        _record: &dyn MetadataRecord,
        definition: Option<&ItemDefinition>,
    ) -> Result<String, LabError> {
        definition
            .map(|definition| definition.id.clone())
            .ok_or(LabError::MissingDefinition("item"))
    }

    fn collection_id(
        &self,
        collection: &SourceCollection,
        definition: Option<&CollectionDefinition>,
    ) -> String {
        definition
            .map(|definition| definition.id.clone())
            .unwrap_or_else(|| collection.id.clone())
    }

    /// Local copy of the record's data file under `<data_dir>/data/`.
    fn data_file(&self, record: &dyn MetadataRecord, data_dir: &Path) -> Option<PathBuf> {
        file_name_from_url(record.download_url()).map(|name| data_dir.join("data").join(name))
    }

    /// Never fails on extraction problems; only a record of the wrong schema
    /// is an error.
    fn geometry(
        &self,
        _record: &dyn MetadataRecord,
        definition: Option<&ItemDefinition>,
        _data_dir: Option<&Path>,
    ) -> Result<Option<Geometry>, LabError> {
        Ok(definition.and_then(|definition| definition.geometry.clone()))
    }

    fn bbox(
        &self,
        _record: &dyn MetadataRecord,
        definition: Option<&ItemDefinition>,
    ) -> Result<Option<Bbox>, LabError> {
        Ok(definition.and_then(|definition| definition.bbox))
    }

    fn item_assets(
        &self,
        _record: &dyn MetadataRecord,
        definition: Option<&ItemDefinition>,
    ) -> Result<BTreeMap<String, Asset>, LabError> {
        Ok(definition
            .map(|definition| definition.assets.clone())
            .unwrap_or_default())
    }

    /// Base properties block. Implementations merge values extracted from
    /// the local data file over their own, key by key.
    fn properties(
        &self,
        record: &dyn MetadataRecord,
        definition: Option<&ItemDefinition>,
        data_dir: Option<&Path>,
    ) -> Result<PropertyMap, LabError>;

    /// Solar system targets of an item.
    fn item_targets(&self, _record: &dyn MetadataRecord) -> Vec<String> {
        Vec::new()
    }

    fn extensions(&self, target: Target<'_>) -> Result<Vec<Extension>, LabError> {
        match target {
            Target::Item { .. } => Ok(vec![Extension::Ssys]),
            Target::Collection { definition, .. } => match definition {
                Some(definition) => definition.stac_extensions(),
                None => Ok(Vec::new()),
            },
            Target::Catalog { definition } => definition
                .extensions
                .iter()
                .map(|name| name.parse())
                .collect(),
        }
    }

    fn ssys_properties(&self, target: Target<'_>) -> Result<Option<ExtensionFields>, LabError> {
        match target {
            Target::Item { record, .. } => Ok(Some(
                ExtensionFields::new(Extension::Ssys).with("targets", self.item_targets(record)),
            )),
            Target::Collection { .. } | Target::Catalog { .. } => {
                Err(target.invalid("ssys properties"))
            }
        }
    }

    fn ssys_fields(&self, target: Target<'_>) -> Result<ExtensionFields, LabError> {
        match target {
            Target::Collection { definition, .. } => {
                let definition = definition.ok_or(LabError::MissingDefinition("collection"))?;
                Ok(ExtensionFields::new(Extension::Ssys)
                    .with("targets", definition.ssys_targets.clone()))
            }
            Target::Item { .. } | Target::Catalog { .. } => Err(target.invalid("ssys fields")),
        }
    }

    fn sci_properties(&self, target: Target<'_>) -> Result<Option<ExtensionFields>, LabError> {
        match target {
            Target::Item { .. } => Ok(None),
            Target::Collection { .. } | Target::Catalog { .. } => {
                Err(target.invalid("sci properties"))
            }
        }
    }

    /// Publications are rendered as plain JSON objects.
    fn sci_fields(&self, target: Target<'_>) -> Result<ExtensionFields, LabError> {
        match target {
            Target::Collection { definition, .. } => {
                let definition = definition.ok_or(LabError::MissingDefinition("collection"))?;
                let fields = ExtensionFields::new(Extension::Sci);
                if definition.sci_publications.is_empty() {
                    return Ok(fields);
                }
                let publications = serde_json::to_value(&definition.sci_publications)
                    .map_err(|err| LabError::Serialize(err.to_string()))?;
                Ok(fields.with("publications", publications))
            }
            Target::Item { .. } | Target::Catalog { .. } => Err(target.invalid("sci fields")),
        }
    }

    fn processing_properties(
        &self,
        target: Target<'_>,
    ) -> Result<Option<ExtensionFields>, LabError> {
        match target {
            Target::Item { .. } => Ok(None),
            Target::Collection { .. } | Target::Catalog { .. } => {
                Err(target.invalid("processing properties"))
            }
        }
    }

    fn processing_fields(&self, target: Target<'_>) -> Result<ExtensionFields, LabError> {
        match target {
            Target::Collection { definition, .. } => {
                let definition = definition.ok_or(LabError::MissingDefinition("collection"))?;
                let fields = ExtensionFields::new(Extension::Processing);
                Ok(match &definition.processing_level {
                    Some(level) => fields.with("level", level.clone()),
                    None => fields,
                })
            }
            Target::Item { .. } | Target::Catalog { .. } => {
                Err(target.invalid("processing fields"))
            }
        }
    }

    fn extension_properties(
        &self,
        extension: Extension,
        target: Target<'_>,
    ) -> Result<Option<ExtensionFields>, LabError> {
        match extension {
            Extension::Ssys => self.ssys_properties(target),
            Extension::Sci => self.sci_properties(target),
            Extension::Processing => self.processing_properties(target),
        }
    }

    fn extension_fields(
        &self,
        extension: Extension,
        target: Target<'_>,
    ) -> Result<ExtensionFields, LabError> {
        match extension {
            Extension::Ssys => self.ssys_fields(target),
            Extension::Sci => self.sci_fields(target),
            Extension::Processing => self.processing_fields(target),
        }
    }

    fn transform_item(
        &self,
        record: &dyn MetadataRecord,
        definition: Option<&ItemDefinition>,
        collection_id: Option<&str>,
        data_dir: Option<&Path>,
    ) -> Result<Item, LabError> {
        let target = Target::Item { record, definition };
        let extensions = self.extensions(target)?;

        let id = self.item_id(record, definition)?;
        let geometry = self.geometry(record, definition, data_dir)?;
        let bbox = self.bbox(record, definition)?;
        let base = self.properties(record, definition, data_dir)?;
        let mut blocks = Vec::new();
        for extension in &extensions {
            if let Some(block) = self.extension_properties(*extension, target)? {
                blocks.push(block);
            }
        }
        let properties = merge_namespaced(base, blocks)?;
        let assets = self.item_assets(record, definition)?;

        Ok(Item {
            object_type: "Feature".to_string(),
            stac_version: STAC_VERSION.to_string(),
            stac_extensions: schema_uris(&extensions),
            id,
            geometry,
            bbox,
            properties,
            links: Vec::new(),
            assets,
            collection: collection_id.map(str::to_string),
        })
    }

    fn transform_collection(
        &self,
        collection: &SourceCollection,
        definition: Option<&CollectionDefinition>,
    ) -> Result<Collection, LabError> {
        let target = Target::Collection {
            collection,
            definition,
        };
        let extensions = self.extensions(target)?;
        let id = self.collection_id(collection, definition);

        let mut blocks = Vec::new();
        for extension in &extensions {
            blocks.push(self.extension_fields(*extension, target)?);
        }
        let extra_fields = merge_namespaced(PropertyMap::new(), blocks)?;

        Ok(Collection {
            object_type: "Collection".to_string(),
            stac_version: STAC_VERSION.to_string(),
            stac_extensions: schema_uris(&extensions),
            id,
            title: definition.map(|definition| definition.title.clone()),
            description: definition
                .map(|definition| definition.description.clone())
                .unwrap_or_default(),
            keywords: definition
                .map(|definition| definition.keywords.clone())
                .unwrap_or_default(),
            license: definition
                .map(|definition| definition.license.clone())
                .unwrap_or_else(|| "proprietary".to_string()),
            providers: definition
                .map(|definition| definition.providers.clone())
                .unwrap_or_default(),
            extent: Extent::default(),
            summaries: definition.and_then(|definition| definition.summaries.clone()),
            links: Vec::new(),
            assets: BTreeMap::new(),
            extra_fields,
        })
    }
}

pub fn schema_uris(extensions: &[Extension]) -> Vec<String> {
    extensions
        .iter()
        .map(|extension| extension.schema_uri().to_string())
        .collect()
}
