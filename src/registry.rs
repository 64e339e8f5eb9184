//! Schema name to transformer factory lookup.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, warn};

use crate::error::LabError;
use crate::transformer::Transformer;

pub type TransformerFactory = Box<dyn Fn() -> Box<dyn Transformer> + Send + Sync>;

/// Maps metadata schema names to transformer factories. Every lookup builds
/// a fresh transformer instance.
#[derive(Default)]
pub struct TransformerRegistry {
    factories: BTreeMap<String, TransformerFactory>,
}

impl fmt::Debug for TransformerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformerRegistry")
            .field("schemas", &self.schema_names())
            .finish()
    }
}

impl TransformerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails when the schema name is already taken; use [`Self::replace`] to
    /// overwrite an entry on purpose.
    pub fn register<F>(&mut self, schema_name: &str, factory: F) -> Result<(), LabError>
    where
        F: Fn() -> Box<dyn Transformer> + Send + Sync + 'static,
    {
        if self.factories.contains_key(schema_name) {
            return Err(LabError::SchemaAlreadyRegistered(schema_name.to_string()));
        }
        debug!(schema = schema_name, "registering transformer");
        self.factories.insert(schema_name.to_string(), Box::new(factory));
        Ok(())
    }

    pub fn replace<F>(&mut self, schema_name: &str, factory: F)
    where
        F: Fn() -> Box<dyn Transformer> + Send + Sync + 'static,
    {
        if self
            .factories
            .insert(schema_name.to_string(), Box::new(factory))
            .is_some()
        {
            warn!(schema = schema_name, "replacing registered transformer");
        }
    }

    pub fn unregister(&mut self, schema_name: &str) -> bool {
        self.factories.remove(schema_name).is_some()
    }

    pub fn contains(&self, schema_name: &str) -> bool {
        self.factories.contains_key(schema_name)
    }

    pub fn create_transformer(
        &self,
        schema_name: &str,
    ) -> Result<Box<dyn Transformer>, LabError> {
        self.factories
            .get(schema_name)
            .map(|factory| factory())
            .ok_or_else(|| LabError::UnknownSchema(schema_name.to_string()))
    }

    /// Registered schema names, sorted.
    pub fn schema_names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

fn global_registry() -> &'static RwLock<TransformerRegistry> {
    static REGISTRY: OnceLock<RwLock<TransformerRegistry>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(TransformerRegistry::new()))
}

/// Read access to the process-wide registry.
pub fn global() -> RwLockReadGuard<'static, TransformerRegistry> {
    global_registry()
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub fn global_mut() -> RwLockWriteGuard<'static, TransformerRegistry> {
    global_registry()
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Empties the process-wide registry.
pub fn clear_global() {
    *global_mut() = TransformerRegistry::new();
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use assert_matches::assert_matches;

    use super::*;
    use crate::definitions::ItemDefinition;
    use crate::domain::RawRecord;
    use crate::stac::PropertyMap;
    use crate::transformer::MetadataRecord;

    struct Named(&'static str);

    impl Transformer for Named {
        fn schema_name(&self) -> &str {
            self.0
        }

        fn parse_record(&self, _raw: &RawRecord) -> Result<Box<dyn MetadataRecord>, LabError> {
            Err(LabError::RecordParse {
                schema: self.0.to_string(),
                message: "unsupported".to_string(),
            })
        }

        fn properties(
            &self,
            _record: &dyn MetadataRecord,
            _definition: Option<&ItemDefinition>,
            _data_dir: Option<&Path>,
        ) -> Result<PropertyMap, LabError> {
            Ok(PropertyMap::new())
        }
    }

    #[test]
    fn register_then_lookup() {
        let mut registry = TransformerRegistry::new();
        registry
            .register("A", || Box::new(Named("A")) as Box<dyn Transformer>)
            .unwrap();
        assert_eq!(registry.create_transformer("A").unwrap().schema_name(), "A");
        assert_matches!(
            registry.create_transformer("B").err(),
            Some(LabError::UnknownSchema(name)) if name == "B"
        );
    }

    #[test]
    fn duplicate_names_need_replace() {
        let mut registry = TransformerRegistry::new();
        registry
            .register("A", || Box::new(Named("A")) as Box<dyn Transformer>)
            .unwrap();
        let err = registry
            .register("A", || Box::new(Named("other")) as Box<dyn Transformer>)
            .unwrap_err();
        assert_matches!(err, LabError::SchemaAlreadyRegistered(_));
        assert_eq!(registry.create_transformer("A").unwrap().schema_name(), "A");

        registry.replace("A", || Box::new(Named("other")) as Box<dyn Transformer>);
        assert_eq!(registry.create_transformer("A").unwrap().schema_name(), "other");
        assert!(registry.unregister("A"));
        assert!(registry.is_empty());
    }
}
