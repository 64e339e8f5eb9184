//! Writes a self-contained STAC catalog from harvested source collections.
//!
//! Layout under the STAC directory, with relative links throughout:
//!
//! ```text
//! catalog.json
//! <child>/catalog.json
//! <child>/<collection>/collection.json
//! <child>/<collection>/<item>/<item>.json
//! ```

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::definitions::{CatalogDefinition, Definitions, short_id};
use crate::domain::Extension;
use crate::error::LabError;
use crate::fs_util::write_json_atomic;
use crate::psup::{ParsePolicy, data_dir, read_collection_metadata, read_products_metadata};
use crate::registry::TransformerRegistry;
use crate::stac::{
    Catalog, Collection, ExtensionFields, Extent, Item, Link, PropertyMap, STAC_VERSION,
    merge_namespaced,
};
use crate::transformer::schema_uris;

/// Which products of each collection become items.
#[derive(Debug, Clone, Copy, Default)]
pub struct ItemWindow {
    pub start: usize,
    pub max_items: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionSummary {
    pub id: String,
    pub path: Utf8PathBuf,
    pub items: usize,
    pub skipped_records: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildSummary {
    pub stac_dir: Utf8PathBuf,
    pub catalogs: usize,
    pub collections: Vec<CollectionSummary>,
}

struct BuiltCollection {
    segments: Vec<String>,
    collection: Collection,
    items: Vec<Item>,
    skipped_records: usize,
}

/// Rebuilds the STAC directory from scratch.
pub fn build_catalog(
    definitions: &Definitions,
    source_files: &[PathBuf],
    registry: &TransformerRegistry,
    stac_dir: &Utf8Path,
    window: ItemWindow,
) -> Result<BuildSummary, LabError> {
    let mut built = Vec::with_capacity(source_files.len());
    for source_file in source_files {
        built.push(build_collection(definitions, source_file, registry, window)?);
    }

    if stac_dir.as_std_path().exists() {
        fs::remove_dir_all(stac_dir.as_std_path())
            .map_err(|err| LabError::Filesystem(err.to_string()))?;
    }

    let mut collection_links: BTreeMap<Vec<String>, Vec<Link>> = BTreeMap::new();
    let mut summaries = Vec::with_capacity(built.len());
    for entry in built {
        let (parent, name) = entry.segments.split_at(entry.segments.len() - 1);
        collection_links
            .entry(parent.to_vec())
            .or_default()
            .push(Link::json("child", format!("./{}/collection.json", name[0])));
        summaries.push(write_collection(stac_dir, entry)?);
    }

    let catalogs = catalog_tree(definitions)?;
    for (definition, segments) in &catalogs {
        let children = catalog_children(definitions, definition);
        let extra = collection_links.remove(segments).unwrap_or_default();
        write_catalog(stac_dir, definition, segments, children, extra)?;
    }
    for (segments, _) in collection_links {
        warn!(catalog = %segments.join("/"), "collections placed under an undefined catalog");
    }

    info!(stac_dir = %stac_dir, catalogs = catalogs.len(), collections = summaries.len(), "catalog written");
    Ok(BuildSummary {
        stac_dir: stac_dir.to_path_buf(),
        catalogs: catalogs.len(),
        collections: summaries,
    })
}

fn build_collection(
    definitions: &Definitions,
    source_file: &Path,
    registry: &TransformerRegistry,
    window: ItemWindow,
) -> Result<BuiltCollection, LabError> {
    let source = read_collection_metadata(source_file)?;
    let definition = definitions.collection(&source.id)?;
    let transformer = registry.create_transformer(&source.schema_name)?;
    info!(collection = %definition.id, schema = %source.schema_name, "building collection");

    let mut collection = transformer.transform_collection(&source, Some(definition))?;
    let batch = read_products_metadata(source_file, registry, ParsePolicy::Skip)?;
    let data_dir = data_dir(source_file);

    let records = batch.records.iter().skip(window.start);
    let records: Vec<_> = match window.max_items {
        Some(max) => records.take(max).collect(),
        None => records.collect(),
    };
    let mut items = Vec::with_capacity(records.len());
    for record in records {
        let item = transformer.transform_item(
            record.as_ref(),
            None,
            Some(&collection.id),
            Some(&data_dir),
        )?;
        debug!(item = %item.id, "transformed product");
        items.push(item);
    }
    if let Some(extent) = Extent::from_items(&items) {
        collection.extent = extent;
    }

    let mut segments: Vec<String> = definitions
        .parent_path(&definition.id)?
        .into_iter()
        .skip(1)
        .map(str::to_string)
        .collect();
    segments.push(definition.short_id().to_string());

    Ok(BuiltCollection {
        segments,
        collection,
        items,
        skipped_records: batch.failures.len(),
    })
}

fn write_collection(
    stac_dir: &Utf8Path,
    entry: BuiltCollection,
) -> Result<CollectionSummary, LabError> {
    let BuiltCollection {
        segments,
        mut collection,
        items,
        skipped_records,
    } = entry;
    let dir = join_segments(stac_dir, &segments);
    let depth = segments.len();
    let item_count = items.len();

    collection.links = vec![
        Link::json("root", root_href(depth)),
        Link::json("parent", "../catalog.json"),
    ];
    for item in &items {
        collection
            .links
            .push(Link::json("item", format!("./{0}/{0}.json", item.id)));
    }

    for mut item in items {
        item.links = vec![
            Link::json("root", root_href(depth + 1)),
            Link::json("parent", "../collection.json"),
            Link::json("collection", "../collection.json"),
        ];
        let path = dir.join(&item.id).join(format!("{}.json", item.id));
        write_json_atomic(path.as_std_path(), &item)?;
    }

    let path = dir.join("collection.json");
    write_json_atomic(path.as_std_path(), &collection)?;
    Ok(CollectionSummary {
        id: collection.id,
        path,
        items: item_count,
        skipped_records,
    })
}

/// Catalogs reachable from the root, with their directory segments. The
/// root has no segment.
fn catalog_tree(
    definitions: &Definitions,
) -> Result<Vec<(&CatalogDefinition, Vec<String>)>, LabError> {
    let root = definitions.root_catalog()?;
    let mut tree = Vec::new();
    let mut visited = HashSet::new();
    let mut stack = vec![(root, Vec::new())];
    while let Some((definition, segments)) = stack.pop() {
        if !visited.insert(definition.id.as_str()) {
            continue;
        }
        for child in definition.catalogs.iter().rev() {
            let child = definitions.catalog(child)?;
            let mut child_segments = segments.clone();
            child_segments.push(child.short_id().to_string());
            stack.push((child, child_segments));
        }
        tree.push((definition, segments));
    }
    Ok(tree)
}

fn catalog_children(definitions: &Definitions, definition: &CatalogDefinition) -> Vec<Link> {
    definition
        .catalogs
        .iter()
        .map(|child| {
            let name = definitions
                .catalog(child)
                .map(|child| child.short_id())
                .unwrap_or_else(|_| short_id(child));
            Link::json("child", format!("./{name}/catalog.json"))
        })
        .collect()
}

fn write_catalog(
    stac_dir: &Utf8Path,
    definition: &CatalogDefinition,
    segments: &[String],
    children: Vec<Link>,
    collections: Vec<Link>,
) -> Result<(), LabError> {
    let depth = segments.len();
    let mut links = vec![Link::json("root", root_href(depth))];
    if depth > 0 {
        links.push(Link::json("parent", "../catalog.json"));
    }
    links.extend(children);
    links.extend(collections);

    let extensions: Vec<Extension> = definition
        .extensions
        .iter()
        .map(|name| name.parse())
        .collect::<Result<_, _>>()?;
    let ssys = ExtensionFields::new(Extension::Ssys).with("targets", definition.ssys_targets.clone());
    let catalog = Catalog {
        object_type: "Catalog".to_string(),
        stac_version: STAC_VERSION.to_string(),
        stac_extensions: schema_uris(&extensions),
        id: definition.id.clone(),
        title: Some(definition.title.clone()),
        description: definition.description.clone(),
        links,
        extra_fields: merge_namespaced(PropertyMap::new(), [ssys])?,
    };

    let path = join_segments(stac_dir, segments).join("catalog.json");
    write_json_atomic(path.as_std_path(), &catalog)
}

fn join_segments(base: &Utf8Path, segments: &[String]) -> Utf8PathBuf {
    let mut path = base.to_path_buf();
    for segment in segments {
        path.push(segment);
    }
    path
}

fn root_href(depth: usize) -> String {
    if depth == 0 {
        "./catalog.json".to_string()
    } else {
        format!("{}catalog.json", "../".repeat(depth))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_href_climbs_to_stac_dir() {
        assert_eq!(root_href(0), "./catalog.json");
        assert_eq!(root_href(2), "../../catalog.json");
    }
}
