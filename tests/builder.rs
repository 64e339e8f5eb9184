use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use assert_matches::assert_matches;
use camino::{Utf8Path, Utf8PathBuf};
use serde_json::{Value, json};

use labtools::builder::{ItemWindow, build_catalog};
use labtools::definitions::Definitions;
use labtools::error::LabError;
use labtools::extract::NullExtractor;
use labtools::registry::TransformerRegistry;
use labtools::schemas::{OMEGA_CUBE, register_all};

const COLLECTION_ID: &str = "urn:pdssp:ias:collection:mex_omega_cubes_rdr";

fn definitions_json() -> Value {
    json!({
        "catalogs": [
            {
                "id": "urn:pdssp:ias:catalog",
                "title": "IAS catalog",
                "description": "PSUP collections",
                "catalogs": ["urn:pdssp:ias:body:mars"]
            },
            {
                "id": "urn:pdssp:ias:body:mars",
                "title": "Mars",
                "description": "Mars collections",
                "extensions": ["ssys"],
                "ssys_targets": ["Mars"],
                "collections": [COLLECTION_ID]
            }
        ],
        "collections": [
            {
                "id": COLLECTION_ID,
                "title": "OMEGA cubes",
                "description": "OMEGA L2 data cubes",
                "license": "CC-BY-4.0",
                "extensions": ["ssys", "processing"],
                "ssys_targets": ["Mars"],
                "processing_level": "L2",
                "source": {
                    "url": "http://psup.ias.u-psud.fr/ds/omega_data_cubes/records",
                    "metadata_schema": OMEGA_CUBE
                }
            }
        ]
    })
}

fn load_definitions(root: &Utf8Path) -> Definitions {
    let path = root.join("definitions.json");
    fs::write(&path, definitions_json().to_string()).unwrap();
    Definitions::load(&path).unwrap()
}

fn omega_record(orbit: &str, cube: &str) -> Value {
    let base = "http://psup.ias.u-psud.fr/sitools/datastorage/user/storage/omegacubes/cubes_L2";
    json!({
        "orbit_number": orbit,
        "cube_number": cube,
        "download_sav": format!("{base}/{orbit}_{cube}.sav"),
        "sav_human_file_size": "66.4 MB",
        "download_nc": format!("{base}/{orbit}_{cube}.nc"),
        "nc_human_file_size": "63.5 MB",
        "solar_longitude": "330.057",
        "easternmost_longitude": "89.693",
        "westernmost_longitude": "87.2129",
        "maximum_latitude": "-42.246098",
        "minimum_latitude": "-56.0966",
        "data_quality_id": "3",
        "martian_year": "26",
        "pointing_mode": "NADIR",
        "l_channel_ok": "t",
        "c_channel_ok": "t",
        "vis_channel_ok": "f",
        "trimmed_orbit_number": orbit.trim_start_matches('0')
    })
}

fn write_source(definitions: &Definitions, source_dir: &Utf8Path, records: Vec<Value>) -> PathBuf {
    let path = definitions
        .source_collection_file(source_dir, "mex_omega_cubes_rdr")
        .unwrap();
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let document = json!({
        "collection": {
            "id": "mex_omega_cubes_rdr",
            "schema_name": OMEGA_CUBE,
            "n_products": records.len()
        },
        "products": records
    });
    fs::write(&path, document.to_string()).unwrap();
    path.into_std_path_buf()
}

fn registry() -> TransformerRegistry {
    let mut registry = TransformerRegistry::new();
    register_all(&mut registry, Arc::new(NullExtractor)).unwrap();
    registry
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

fn link<'a>(document: &'a Value, rel: &str) -> Vec<&'a str> {
    document["links"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|link| link["rel"] == rel)
        .map(|link| link["href"].as_str().unwrap())
        .collect()
}

fn temp_root() -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    (temp, root)
}

#[test]
fn writes_self_contained_layout() {
    let (_temp, root) = temp_root();
    let definitions = load_definitions(&root);
    let source = write_source(
        &definitions,
        &root.join("source"),
        vec![omega_record("0006", "0"), omega_record("0018", "6")],
    );
    let stac_dir = root.join("stac");

    let summary = build_catalog(
        &definitions,
        &[source],
        &registry(),
        &stac_dir,
        ItemWindow::default(),
    )
    .unwrap();
    assert_eq!(summary.catalogs, 2);
    assert_eq!(summary.collections.len(), 1);
    assert_eq!(summary.collections[0].items, 2);
    assert_eq!(summary.collections[0].skipped_records, 0);

    let stac = stac_dir.as_std_path();
    let root_catalog = read_json(&stac.join("catalog.json"));
    assert_eq!(root_catalog["type"], json!("Catalog"));
    assert_eq!(link(&root_catalog, "root"), vec!["./catalog.json"]);
    assert_eq!(link(&root_catalog, "child"), vec!["./mars/catalog.json"]);
    assert!(link(&root_catalog, "parent").is_empty());

    let mars = read_json(&stac.join("mars").join("catalog.json"));
    assert_eq!(link(&mars, "root"), vec!["../catalog.json"]);
    assert_eq!(link(&mars, "parent"), vec!["../catalog.json"]);
    assert_eq!(
        link(&mars, "child"),
        vec!["./mex_omega_cubes_rdr/collection.json"]
    );
    assert_eq!(mars["ssys:targets"], json!(["Mars"]));
    assert_eq!(mars["stac_extensions"].as_array().unwrap().len(), 1);

    let collection_dir = stac.join("mars").join("mex_omega_cubes_rdr");
    let collection = read_json(&collection_dir.join("collection.json"));
    assert_eq!(collection["id"], json!(COLLECTION_ID));
    assert_eq!(collection["license"], json!("CC-BY-4.0"));
    assert_eq!(collection["processing:level"], json!("L2"));
    assert_eq!(link(&collection, "root"), vec!["../../catalog.json"]);
    assert_eq!(
        link(&collection, "item"),
        vec![
            "./OMEGA_L2_0006_0/OMEGA_L2_0006_0.json",
            "./OMEGA_L2_0018_6/OMEGA_L2_0018_6.json"
        ]
    );

    let item = read_json(
        &collection_dir
            .join("OMEGA_L2_0018_6")
            .join("OMEGA_L2_0018_6.json"),
    );
    assert_eq!(item["type"], json!("Feature"));
    assert_eq!(item["collection"], json!(COLLECTION_ID));
    assert_eq!(link(&item, "root"), vec!["../../../catalog.json"]);
    assert_eq!(link(&item, "collection"), vec!["../collection.json"]);
    assert_eq!(item["properties"]["ssys:targets"], json!(["Mars"]));

    let extent = &collection["extent"];
    assert_eq!(extent["spatial"]["bbox"][0], item["bbox"]);
    let interval = &extent["temporal"]["interval"][0];
    assert!(interval[0].is_string());
    assert!(interval[1].is_string());
}

#[test]
fn item_window_selects_products() {
    let (_temp, root) = temp_root();
    let definitions = load_definitions(&root);
    let source = write_source(
        &definitions,
        &root.join("source"),
        vec![
            omega_record("0006", "0"),
            omega_record("0018", "6"),
            omega_record("0020", "1"),
        ],
    );
    let stac_dir = root.join("stac");

    let window = ItemWindow {
        start: 1,
        max_items: Some(1),
    };
    let summary = build_catalog(&definitions, &[source], &registry(), &stac_dir, window).unwrap();
    assert_eq!(summary.collections[0].items, 1);

    let collection_dir = stac_dir.as_std_path().join("mars").join("mex_omega_cubes_rdr");
    assert!(collection_dir.join("OMEGA_L2_0018_6").exists());
    assert!(!collection_dir.join("OMEGA_L2_0006_0").exists());
    assert!(!collection_dir.join("OMEGA_L2_0020_1").exists());
}

#[test]
fn rebuild_replaces_previous_output() {
    let (_temp, root) = temp_root();
    let definitions = load_definitions(&root);
    let stac_dir = root.join("stac");
    fs::create_dir_all(&stac_dir).unwrap();
    fs::write(stac_dir.join("stale.json"), "{}").unwrap();

    let summary = build_catalog(
        &definitions,
        &[],
        &registry(),
        &stac_dir,
        ItemWindow::default(),
    )
    .unwrap();
    assert!(summary.collections.is_empty());
    assert!(!stac_dir.join("stale.json").exists());
    assert!(stac_dir.join("catalog.json").exists());

    let mars = read_json(stac_dir.join("mars").join("catalog.json").as_std_path());
    assert!(link(&mars, "child").is_empty());
}

#[test]
fn failed_build_keeps_previous_output() {
    let (_temp, root) = temp_root();
    let definitions = load_definitions(&root);
    let stac_dir = root.join("stac");
    fs::create_dir_all(&stac_dir).unwrap();
    fs::write(stac_dir.join("catalog.json"), "{}").unwrap();

    let orphan = root.join("orphan").join("orphan.json");
    fs::create_dir_all(orphan.parent().unwrap()).unwrap();
    let document = json!({
        "collection": { "id": "orphan", "schema_name": OMEGA_CUBE, "n_products": 0 },
        "products": []
    });
    fs::write(&orphan, document.to_string()).unwrap();

    let err = build_catalog(
        &definitions,
        &[orphan.into_std_path_buf()],
        &registry(),
        &stac_dir,
        ItemWindow::default(),
    )
    .unwrap_err();
    assert_matches!(err, LabError::DefinitionNotFound(id) if id == "orphan");
    assert_eq!(fs::read_to_string(stac_dir.join("catalog.json")).unwrap(), "{}");
}
