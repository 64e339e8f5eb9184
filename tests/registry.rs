use std::sync::Arc;

use assert_matches::assert_matches;
use serde_json::{Value, json};

use labtools::domain::Extension;
use labtools::error::LabError;
use labtools::extract::NullExtractor;
use labtools::registry::{self, TransformerRegistry};
use labtools::schemas::{OMEGA_C_PROJ, OMEGA_CUBE, OMEGA_MAP, VECTOR_FEATURES, register_all};

fn sample_record(schema: &str) -> Value {
    match schema {
        OMEGA_CUBE => json!({
            "orbit_number": "0953",
            "cube_number": "3",
            "download_sav": "http://psup.ias.u-psud.fr/omegacubes/cubes_L2/0953_3.sav",
            "sav_human_file_size": "12 MB",
            "download_nc": "http://psup.ias.u-psud.fr/omegacubes/cubes_L2/0953_3.nc",
            "nc_human_file_size": "11 MB",
            "solar_longitude": 112.5,
            "easternmost_longitude": "190.5",
            "westernmost_longitude": "185.0",
            "maximum_latitude": "12.0",
            "minimum_latitude": "4.5",
            "data_quality_id": 2,
            "martian_year": "27",
            "pointing_mode": "NADIR",
            "l_channel_ok": "t",
            "c_channel_ok": "f",
            "vis_channel_ok": "t",
            "trimmed_orbit_number": "953"
        }),
        OMEGA_C_PROJ => json!({
            "orbit_number": "18",
            "cube_number": "0",
            "download_sav": "http://psup.ias.u-psud.fr/omegacubes/cubes_L3/0018_0.sav",
            "sav_human_file_size": "2.4 MB",
            "download_nc": "http://psup.ias.u-psud.fr/omegacubes/cubes_L3/0018_0.nc",
            "nc_human_file_size": "1.8 MB",
            "start_date": "2004-01-14T00:19:12.032",
            "end_date": "2004-01-14T00:23:03.059",
            "solar_longitude": "333.063",
            "easternmost_longitude": "322.961",
            "westernmost_longitude": "318.133",
            "maximum_latitude": "-54.5625",
            "minimum_latitude": "-60.0",
            "data_quality_id": "3"
        }),
        OMEGA_MAP => json!({
            "download": "http://psup.ias.u-psud.fr/marsdata/omega/fits/albedo_filled.fits",
            "linktopubli": "http://doi.org/10.1016/j.icarus.2014.10.029",
            "preview": "http://psup.ias.u-psud.fr/marsdata/omega/png/albedo_filled_reduce.png",
            "raster_description": "\"OMEGA Albedo Filled\"",
            "raster_keywords": "{\"albedo\",\"filled\",\"global\"}",
            "raster_ldescription": "\"Global NIR albedo\"",
            "raster_name": "albedo_filled.fits"
        }),
        VECTOR_FEATURES => json!({
            "download": "http://psup.ias.u-psud.fr/vectors/crater_database.json",
            "linktopubli": "https://doi.org/10.1029/2011JE003966",
            "vector_description": "Mars craters larger than 1 km",
            "vector_name": "crater_database.json",
            "vector_footprint": "((-180,-90),(-180,90),(180,90),(180,-90))",
            "vector_keywords": "craters,mars"
        }),
        other => panic!("no sample for {other}"),
    }
}

fn registry() -> TransformerRegistry {
    let mut registry = TransformerRegistry::new();
    register_all(&mut registry, Arc::new(NullExtractor)).unwrap();
    registry
}

#[test]
fn every_schema_builds_deterministic_items() {
    let registry = registry();
    assert_eq!(
        registry.schema_names(),
        vec![OMEGA_CUBE, OMEGA_C_PROJ, OMEGA_MAP, VECTOR_FEATURES]
    );

    for schema in registry.schema_names() {
        let raw = sample_record(schema);
        let raw = raw.as_object().unwrap();
        let first = registry.create_transformer(schema).unwrap();
        let second = registry.create_transformer(schema).unwrap();
        assert_eq!(first.schema_name(), schema);

        let record_a = first.parse_record(raw).unwrap();
        let record_b = second.parse_record(raw).unwrap();
        let id_a = first.item_id(record_a.as_ref(), None).unwrap();
        let id_b = second.item_id(record_b.as_ref(), None).unwrap();
        assert_eq!(id_a, id_b, "{schema}");

        let item = first
            .transform_item(record_a.as_ref(), None, Some("collection"), None)
            .unwrap();
        assert_eq!(item.id, id_a);
        assert_eq!(item.stac_extensions, vec![Extension::Ssys.schema_uri()]);
        assert_eq!(item.properties["ssys:targets"], json!(["Mars"]));

        let [west, south, east, north] = item.bbox.unwrap();
        for lon in [west, east] {
            assert!((-180.0..=180.0).contains(&lon), "{schema}: {lon}");
        }
        assert!(west <= east, "{schema}: {west} > {east}");
        assert!(south <= north);
    }
}

#[test]
fn global_coverage_spans_full_longitude_range() {
    let registry = registry();
    for schema in [OMEGA_MAP, VECTOR_FEATURES] {
        let transformer = registry.create_transformer(schema).unwrap();
        let raw = sample_record(schema);
        let record = transformer.parse_record(raw.as_object().unwrap()).unwrap();
        assert_eq!(
            transformer.bbox(record.as_ref(), None).unwrap(),
            Some([-180.0, -90.0, 180.0, 90.0]),
            "{schema}"
        );
    }
}

#[test]
fn records_missing_fields_fail_for_every_schema() {
    let registry = registry();
    for schema in registry.schema_names() {
        let transformer = registry.create_transformer(schema).unwrap();
        let mut raw = sample_record(schema);
        let object = raw.as_object_mut().unwrap();
        let first_key = object.keys().next().cloned().unwrap();
        object.remove(&first_key);
        assert_matches!(
            transformer.parse_record(object),
            Err(LabError::RecordParse { schema: name, .. }) if name == schema
        );
    }
}

#[test]
fn global_registry_can_be_reset() {
    registry::clear_global();
    assert!(registry::global().is_empty());

    register_all(&mut registry::global_mut(), Arc::new(NullExtractor)).unwrap();
    assert!(registry::global().contains(OMEGA_CUBE));
    assert_matches!(
        register_all(&mut registry::global_mut(), Arc::new(NullExtractor)),
        Err(LabError::SchemaAlreadyRegistered(name)) if name == OMEGA_CUBE
    );

    registry::clear_global();
    assert_eq!(registry::global().len(), 0);
}
