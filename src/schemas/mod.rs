//! Concrete transformers for the PSUP source schemas.

pub mod omega_c_proj;
pub mod omega_cube;
pub mod omega_map;
pub mod vector_features;

use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::LabError;
use crate::extract::DataExtractor;
use crate::registry::TransformerRegistry;
use crate::transformer::Transformer;

pub use omega_c_proj::{OMEGA_C_PROJ, OmegaCProjRecord, OmegaCProjTransformer};
pub use omega_cube::{OMEGA_CUBE, OmegaCubeRecord, OmegaCubeTransformer};
pub use omega_map::{OMEGA_MAP, OmegaMapRecord, OmegaMapTransformer};
pub use vector_features::{VECTOR_FEATURES, VectorFeaturesRecord, VectorFeaturesTransformer};

/// Registers every built-in schema. Transformers share one extractor.
pub fn register_all(
    registry: &mut TransformerRegistry,
    extractor: Arc<dyn DataExtractor>,
) -> Result<(), LabError> {
    let omega_extractor = Arc::clone(&extractor);
    registry.register(OMEGA_CUBE, move || {
        Box::new(OmegaCubeTransformer::new(Arc::clone(&omega_extractor))) as Box<dyn Transformer>
    })?;
    let projected_extractor = Arc::clone(&extractor);
    registry.register(OMEGA_C_PROJ, move || {
        Box::new(OmegaCProjTransformer::new(Arc::clone(&projected_extractor)))
            as Box<dyn Transformer>
    })?;
    registry.register(OMEGA_MAP, || Box::new(OmegaMapTransformer) as Box<dyn Transformer>)?;
    registry.register(VECTOR_FEATURES, move || {
        Box::new(VectorFeaturesTransformer::new(Arc::clone(&extractor))) as Box<dyn Transformer>
    })?;
    Ok(())
}

/// PSUP services serialize most numbers as strings (`"330.057"`).
pub(crate) fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(number) => number
            .as_f64()
            .ok_or_else(|| serde::de::Error::custom("number out of range")),
        Value::String(text) => text
            .trim()
            .parse::<f64>()
            .map_err(|err| serde::de::Error::custom(format!("invalid number {text:?}: {err}"))),
        other => Err(serde::de::Error::custom(format!(
            "expected a number, found {other}"
        ))),
    }
}

/// Accepts strings and bare numbers for identifier-like fields.
pub(crate) fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(text) => Ok(text),
        Value::Number(number) => Ok(number.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string, found {other}"
        ))),
    }
}

/// Service timestamps carry no zone (`2004-01-14T00:19:12.032`) and are
/// UTC. Normalized to RFC 3339 with milliseconds.
pub(crate) fn utc_datetime<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let text = lenient_string(deserializer)?;
    let text = text.trim();
    let parsed = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .or_else(|_| DateTime::parse_from_rfc3339(text).map(|zoned| zoned.with_timezone(&Utc)))
        .map_err(|err| serde::de::Error::custom(format!("invalid timestamp {text:?}: {err}")))?;
    Ok(parsed.to_rfc3339_opts(SecondsFormat::Millis, true))
}

pub(crate) fn harvest_time() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;
    use crate::extract::NullExtractor;

    #[derive(Debug, Deserialize)]
    struct Sample {
        #[serde(deserialize_with = "lenient_f64")]
        value: f64,
        #[serde(deserialize_with = "lenient_string")]
        label: String,
    }

    #[test]
    fn numbers_may_arrive_as_strings() {
        let sample: Sample = serde_json::from_str(r#"{"value": "330.057", "label": 26}"#).unwrap();
        assert_eq!(sample.value, 330.057);
        assert_eq!(sample.label, "26");
        let sample: Sample = serde_json::from_str(r#"{"value": -42.5, "label": "t"}"#).unwrap();
        assert_eq!(sample.value, -42.5);
        assert!(serde_json::from_str::<Sample>(r#"{"value": "n/a", "label": "t"}"#).is_err());
    }

    #[derive(Debug, Deserialize)]
    struct Stamped {
        #[serde(deserialize_with = "utc_datetime")]
        at: String,
    }

    #[test]
    fn zoneless_timestamps_are_utc() {
        let stamped: Stamped = serde_json::from_str(r#"{"at": "2004-01-14T00:19:12.032"}"#).unwrap();
        assert_eq!(stamped.at, "2004-01-14T00:19:12.032Z");
        let stamped: Stamped = serde_json::from_str(r#"{"at": "2004-01-14T02:19:12+02:00"}"#).unwrap();
        assert_eq!(stamped.at, "2004-01-14T00:19:12.000Z");
        assert!(serde_json::from_str::<Stamped>(r#"{"at": "14/01/2004"}"#).is_err());
    }

    #[test]
    fn builtin_schemas_are_registered() {
        let mut registry = TransformerRegistry::new();
        register_all(&mut registry, Arc::new(NullExtractor)).unwrap();
        assert_eq!(
            registry.schema_names(),
            vec![OMEGA_CUBE, OMEGA_C_PROJ, OMEGA_MAP, VECTOR_FEATURES]
        );
        assert!(register_all(&mut registry, Arc::new(NullExtractor)).is_err());
    }
}
