use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use crate::domain::ObjectType;

#[derive(Debug, Error, Diagnostic)]
pub enum LabError {
    #[error("malformed service response: {0}")]
    MalformedResponse(String),

    #[error("service request failed: {0}")]
    ServiceHttp(String),

    #[error("service returned status {status}: {message}")]
    ServiceStatus { status: u16, message: String },

    #[error("no transformer registered for schema {0:?}")]
    UnknownSchema(String),

    #[error("a transformer is already registered for schema {0:?}")]
    SchemaAlreadyRegistered(String),

    #[error("invalid {schema} record: {message}")]
    RecordParse { schema: String, message: String },

    #[error("metadata record does not belong to schema {0:?}")]
    RecordTypeMismatch(String),

    #[error("invalid `{object_type}` object type for {operation}")]
    InvalidObjectType {
        operation: &'static str,
        object_type: ObjectType,
    },

    #[error("undefined STAC extension: {0}")]
    UnknownExtension(String),

    #[error("property {0:?} is defined by more than one properties block")]
    PropertyCollision(String),

    #[error("a {0} definition is required")]
    MissingDefinition(&'static str),

    #[error("unable to extract from data file {path}: {message}")]
    Extraction { path: PathBuf, message: String },

    #[error("download failed: {0}")]
    Download(String),

    #[error("not a valid source collection file: {0}")]
    InvalidSourceCollection(PathBuf),

    #[error("definition not found: {0}")]
    DefinitionNotFound(String),

    #[error("missing config file labtools.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("failed to serialize document: {0}")]
    Serialize(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
