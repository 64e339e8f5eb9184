use std::fs;
use std::io::{self, Write};
use std::path::Path;

use serde::Serialize;
use tempfile::{Builder, NamedTempFile};

use crate::error::LabError;

/// Writes `value` as pretty JSON through a temp file in the destination
/// directory, so readers never observe a partial document.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), LabError> {
    let content =
        serde_json::to_vec_pretty(value).map_err(|err| LabError::Serialize(err.to_string()))?;
    write_atomic(path, |file| file.write_all(&content))
}

/// Streams into a temp file beside `path`, then renames it into place.
pub fn write_atomic<F>(path: &Path, fill: F) -> Result<(), LabError>
where
    F: FnOnce(&mut NamedTempFile) -> io::Result<()>,
{
    let parent = path
        .parent()
        .ok_or_else(|| LabError::Filesystem("invalid destination path".to_string()))?;
    fs::create_dir_all(parent).map_err(|err| LabError::Filesystem(err.to_string()))?;
    let mut temp = Builder::new()
        .prefix(".labtools-")
        .tempfile_in(parent)
        .map_err(|err| LabError::Filesystem(err.to_string()))?;
    fill(&mut temp).map_err(|err| LabError::Filesystem(err.to_string()))?;
    temp.as_file()
        .sync_all()
        .map_err(|err| LabError::Filesystem(err.to_string()))?;
    temp.persist(path)
        .map_err(|err| LabError::Filesystem(err.to_string()))?;
    Ok(())
}
