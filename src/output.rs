use std::io::{self, Write};

use serde::Serialize;

use crate::app::{DefinitionsResult, DownloadResult, SchemasResult};
use crate::builder::BuildSummary;
use crate::config::ResolvedConfig;

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_config(config: &ResolvedConfig) -> io::Result<()> {
        Self::print_json(config)
    }

    pub fn print_schemas(result: &SchemasResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_definitions(result: &DefinitionsResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_download(result: &DownloadResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_build(result: &BuildSummary) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}
