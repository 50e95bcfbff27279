//! `artifact-host parse`: extract artifacts from markdown.

use std::path::Path;

use anyhow::Result;

use artifact_host::artifact::FenceParser;
use artifact_host::config::ArtifactsConfig;

use super::read_input;

pub fn cmd_parse(project_dir: &Path, file: &Path, message_id: Option<&str>) -> Result<()> {
    let config = ArtifactsConfig::load(project_dir)?;
    let content = read_input(file)?;

    let parser = FenceParser::new(&config.parser.languages);
    let artifacts = parser.parse(&content, message_id);
    tracing::debug!(count = artifacts.len(), "parsed artifacts");

    println!("{}", serde_json::to_string_pretty(&artifacts)?);
    Ok(())
}
