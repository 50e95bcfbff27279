//! `artifact-host serve`: HTTP surface for the pane UI.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use artifact_host::artifact::FenceParser;
use artifact_host::config::ArtifactsConfig;
use artifact_host::registry::ArtifactRegistry;
use artifact_host::server::{AppState, ServeOptions, start_server};

pub async fn cmd_serve(project_dir: &Path, port: Option<u16>, dev: bool) -> Result<()> {
    let config = ArtifactsConfig::load(project_dir)?;
    let registry = ArtifactRegistry::shared(config.pane);
    let parser = Arc::new(FenceParser::new(&config.parser.languages));
    let state = Arc::new(AppState::new(registry, parser));

    start_server(
        state,
        ServeOptions {
            port: port.unwrap_or(config.server.port),
            dev_mode: dev,
        },
    )
    .await
}
