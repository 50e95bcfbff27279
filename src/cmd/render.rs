//! `artifact-host render` and `artifact-host runner`.

use std::path::Path;

use anyhow::{Context, Result};

use artifact_host::config::{ArtifactsConfig, SandboxConfig};
use artifact_host::sandbox::{self, RenderResponse, RenderStatus, SandboxHost};

use super::read_input;

/// Render `code` in a fresh context of the configured kind and wait for the
/// outcome.
pub(crate) async fn render_source(config: &SandboxConfig, code: &str) -> Result<RenderResponse> {
    let mut host = SandboxHost::from_config(config).context("Failed to start isolated context")?;
    let status = host.render_and_wait(code).await?;
    let render_id = host.latest_render_id().unwrap_or_default().to_string();

    Ok(match status {
        RenderStatus::Error(message) => RenderResponse::error(render_id, message),
        _ => RenderResponse::ok(render_id),
    })
}

pub async fn cmd_render(project_dir: &Path, file: &Path) -> Result<()> {
    let config = ArtifactsConfig::load(project_dir)?;
    let code = read_input(file)?;

    let response = render_source(&config.sandbox, &code).await?;
    println!("{}", serde_json::to_string(&response)?);

    if !response.is_ok() {
        anyhow::bail!(
            "Artifact render failed: {}",
            response.message.unwrap_or_default()
        );
    }
    Ok(())
}

pub async fn cmd_runner() -> Result<()> {
    tokio::task::spawn_blocking(sandbox::serve_stdio)
        .await
        .context("Runner thread failed")?
}
