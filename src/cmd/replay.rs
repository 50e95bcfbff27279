//! `artifact-host replay`: drive the stream bridge from a recorded
//! transport stream.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::broadcast::error::TryRecvError;

use artifact_host::artifact::{Artifact, FenceParser};
use artifact_host::bridge::Transcript;
use artifact_host::bridge::transport::parse_event_line;
use artifact_host::config::ArtifactsConfig;
use artifact_host::registry::{self, ArtifactRegistry, RegistryEvent};

use super::read_input;
use super::render::render_source;

pub async fn cmd_replay(project_dir: &Path, events: &Path, render: bool) -> Result<()> {
    let config = ArtifactsConfig::load(project_dir)?;
    let content = read_input(events)?;

    let registry = ArtifactRegistry::shared(config.pane);
    let mut rx = registry::read(&registry).subscribe();
    let parser = Arc::new(FenceParser::new(&config.parser.languages));
    let mut transcript = Transcript::new(registry.clone(), parser);

    for (index, line) in content.lines().enumerate() {
        let event = match parse_event_line(line) {
            None => continue,
            Some(Ok(event)) => event,
            Some(Err(e)) => {
                tracing::warn!(line = index + 1, error = %e, "skipping invalid transport event");
                continue;
            }
        };
        transcript.apply(event);

        loop {
            match rx.try_recv() {
                Ok(event) => print_event(&event)?,
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "registry events dropped during replay");
                }
                Err(_) => break,
            }
        }
    }

    let artifacts: Vec<Artifact> = registry::read(&registry)
        .list()
        .iter()
        .map(|a| a.as_ref().clone())
        .collect();
    println!("{}", serde_json::to_string_pretty(&artifacts)?);

    if render {
        let target = {
            let reg = registry::read(&registry);
            reg.current().or_else(|| reg.list().last().cloned())
        };
        match target {
            Some(artifact) => {
                let response = render_source(&config.sandbox, &artifact.code).await?;
                tracing::info!(artifact_id = %artifact.id, ok = response.is_ok(), "rendered artifact");
                println!("{}", serde_json::to_string(&response)?);
            }
            None => tracing::info!("no artifact to render"),
        }
    }

    Ok(())
}

fn print_event(event: &RegistryEvent) -> Result<()> {
    println!("{}", serde_json::to_string(event)?);
    Ok(())
}
