//! Configuration view: `artifact-host config`.

use std::path::Path;

use anyhow::Result;

use artifact_host::config::ArtifactsConfig;

pub fn cmd_config(project_dir: &Path) -> Result<()> {
    let config_path = ArtifactsConfig::config_path(project_dir);
    let config = ArtifactsConfig::load(project_dir)?;

    println!();
    println!("Artifact Host Configuration");
    println!("===========================");
    println!();
    if config_path.exists() {
        println!("Config file: {}", config_path.display());
    } else {
        println!("No artifacts.toml found at {}", config_path.display());
        println!("Using defaults.");
    }
    println!();

    println!("[parser]");
    println!("  languages = {:?}", config.parser.languages);
    println!();

    println!("[pane]");
    println!("  width = {}", config.pane.width);
    println!("  min_width = {}", config.pane.min_width);
    println!("  max_width = {}", config.pane.max_width);
    println!();

    println!("[sandbox]");
    println!("  mode = \"{}\"", config.sandbox.mode);
    match config.sandbox.render_timeout {
        Some(timeout) => println!("  render_timeout_ms = {}", timeout.as_millis()),
        None => println!("  render_timeout_ms = (none)"),
    }
    println!("  host_origin = \"{}\"", config.sandbox.host_origin);
    if let Some(cmd) = &config.sandbox.runner_cmd {
        println!("  runner_cmd = \"{}\"", cmd.display());
    }
    println!();

    println!("[server]");
    println!("  port = {}", config.server.port);
    println!();

    Ok(())
}
