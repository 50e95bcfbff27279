//! Layered configuration for the artifact host.
//!
//! Values come from `.artifacts/artifacts.toml` in the project directory,
//! then environment overrides. A missing file means defaults.
//!
//! ```toml
//! [parser]
//! languages = ["tsx", "jsx"]
//!
//! [pane]
//! width = 600
//! min_width = 300
//! max_width = 1200
//!
//! [sandbox]
//! mode = "process"
//! render_timeout_ms = 15000
//! host_origin = "http://127.0.0.1:3141"
//!
//! [server]
//! port = 3141
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::artifact::DEFAULT_LANGUAGES;

/// Which isolation primitive hosts the artifact runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxMode {
    /// Separate OS process with a cleared environment (default)
    #[default]
    Process,
    /// Dedicated thread in this process; crash containment only
    Thread,
}

impl std::fmt::Display for SandboxMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SandboxMode::Process => write!(f, "process"),
            SandboxMode::Thread => write!(f, "thread"),
        }
    }
}

impl std::str::FromStr for SandboxMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "process" => Ok(SandboxMode::Process),
            "thread" => Ok(SandboxMode::Thread),
            _ => anyhow::bail!(
                "Invalid sandbox mode '{}'. Valid values: process, thread",
                s
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserConfig {
    pub languages: Vec<String>,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            languages: DEFAULT_LANGUAGES.iter().map(|l| l.to_string()).collect(),
        }
    }
}

/// Side pane sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaneConfig {
    pub width: u32,
    pub min_width: u32,
    pub max_width: u32,
}

impl Default for PaneConfig {
    fn default() -> Self {
        Self {
            width: 600,
            min_width: 300,
            max_width: 1200,
        }
    }
}

impl PaneConfig {
    pub fn clamp(&self, width: u32) -> u32 {
        let max = self.max_width.max(self.min_width);
        width.clamp(self.min_width, max)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxConfig {
    pub mode: SandboxMode,
    /// Silence past this deadline fails the render; `None` waits forever
    pub render_timeout: Option<Duration>,
    /// Origin the host page is served from
    pub host_origin: String,
    /// Runner executable; defaults to the current binary
    pub runner_cmd: Option<PathBuf>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            mode: SandboxMode::Process,
            render_timeout: None,
            host_origin: "http://127.0.0.1:3141".to_string(),
            runner_cmd: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 3141 }
    }
}

/// Effective configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactsConfig {
    pub parser: ParserConfig,
    pub pane: PaneConfig,
    pub sandbox: SandboxConfig,
    pub server: ServerConfig,
}

/// Raw TOML structure for `.artifacts/artifacts.toml`
#[derive(Debug, Default, Deserialize)]
struct ArtifactsToml {
    parser: Option<ParserSection>,
    pane: Option<PaneSection>,
    sandbox: Option<SandboxSection>,
    server: Option<ServerSection>,
}

#[derive(Debug, Deserialize)]
struct ParserSection {
    languages: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct PaneSection {
    width: Option<u32>,
    min_width: Option<u32>,
    max_width: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct SandboxSection {
    mode: Option<SandboxMode>,
    render_timeout_ms: Option<u64>,
    host_origin: Option<String>,
    runner_cmd: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct ServerSection {
    port: Option<u16>,
}

impl ArtifactsConfig {
    /// Path of the config file inside a project directory.
    pub fn config_path(project_dir: &Path) -> PathBuf {
        project_dir.join(".artifacts").join("artifacts.toml")
    }

    /// Load from the project directory, then apply process environment
    /// overrides.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let mut config = Self::load_file(project_dir)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load only the file layer. Returns defaults if the file doesn't exist.
    pub fn load_file(project_dir: &Path) -> Result<Self> {
        let config_path = Self::config_path(project_dir);
        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;
        Self::parse(&content).with_context(|| format!("Failed to parse {}", config_path.display()))
    }

    /// Parse a TOML document over the defaults.
    pub fn parse(content: &str) -> Result<Self> {
        let toml: ArtifactsToml = toml::from_str(content).context("Invalid artifacts.toml")?;

        let mut config = Self::default();
        if let Some(section) = toml.parser {
            if let Some(languages) = section.languages {
                config.parser.languages = languages;
            }
        }
        if let Some(section) = toml.pane {
            if let Some(min_width) = section.min_width {
                config.pane.min_width = min_width;
            }
            if let Some(max_width) = section.max_width {
                config.pane.max_width = max_width;
            }
            if let Some(width) = section.width {
                config.pane.width = width;
            }
        }
        if let Some(section) = toml.sandbox {
            if let Some(mode) = section.mode {
                config.sandbox.mode = mode;
            }
            if let Some(ms) = section.render_timeout_ms {
                config.sandbox.render_timeout = timeout_from_ms(ms);
            }
            if let Some(origin) = section.host_origin {
                config.sandbox.host_origin = origin;
            }
            if let Some(cmd) = section.runner_cmd {
                config.sandbox.runner_cmd = Some(cmd);
            }
        }
        if let Some(section) = toml.server {
            if let Some(port) = section.port {
                config.server.port = port;
            }
        }

        Ok(config)
    }

    /// Apply `ARTIFACTS_*` overrides from `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(mode) = lookup("ARTIFACTS_SANDBOX_MODE") {
            self.sandbox.mode = mode.parse()?;
        }
        if let Some(ms) = lookup("ARTIFACTS_RENDER_TIMEOUT_MS") {
            let ms: u64 = ms
                .trim()
                .parse()
                .with_context(|| format!("Invalid ARTIFACTS_RENDER_TIMEOUT_MS '{}'", ms))?;
            self.sandbox.render_timeout = timeout_from_ms(ms);
        }
        if let Some(cmd) = lookup("ARTIFACTS_RUNNER_CMD") {
            self.sandbox.runner_cmd = Some(PathBuf::from(cmd));
        }
        if let Some(port) = lookup("ARTIFACTS_PORT") {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid ARTIFACTS_PORT '{}'", port))?;
        }
        Ok(())
    }
}

/// Zero disables the watchdog.
fn timeout_from_ms(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}
