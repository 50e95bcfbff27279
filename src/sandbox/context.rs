//! Isolation primitives hosting a [`Runner`](super::runner::Runner).
//!
//! | Context          | Isolation                                              |
//! |------------------|--------------------------------------------------------|
//! | `ProcessContext` | child process, cleared environment, NDJSON over stdio |
//! | `ThreadContext`  | dedicated thread, no shared state beyond two channels |
//!
//! Either way the host only sees [`InboundMessage`]s. Both report the opaque
//! origin since neither has a real one.
//!
//! Artifact code runs inside the embedded JavaScript engine, which exposes no
//! file system, network or process APIs; `require` only resolves the mapped
//! libraries. The runner process itself keeps the invoking user's permissions.
//! It starts in the temp directory with an empty environment, no core dumps
//! and a small descriptor limit, but it is not chrooted or firewalled.

use std::io;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use crate::config::{SandboxConfig, SandboxMode};
use crate::errors::SandboxError;

use super::protocol::{InboundMessage, RenderRequest, RunnerMessage};
use super::runner::Runner;
use super::engine::EngineRuntime;
use super::runtime::ComponentRuntime;

/// One isolated execution context, exclusively owned by a host.
#[async_trait]
pub trait IsolatedContext: Send {
    /// Post a request over the ordered channel. Never waits for a response.
    fn post(&mut self, request: &RenderRequest) -> Result<(), SandboxError>;

    /// Next inbound message, `None` once the context is gone.
    async fn recv(&mut self) -> Option<InboundMessage>;

    /// Stop delivering requests. Code already running inside is not interrupted.
    fn teardown(&mut self);
}

/// Spawn the context kind the configuration asks for.
pub fn spawn_context(config: &SandboxConfig) -> Result<Box<dyn IsolatedContext>, SandboxError> {
    match config.mode {
        SandboxMode::Process => Ok(Box::new(ProcessContext::spawn(config.runner_cmd.clone())?)),
        SandboxMode::Thread => Ok(Box::new(ThreadContext::spawn()?)),
    }
}

pub struct ThreadContext {
    requests: Option<std::sync::mpsc::Sender<RenderRequest>>,
    inbound: mpsc::UnboundedReceiver<InboundMessage>,
}

impl ThreadContext {
    pub fn spawn() -> Result<Self, SandboxError> {
        Self::with_runtime(EngineRuntime::default())
    }

    pub fn with_runtime<R: ComponentRuntime + 'static>(runtime: R) -> Result<Self, SandboxError> {
        let (request_tx, request_rx) = std::sync::mpsc::channel::<RenderRequest>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        std::thread::Builder::new()
            .name("artifact-runner".to_string())
            .spawn(move || {
                let mut runner = Runner::new(runtime);
                let result = runner.serve(&request_rx, |message| {
                    inbound_tx
                        .send(InboundMessage::opaque(message))
                        .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "host went away"))
                });
                if let Err(e) = result {
                    tracing::debug!(error = %e, "thread runner stopped");
                }
            })
            .map_err(SandboxError::Spawn)?;

        Ok(Self {
            requests: Some(request_tx),
            inbound: inbound_rx,
        })
    }
}

#[async_trait]
impl IsolatedContext for ThreadContext {
    fn post(&mut self, request: &RenderRequest) -> Result<(), SandboxError> {
        let requests = self.requests.as_ref().ok_or(SandboxError::ContextClosed)?;
        requests
            .send(request.clone())
            .map_err(|_| SandboxError::ContextClosed)
    }

    async fn recv(&mut self) -> Option<InboundMessage> {
        self.inbound.recv().await
    }

    fn teardown(&mut self) {
        // The runner thread exits once its current render returns
        self.requests = None;
        self.inbound.close();
    }
}

pub struct ProcessContext {
    child: Option<Child>,
    lines: Option<mpsc::UnboundedSender<String>>,
    inbound: mpsc::UnboundedReceiver<InboundMessage>,
}

impl ProcessContext {
    /// Spawn `<runner_cmd or current executable> runner`.
    pub fn spawn(runner_cmd: Option<PathBuf>) -> Result<Self, SandboxError> {
        let program = match runner_cmd {
            // The child starts elsewhere, so relative paths are pinned here
            Some(path) if path.is_relative() && path.components().count() > 1 => {
                std::env::current_dir().map_err(SandboxError::Spawn)?.join(path)
            }
            Some(path) => path,
            None => std::env::current_exe().map_err(SandboxError::Spawn)?,
        };

        let mut cmd = Command::new(&program);
        cmd.arg("runner")
            .env_clear()
            .current_dir(std::env::temp_dir())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Ok(filter) = std::env::var("RUST_LOG") {
            cmd.env("RUST_LOG", filter);
        }
        #[cfg(unix)]
        // SAFETY: only async-signal-safe setrlimit calls run between fork and exec
        unsafe {
            cmd.pre_exec(limit_resources);
        }

        let mut child = cmd.spawn().map_err(SandboxError::Spawn)?;
        tracing::info!(program = %program.display(), pid = ?child.id(), "spawned artifact runner");

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SandboxError::Other(anyhow::anyhow!("runner stdin not captured")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SandboxError::Other(anyhow::anyhow!("runner stdout not captured")))?;

        let (line_tx, mut line_rx) = mpsc::unbounded_channel::<String>();
        tokio::spawn(async move {
            let mut stdin = stdin;
            while let Some(line) = line_rx.recv().await {
                if let Err(e) = stdin.write_all(line.as_bytes()).await {
                    tracing::debug!(error = %e, "runner stdin closed");
                    break;
                }
                if stdin.flush().await.is_err() {
                    break;
                }
            }
        });

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<RunnerMessage>(&line) {
                    Ok(message) => {
                        if inbound_tx.send(InboundMessage::opaque(message)).is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::debug!(error = %e, line = %line, "ignoring invalid runner output"),
                }
            }
        });

        Ok(Self {
            child: Some(child),
            lines: Some(line_tx),
            inbound: inbound_rx,
        })
    }
}

/// Descriptors the runner may hold: stdio plus the async runtime's own.
#[cfg(unix)]
const RUNNER_MAX_FILES: libc::rlim_t = 64;

#[cfg(unix)]
fn limit_resources() -> io::Result<()> {
    set_limit(libc::RLIMIT_CORE, 0)?;
    set_limit(libc::RLIMIT_NOFILE, RUNNER_MAX_FILES)
}

#[cfg(all(unix, target_os = "linux", target_env = "gnu"))]
type Resource = libc::__rlimit_resource_t;
#[cfg(all(unix, not(all(target_os = "linux", target_env = "gnu"))))]
type Resource = libc::c_int;

#[cfg(unix)]
fn set_limit(resource: Resource, value: libc::rlim_t) -> io::Result<()> {
    let mut current = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    // SAFETY: `current` is a valid rlimit for the duration of both calls
    if unsafe { libc::getrlimit(resource, &mut current) } != 0 {
        return Err(io::Error::last_os_error());
    }
    let limit = libc::rlimit {
        rlim_cur: value.min(current.rlim_max),
        rlim_max: value.min(current.rlim_max),
    };
    if unsafe { libc::setrlimit(resource, &limit) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[async_trait]
impl IsolatedContext for ProcessContext {
    fn post(&mut self, request: &RenderRequest) -> Result<(), SandboxError> {
        let lines = self.lines.as_ref().ok_or(SandboxError::ContextClosed)?;
        let mut line = serde_json::to_string(request)?;
        line.push('\n');
        lines.send(line).map_err(|_| SandboxError::ContextClosed)
    }

    async fn recv(&mut self) -> Option<InboundMessage> {
        self.inbound.recv().await
    }

    fn teardown(&mut self) {
        self.lines = None;
        self.inbound.close();
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.start_kill() {
                tracing::debug!(error = %e, "runner already exited");
            }
        }
    }
}
