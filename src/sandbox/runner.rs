//! The isolated context's side of the render protocol.
//!
//! `idle → compiling → mounted | failed`, per request. The runner never
//! queues: when several requests are waiting it renders only the newest and
//! the superseded ones get no response.

use std::io::{self, BufRead, Write};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::mpsc;

use anyhow::Result;

use crate::errors::{RenderError, RuntimeError};

use super::compiler;
use super::engine::EngineRuntime;
use super::protocol::{ReadySignal, RenderRequest, RenderResponse, RunnerMessage};
use super::runtime::{ComponentRuntime, MountRoot};

/// Version of the runner document and its message protocol.
pub const RUNNER_PROTOCOL_VERSION: &str = "1";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RunnerState {
    #[default]
    Idle,
    Compiling {
        render_id: String,
    },
    Mounted {
        render_id: String,
        instance: u64,
    },
    Failed {
        render_id: String,
        message: String,
    },
}

pub struct Runner<R: ComponentRuntime = EngineRuntime> {
    runtime: R,
    root: MountRoot,
    state: RunnerState,
}

impl Runner<EngineRuntime> {
    pub fn engine() -> Self {
        Self::new(EngineRuntime::default())
    }
}

impl<R: ComponentRuntime> Runner<R> {
    pub fn new(runtime: R) -> Self {
        Self {
            runtime,
            root: MountRoot::new(),
            state: RunnerState::Idle,
        }
    }

    pub fn ready_signal() -> ReadySignal {
        ReadySignal {
            ready: true,
            version: RUNNER_PROTOCOL_VERSION.to_string(),
        }
    }

    pub fn state(&self) -> &RunnerState {
        &self.state
    }

    pub fn root(&self) -> &MountRoot {
        &self.root
    }

    /// Render one request. Every failure, panics included, becomes an error
    /// response and the fallback view in the root.
    pub fn handle(&mut self, request: RenderRequest) -> RenderResponse {
        let RenderRequest { code, render_id } = request;
        self.state = RunnerState::Compiling {
            render_id: render_id.clone(),
        };

        let outcome = catch_unwind(AssertUnwindSafe(|| self.render(&code)))
            .unwrap_or_else(|payload| Err(RuntimeError::Panicked(panic_message(payload.as_ref())).into()));

        match outcome {
            Ok(instance) => {
                tracing::debug!(render_id = %render_id, instance, "artifact mounted");
                self.state = RunnerState::Mounted {
                    render_id: render_id.clone(),
                    instance,
                };
                RenderResponse::ok(render_id)
            }
            Err(e) => {
                let message = e.to_string();
                tracing::warn!(render_id = %render_id, error = %message, "artifact render failed");
                self.root.show_error(message.clone());
                self.state = RunnerState::Failed {
                    render_id: render_id.clone(),
                    message: message.clone(),
                };
                RenderResponse::error(render_id, message)
            }
        }
    }

    fn render(&mut self, code: &str) -> Result<u64, RenderError> {
        let module = compiler::compile(code)?;
        let component = self.runtime.evaluate(&module)?;
        let instance = self.runtime.mount(&mut self.root, component)?;
        Ok(instance)
    }

    /// Announce readiness, then answer requests until the inbox closes.
    pub fn serve<F>(&mut self, inbox: &mpsc::Receiver<RenderRequest>, mut emit: F) -> io::Result<()>
    where
        F: FnMut(RunnerMessage) -> io::Result<()>,
    {
        emit(RunnerMessage::Ready(Self::ready_signal()))?;

        while let Ok(mut request) = inbox.recv() {
            // Drain to the newest request
            while let Ok(newer) = inbox.try_recv() {
                tracing::trace!(render_id = %request.render_id, "render request superseded");
                request = newer;
            }
            let response = self.handle(request);
            emit(RunnerMessage::Rendered(response))?;
        }
        Ok(())
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run the isolated context over stdin/stdout, one JSON message per line.
pub fn serve_stdio() -> Result<()> {
    let (tx, rx) = mpsc::channel();

    std::thread::Builder::new()
        .name("runner-stdin".to_string())
        .spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<RenderRequest>(&line) {
                    Ok(request) => {
                        if tx.send(request).is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::debug!(error = %e, "ignoring invalid runner input line"),
                }
            }
        })?;

    let mut stdout = io::stdout().lock();
    Runner::engine().serve(&rx, |message| {
        serde_json::to_writer(&mut stdout, &message)?;
        stdout.write_all(b"\n")?;
        stdout.flush()
    })?;
    Ok(())
}
