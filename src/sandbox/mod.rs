//! Sandboxed rendering of artifacts.
//!
//! ## Protocol
//!
//! ```text
//! SandboxHost ──RenderRequest{code, renderId}──> IsolatedContext (Runner)
//!      ^                                              │ compile → execute → mount
//!      └──── {ready, version} once, then ─────────────┘
//!            RenderResponse{renderId, ok | error + message}
//! ```
//!
//! The host keeps only the newest `renderId` and ignores anything older or
//! from an unexpected origin. The runner drains its inbox and renders only
//! the newest request.
//!
//! Artifact programs run in an embedded JavaScript engine ([`EngineRuntime`])
//! with the same scripts the browser runner document loads ([`assets`]).

pub mod assets;
pub mod compiler;
pub mod context;
pub mod document;
pub mod engine;
pub mod host;
pub mod protocol;
pub mod runner;
pub mod runtime;

pub use compiler::{CompiledModule, ModuleBinding, compile};
pub use context::{IsolatedContext, ProcessContext, ThreadContext, spawn_context};
pub use document::RunnerDocument;
pub use engine::EngineRuntime;
pub use host::{RenderStatus, SandboxHost};
pub use protocol::{InboundMessage, Origin, ReadySignal, RenderRequest, RenderResponse, RunnerMessage};
pub use runner::{Runner, RunnerState, serve_stdio};
pub use runtime::{BindingTable, ComponentRuntime, MountRoot};
