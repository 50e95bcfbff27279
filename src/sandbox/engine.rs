//! Embedded JavaScript engine behind [`ComponentRuntime`].
//!
//! Every render gets a fresh [`boa_engine::Context`]. The headless globals,
//! the library scripts and `runtime.js` are evaluated into it, then the
//! linked program is lowered (JSX and TypeScript), executed with `require`
//! limited to the module map, and mounted into a markup-only root. Nothing
//! carries over between renders.
//!
//! The engine exposes no filesystem, network or process APIs. Loops are
//! capped per render so a runaway artifact fails instead of spinning.

use std::thread;

use boa_engine::{Context, JsError, JsValue, Source};
use serde::Deserialize;

use crate::errors::{CompileError, RenderError, RuntimeError};

use super::assets;
use super::compiler::{self, CompiledModule, MODULE_MAP};
use super::runtime::{BindingTable, Component, ComponentRuntime};

/// Iterations a single loop may run before the render is abandoned.
pub const LOOP_ITERATION_LIMIT: u64 = 1_000_000;

const RECURSION_LIMIT: usize = 4096;

/// The parser and interpreter recurse on the native stack.
const ENGINE_STACK_SIZE: usize = 32 * 1024 * 1024;

/// Host objects the libraries expect from a browser window. Timers never
/// fire in a headless render.
const HEADLESS_GLOBALS: &str = r#"
var window = globalThis;
var self = globalThis;
var console = {
  log: function () {}, info: function () {}, warn: function () {},
  error: function () {}, debug: function () {}
};
function setTimeout() { return 0; }
function clearTimeout() {}
function setInterval() { return 0; }
function clearInterval() {}
function requestAnimationFrame() { return 0; }
function cancelAnimationFrame() {}
"#;

#[derive(Debug, Clone)]
pub struct EngineRuntime {
    bindings: BindingTable,
    loop_limit: u64,
}

impl Default for EngineRuntime {
    fn default() -> Self {
        Self::new(BindingTable::full())
    }
}

impl EngineRuntime {
    /// Runtime that loads only the libraries in `bindings`.
    pub fn new(bindings: BindingTable) -> Self {
        Self {
            bindings,
            loop_limit: LOOP_ITERATION_LIMIT,
        }
    }

    pub fn with_loop_limit(mut self, limit: u64) -> Self {
        self.loop_limit = limit;
        self
    }

    fn execute(&self, module: &CompiledModule) -> Result<Rendered, RenderError> {
        let mut context = Context::default();
        context
            .runtime_limits_mut()
            .set_loop_iteration_limit(self.loop_limit);
        context
            .runtime_limits_mut()
            .set_recursion_limit(RECURSION_LIMIT);

        eval(&mut context, HEADLESS_GLOBALS.as_bytes()).map_err(RuntimeError::Evaluation)?;

        let mut loaded = BindingTable::empty();
        for (binding, path) in assets::LIBRARY_SCRIPTS {
            if !self.bindings.is_loaded(*binding) {
                continue;
            }
            let Some(source) = assets::script(path) else {
                tracing::warn!(library = %binding, path, "library script is not embedded");
                continue;
            };
            match eval(&mut context, &source) {
                Ok(_) => loaded = loaded.with(*binding),
                Err(e) => tracing::warn!(library = %binding, error = %e, "library failed to load"),
            }
        }
        loaded.check(module)?;

        let runtime = assets::script(assets::RUNTIME_SCRIPT).ok_or_else(|| {
            RuntimeError::Evaluation("Artifact runtime is missing from the runner assets.".to_string())
        })?;
        eval(&mut context, &runtime).map_err(RuntimeError::Evaluation)?;

        let request = serde_json::json!({
            "code": module.program,
            "modules": module_globals(),
        });
        let call = format!("ArtifactRunner.runHeadless({})", request);
        let value = eval(&mut context, call.as_bytes()).map_err(RuntimeError::Evaluation)?;
        let raw = value
            .as_string()
            .map(|s| s.to_std_string_escaped())
            .ok_or_else(|| RuntimeError::Evaluation("Artifact runtime returned no outcome.".to_string()))?;

        match serde_json::from_str::<EngineOutcome>(&raw) {
            Ok(EngineOutcome::Ok { name, markup }) => Ok(Rendered { name, markup }),
            Ok(EngineOutcome::Error(failure)) => Err(failure.into_error()),
            Err(e) => Err(RuntimeError::Evaluation(format!("Unreadable artifact runtime outcome: {}", e)).into()),
        }
    }
}

impl ComponentRuntime for EngineRuntime {
    fn evaluate(&mut self, module: &CompiledModule) -> Result<Component, RenderError> {
        let rendered = on_engine_stack(|| self.execute(module))??;
        tracing::trace!(component = %rendered.name, bytes = rendered.markup.len(), "artifact rendered");
        Ok(Component {
            name: rendered.name,
            kind: module.default_export.kind,
            markup: rendered.markup,
        })
    }
}

struct Rendered {
    name: String,
    markup: String,
}

/// What `ArtifactRunner.runHeadless` reports.
#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum EngineOutcome {
    Ok { name: String, markup: String },
    Error(EngineFailure),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Phase {
    Syntax,
    Export,
    Dependency,
    Import,
    Evaluate,
    Mount,
}

#[derive(Debug, Deserialize)]
struct EngineFailure {
    phase: Phase,
    #[serde(default)]
    message: String,
    line: Option<usize>,
    found: Option<String>,
    binding: Option<String>,
    specifier: Option<String>,
}

impl EngineFailure {
    fn into_error(self) -> RenderError {
        match self.phase {
            Phase::Syntax => CompileError::Syntax {
                line: self.line,
                message: self.message,
            }
            .into(),
            Phase::Export => match self.found {
                Some(found) => CompileError::InvalidDefaultExport { found }.into(),
                None => CompileError::MissingDefaultExport.into(),
            },
            Phase::Dependency => RuntimeError::DependencyMissing {
                binding: self.binding.unwrap_or(self.message),
            }
            .into(),
            Phase::Import => match self.specifier.as_deref().map(compiler::resolve_module) {
                Some(Err(e)) => e.into(),
                _ => RuntimeError::Evaluation(self.message).into(),
            },
            Phase::Evaluate => RuntimeError::Evaluation(self.message).into(),
            Phase::Mount => RuntimeError::Mount(self.message).into(),
        }
    }
}

/// Module specifier to library global, as the runtime's `require` sees it.
fn module_globals() -> serde_json::Map<String, serde_json::Value> {
    MODULE_MAP
        .iter()
        .map(|(specifier, binding)| (specifier.to_string(), binding.library_name().into()))
        .collect()
}

fn eval(context: &mut Context, source: &[u8]) -> Result<JsValue, String> {
    context
        .eval(Source::from_bytes(source))
        .map_err(|e| describe(e, context))
}

/// `Kind: message` for native errors, the thrown value otherwise.
fn describe(error: JsError, context: &mut Context) -> String {
    match error.try_native(context) {
        Ok(native) => native.to_string(),
        Err(_) => error.to_string(),
    }
}

/// Run `work` on a thread with a stack deep enough for the engine. A panic
/// inside is resumed on the calling thread.
fn on_engine_stack<T: Send>(work: impl FnOnce() -> T + Send) -> Result<T, RenderError> {
    thread::scope(|scope| -> Result<T, RenderError> {
        let handle = thread::Builder::new()
            .name("artifact-engine".to_string())
            .stack_size(ENGINE_STACK_SIZE)
            .spawn_scoped(scope, work)
            .map_err(|e| RuntimeError::Evaluation(format!("Failed to start artifact engine: {}", e)))?;
        match handle.join() {
            Ok(value) => Ok(value),
            Err(payload) => std::panic::resume_unwind(payload),
        }
    })
}
