//! Typed error hierarchy for the artifact host.
//!
//! Three layers, leaves first:
//! - `CompileError`: the artifact source cannot be linked into a module
//! - `RuntimeError`: the linked module could not be evaluated or mounted
//! - `SandboxError`: host-side failures talking to an isolated context
//!
//! `RenderError` unifies the first two; its display string is exactly what
//! the runner reports back as the `message` of an error `RenderResponse`.

use thiserror::Error;

/// Errors raised while linking artifact source inside the isolated context.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("SyntaxError{}: {message}", line_suffix(.line))]
    Syntax { line: Option<usize>, message: String },

    #[error(
        "Relative import \"{specifier}\" is not supported inside artifacts. Inline the component or use a supported library (react, react-dom, recharts)."
    )]
    RelativeImport { specifier: String },

    #[error("Artifact tried to import unsupported module \"{specifier}\".")]
    UnsupportedImport { specifier: String },

    #[error("Artifact must export a React component (export default): no default export found.")]
    MissingDefaultExport,

    #[error("Artifact must export a React component (export default): default export is {found}, not a function.")]
    InvalidDefaultExport { found: String },

    #[error("ReferenceError: {name} is not defined")]
    UndefinedExport { name: String },
}

fn line_suffix(line: &Option<usize>) -> String {
    line.map(|n| format!(" (line {})", n)).unwrap_or_default()
}

/// Errors raised by the component runtime after a module linked cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("{binding} failed to load inside artifact runner.")]
    DependencyMissing { binding: String },

    #[error("{0}")]
    Evaluation(String),

    #[error("Failed to mount artifact: {0}")]
    Mount(String),

    #[error("Artifact runner panicked: {0}")]
    Panicked(String),
}

/// Any failure between receiving a render request and mounting its component.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Host-side errors around an isolated execution context.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("Failed to spawn artifact runner: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Isolated context is closed")]
    ContextClosed,

    #[error("Failed to encode render request: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Runner I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
