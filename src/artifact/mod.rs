//! Artifact detection.
//!
//! An assistant reply may carry interactive UI snippets inside fenced code
//! blocks tagged with a component dialect (`tsx`, `jsx`). The parser turns
//! each qualifying block into an [`Artifact`] whose id is stable across
//! re-parses of the same (possibly growing) message text.

mod parser;
mod types;

pub use parser::{DEFAULT_LANGUAGES, FenceParser, derive_title, parse_artifacts};
pub use types::{Artifact, ArtifactStatus};
