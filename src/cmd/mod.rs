//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module    | Commands handled     |
//! |-----------|----------------------|
//! | `parse`   | `Parse`              |
//! | `replay`  | `Replay`             |
//! | `render`  | `Render`, `Runner`   |
//! | `serve`   | `Serve`              |
//! | `config`  | `Config`             |

pub mod config;
pub mod parse;
pub mod render;
pub mod replay;
pub mod serve;

pub use config::cmd_config;
pub use parse::cmd_parse;
pub use render::{cmd_render, cmd_runner};
pub use replay::cmd_replay;
pub use serve::cmd_serve;

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};

/// Read a file argument; `-` means stdin.
pub(crate) fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut content = String::new();
        std::io::stdin()
            .read_to_string(&mut content)
            .context("Failed to read stdin")?;
        return Ok(content);
    }
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}
