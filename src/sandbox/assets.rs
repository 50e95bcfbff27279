//! Runner scripts compiled into the binary.
//!
//! The same files back both runtimes: the runner document loads them over
//! `/artifact-runner/{version}/...`, and the embedded engine evaluates the
//! library scripts and `runtime.js` directly.

use std::borrow::Cow;

use rust_embed::RustEmbed;

use super::compiler::ModuleBinding;

#[derive(RustEmbed)]
#[folder = "$CARGO_MANIFEST_DIR/assets/artifact-runner/"]
pub struct RunnerAssets;

/// Library scripts in load order, each with the global it binds.
pub const LIBRARY_SCRIPTS: &[(ModuleBinding, &str)] = &[
    (ModuleBinding::React, "vendor/react.js"),
    (ModuleBinding::ReactDom, "vendor/react-dom.js"),
    (ModuleBinding::Recharts, "vendor/recharts.js"),
];

/// JSX/TypeScript lowering, module linking and mounting.
pub const RUNTIME_SCRIPT: &str = "runtime.js";

/// Browser message loop; only the runner document loads it.
pub const RUNNER_SCRIPT: &str = "runner.js";

/// Every script the runner document loads, in order.
pub fn document_scripts() -> impl Iterator<Item = &'static str> {
    LIBRARY_SCRIPTS
        .iter()
        .map(|(_, path)| *path)
        .chain([RUNTIME_SCRIPT, RUNNER_SCRIPT])
}

/// An embedded file ready to serve.
pub struct Asset {
    pub body: Cow<'static, [u8]>,
    pub content_type: String,
    /// Strong validator: quoted sha256 of the file
    pub etag: String,
}

pub fn lookup(path: &str) -> Option<Asset> {
    if path.split('/').any(|segment| segment == "..") {
        return None;
    }
    let file = RunnerAssets::get(path)?;
    let content_type = mime_guess::from_path(path)
        .first_or_octet_stream()
        .to_string();
    let etag = format!("\"{}\"", hex(&file.metadata.sha256_hash()));
    Some(Asset {
        body: file.data,
        content_type,
        etag,
    })
}

/// Source text of an embedded script.
pub fn script(path: &str) -> Option<Cow<'static, [u8]>> {
    RunnerAssets::get(path).map(|file| file.data)
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
