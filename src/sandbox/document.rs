//! The fixed, versioned execution resource loaded into the isolated context.
//!
//! The host embeds it in an iframe sandboxed with `allow-scripts` only (no
//! `allow-same-origin`), so the document runs with an opaque origin and
//! cannot reach host storage, cookies or DOM.

use serde::Serialize;
use sha2::{Digest, Sha256};

use super::assets;
use super::runner::RUNNER_PROTOCOL_VERSION;

/// Content-Security-Policy sent with the runner document.
pub const RUNNER_CSP: &str = "default-src 'self'; script-src 'self' 'unsafe-eval'; style-src 'self' 'unsafe-inline'; connect-src 'self';";

/// Sandbox attribute for the iframe hosting the document.
pub const IFRAME_SANDBOX: &str = "allow-scripts";

/// Served path of the runner document.
pub const RUNNER_PATH: &str = "/artifact-runner";

/// What a host page needs to embed the runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbedDescriptor {
    pub src: String,
    pub version: String,
    pub sandbox: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerDocument {
    version: String,
    html: String,
    etag: String,
}

impl Default for RunnerDocument {
    fn default() -> Self {
        Self::new(RUNNER_PROTOCOL_VERSION)
    }
}

impl RunnerDocument {
    pub fn new(version: &str) -> Self {
        let html = render_html(version);
        let etag = compute_etag(&html);
        Self {
            version: version.to_string(),
            html,
            etag,
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn html(&self) -> &str {
        &self.html
    }

    /// Path prefix of the scripts this version of the document loads.
    pub fn asset_prefix(&self) -> String {
        format!("{}/{}/", RUNNER_PATH, self.version)
    }

    /// Served URLs of every script tag, in load order.
    pub fn script_urls(&self) -> Vec<String> {
        let prefix = self.asset_prefix();
        assets::document_scripts()
            .map(|path| format!("{}{}", prefix, path))
            .collect()
    }

    pub fn embed(&self) -> EmbedDescriptor {
        EmbedDescriptor {
            src: RUNNER_PATH.to_string(),
            version: self.version.clone(),
            sandbox: IFRAME_SANDBOX,
        }
    }

    /// Strong validator: quoted sha256 of the document.
    pub fn etag(&self) -> &str {
        &self.etag
    }

    /// Whether an `If-None-Match` header value matches this document.
    pub fn matches(&self, if_none_match: &str) -> bool {
        if_none_match
            .split(',')
            .map(str::trim)
            .any(|tag| tag == "*" || tag == self.etag)
    }
}

fn compute_etag(html: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(html.as_bytes());
    format!("\"{:x}\"", hasher.finalize())
}

fn render_html(version: &str) -> String {
    let scripts: String = assets::document_scripts()
        .map(|path| {
            format!(
                "    <script src=\"{}/{}/{}\"></script>\n",
                RUNNER_PATH, version, path
            )
        })
        .collect();

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <meta http-equiv="Content-Security-Policy" content="{csp}" />
    <meta name="artifact-runner-version" content="{version}" />
    <title>Artifact runner</title>
  </head>
  <body>
    <div id="root"></div>
{scripts}  </body>
</html>
"#,
        csp = RUNNER_CSP,
        version = version,
        scripts = scripts,
    )
}
