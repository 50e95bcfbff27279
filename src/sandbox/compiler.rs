//! Artifact module linking.
//!
//! Turns artifact source into a [`CompiledModule`] the component runtime can
//! execute:
//!
//! 1. Comment masking: comments are blanked so commented-out imports and
//!    exports do not count. Offsets and lines are kept.
//! 2. Import resolution against a closed module map. Anything outside the
//!    map fails loudly instead of resolving to nothing.
//! 3. Default-export contract: the module must default-export something
//!    callable (a function, class or arrow function).
//! 4. Linking: ES module syntax is rewritten to `require`/`module.exports`
//!    form over the pre-bound libraries. Edits found on the masked text are
//!    applied to the original source, with line breaks preserved.
//!
//! Syntax is not checked here. The component runtime parses the linked
//! program and reports `SyntaxError`s with the artifact's own line numbers.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::errors::CompileError;

/// A library binding the isolated context pre-loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ModuleBinding {
    React,
    ReactDom,
    Recharts,
}

impl ModuleBinding {
    /// Global name of the library inside the isolated context.
    pub fn library_name(&self) -> &'static str {
        match self {
            ModuleBinding::React => "React",
            ModuleBinding::ReactDom => "ReactDOM",
            ModuleBinding::Recharts => "Recharts",
        }
    }
}

impl std::fmt::Display for ModuleBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.library_name())
    }
}

/// The only module names an artifact may reference.
pub const MODULE_MAP: &[(&str, ModuleBinding)] = &[
    ("react", ModuleBinding::React),
    ("react/jsx-runtime", ModuleBinding::React),
    ("react/jsx-dev-runtime", ModuleBinding::React),
    ("react-dom", ModuleBinding::ReactDom),
    ("react-dom/client", ModuleBinding::ReactDom),
    ("recharts", ModuleBinding::Recharts),
];

/// Resolve a module specifier through the closed map.
pub fn resolve_module(specifier: &str) -> Result<ModuleBinding, CompileError> {
    if let Some((_, binding)) = MODULE_MAP.iter().find(|(name, _)| *name == specifier) {
        return Ok(*binding);
    }
    if specifier.starts_with('.') || specifier.starts_with('/') {
        return Err(CompileError::RelativeImport {
            specifier: specifier.to_string(),
        });
    }
    Err(CompileError::UnsupportedImport {
        specifier: specifier.to_string(),
    })
}

/// One resolved `import`/`require` of the artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedImport {
    pub specifier: String,
    pub binding: ModuleBinding,
    /// 1-based source line
    pub line: usize,
}

/// Shape of the default export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    Function,
    Class,
    Arrow,
    /// A component imported from a bound library
    Imported,
    /// A call or other expression assumed to produce a component
    Expression,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultExport {
    /// Declared or referenced name, when there is one
    pub name: Option<String>,
    pub kind: ExportKind,
}

/// A linked artifact module, ready for the component runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledModule {
    pub imports: Vec<ResolvedImport>,
    pub default_export: DefaultExport,
    /// CommonJS-form program: imports become `require`, the default export
    /// lands on `module.exports.default`
    pub program: String,
}

impl CompiledModule {
    pub fn bindings(&self) -> BTreeSet<ModuleBinding> {
        self.imports.iter().map(|i| i.binding).collect()
    }
}

// ── Import patterns ──────────────────────────────────────────────────

static IMPORT_FROM_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^[ \t]*import\s+(type\s+)?([\w$*{}\s,]+?)\s*from\s*['"]([^'"\n]+)['"][ \t]*;?"#)
        .unwrap()
});

static IMPORT_BARE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?m)^[ \t]*import\s*['"]([^'"\n]+)['"][ \t]*;?"#).unwrap());

static EXPORT_FROM_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?m)^[ \t]*export\s+(type\s+)?(?:\*(?:\s+as\s+[\w$]+)?|\{[^}]*\})\s*from\s*['"]([^'"\n]+)['"][ \t]*;?"#,
    )
    .unwrap()
});

static REQUIRE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\brequire\s*\(\s*['"]([^'"\n]+)['"]\s*\)"#).unwrap());

static DYNAMIC_IMPORT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\bimport\s*\(\s*['"]([^'"\n]+)['"]\s*\)"#).unwrap());

// ── Export patterns ──────────────────────────────────────────────────

static EXPORT_DEFAULT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bexport\s+default\s+").unwrap());

static EXPORT_AS_DEFAULT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bexport\s*\{[^}]*?\b([A-Za-z_$][\w$]*)\s+as\s+default\b[^}]*\}\s*;?").unwrap()
});

static MODULE_EXPORTS_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bmodule\.exports\s*=\s*").unwrap());

static FUNCTION_EXPR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:async\s+)?function\b\s*\*?\s*([A-Za-z_$][\w$]*)?").unwrap()
});

static CLASS_EXPR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^class\b\s*([A-Za-z_$][\w$]*)?").unwrap());

static ARROW_EXPR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:async\s*)?(?:\([^;]*?\)|[A-Za-z_$][\w$]*)\s*(?::\s*[^=;]+?)?=>").unwrap()
});

static WRAPPER_EXPR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:React\s*\.\s*)?(?:memo|forwardRef|lazy)\s*(?:<[^>]*>)?\s*\(").unwrap()
});

static IDENT_EXPR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z_$][\w$]*)\s*(?:;|\n|$)").unwrap());

static NAMED_DEFAULT_DECL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bexport\s+default\s+((?:async\s+)?function\b\s*\*?\s*([A-Za-z_$][\w$]*)|class\s+([A-Za-z_$][\w$]*))")
        .unwrap()
});

static EXPORT_LIST_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bexport\s*\{[^}]*\}\s*;?").unwrap());

static EXPORT_DECL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^([ \t]*)export\s+((?:const|let|var|function|class|async|interface|type|enum)\b)").unwrap()
});

/// Link artifact source into a [`CompiledModule`].
pub fn compile(source: &str) -> Result<CompiledModule, CompileError> {
    let masked = mask(source);
    let imports = resolve_imports(&masked)?;
    let locals = imported_locals(&masked);
    let default_export = find_default_export(&masked, &locals)?;
    let program = link(source, &masked);

    Ok(CompiledModule {
        imports,
        default_export,
        program,
    })
}

// ── Comment masking ──────────────────────────────────────────────────

/// Keywords after which a quote opens a string literal.
const STRING_KEYWORDS: &[&str] = &[
    "from", "import", "return", "case", "typeof", "in", "of", "else", "export", "default",
    "await", "yield", "void", "throw",
];

/// Keywords after which `/` starts a regular expression literal.
const REGEX_KEYWORDS: &[&str] = &[
    "return", "typeof", "case", "in", "of", "else", "void", "throw", "yield", "await", "delete",
];

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || b >= 0x80
}

/// JSX text may contain bare apostrophes (`Don't`), so a quote only opens a
/// string where an expression can start.
fn quote_opens_string(prev: Option<u8>, word: &str) -> bool {
    match prev {
        None => true,
        Some(b) if is_ident_byte(b) => STRING_KEYWORDS.contains(&word),
        Some(b) => !matches!(b, b'>' | b')' | b']' | b'}'),
    }
}

fn regex_allowed(prev: Option<u8>, word: &str) -> bool {
    match prev {
        None => true,
        Some(b) if is_ident_byte(b) => REGEX_KEYWORDS.contains(&word),
        Some(b) => b"(,=:[!&|?{};+-*%~^".contains(&b),
    }
}

/// End of the quoted literal at `start`; stops at a line break.
fn skip_quoted(bytes: &[u8], start: usize) -> usize {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() && bytes[i] != b'\n' {
        match bytes[i] {
            b'\\' => i += 2,
            b if b == quote => return i + 1,
            _ => i += 1,
        }
    }
    i.min(bytes.len())
}

fn skip_template(bytes: &[u8], start: usize) -> usize {
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'`' => return i + 1,
            b'$' if bytes.get(i + 1) == Some(&b'{') => {
                let mut depth = 1;
                i += 2;
                while i < bytes.len() && depth > 0 {
                    match bytes[i] {
                        b'{' => depth += 1,
                        b'}' => depth -= 1,
                        b'`' => {
                            i = skip_template(bytes, i);
                            continue;
                        }
                        b'"' | b'\'' => {
                            i = skip_quoted(bytes, i);
                            continue;
                        }
                        _ => {}
                    }
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    bytes.len()
}

/// End of the regular expression literal at `start`, or `None` when the
/// line ends first and the slash was a plain operator after all.
fn skip_regex(bytes: &[u8], start: usize) -> Option<usize> {
    let mut i = start + 1;
    let mut in_class = false;
    while i < bytes.len() {
        match bytes[i] {
            b'\n' => return None,
            b'\\' => i += 1,
            b'[' => in_class = true,
            b']' => in_class = false,
            b'/' if !in_class => {
                i += 1;
                while i < bytes.len() && is_ident_byte(bytes[i]) {
                    i += 1;
                }
                return Some(i);
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Blank comments, keeping every byte offset and line break.
///
/// Never fails: the regexes that follow only need comments out of the way.
/// Malformed source is left for the engine's parser to report.
fn mask(source: &str) -> String {
    let bytes = source.as_bytes();
    let mut out = bytes.to_vec();
    let mut prev: Option<u8> = None;
    let mut word_start = 0usize;
    let mut word = "";
    let mut i = 0usize;

    while i < bytes.len() {
        let b = bytes[i];
        let next = bytes.get(i + 1).copied();
        match b {
            b'/' if next == Some(b'/') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    out[i] = b' ';
                    i += 1;
                }
                continue;
            }
            b'/' if next == Some(b'*') => {
                // an unclosed comment stays visible for the parser to reject
                let Some(at) = source[i + 2..].find("*/") else {
                    break;
                };
                let end = i + 2 + at + 2;
                for slot in &mut out[i..end] {
                    if *slot != b'\n' {
                        *slot = b' ';
                    }
                }
                i = end;
                continue;
            }
            b'/' if regex_allowed(prev, word) => {
                if let Some(end) = skip_regex(bytes, i) {
                    i = end;
                    prev = Some(b'/');
                    continue;
                }
            }
            b'"' | b'\'' if quote_opens_string(prev, word) => {
                i = skip_quoted(bytes, i);
                prev = Some(b);
                continue;
            }
            b'`' => {
                i = skip_template(bytes, i);
                prev = Some(b);
                continue;
            }
            _ => {}
        }

        if is_ident_byte(b) {
            if i == 0 || !is_ident_byte(bytes[i - 1]) {
                word_start = i;
            }
            word = source.get(word_start..i + 1).unwrap_or("");
        }
        if !b.is_ascii_whitespace() {
            prev = Some(b);
        }
        i += 1;
    }

    String::from_utf8(out).unwrap_or_else(|_| source.to_string())
}

// ── Imports ──────────────────────────────────────────────────────────

fn line_at(source: &str, offset: usize) -> usize {
    source[..offset].matches('\n').count() + 1
}

fn resolve_imports(source: &str) -> Result<Vec<ResolvedImport>, CompileError> {
    // (offset, specifier); type-only imports are erased before linking
    let mut found: Vec<(usize, String)> = Vec::new();

    for cap in IMPORT_FROM_REGEX.captures_iter(source) {
        if cap.get(1).is_some() {
            continue;
        }
        found.push((cap.get(0).map_or(0, |m| m.start()), cap[3].to_string()));
    }
    for cap in EXPORT_FROM_REGEX.captures_iter(source) {
        if cap.get(1).is_some() {
            continue;
        }
        found.push((cap.get(0).map_or(0, |m| m.start()), cap[2].to_string()));
    }
    for re in [&*IMPORT_BARE_REGEX, &*REQUIRE_REGEX, &*DYNAMIC_IMPORT_REGEX] {
        for cap in re.captures_iter(source) {
            found.push((cap.get(0).map_or(0, |m| m.start()), cap[1].to_string()));
        }
    }
    found.sort_by_key(|(offset, _)| *offset);

    found
        .into_iter()
        .map(|(offset, specifier)| {
            let binding = resolve_module(&specifier)?;
            Ok(ResolvedImport {
                specifier,
                binding,
                line: line_at(source, offset),
            })
        })
        .collect()
}

/// Local names bound by import clauses.
fn imported_locals(source: &str) -> BTreeSet<String> {
    let mut locals = BTreeSet::new();
    for cap in IMPORT_FROM_REGEX.captures_iter(source) {
        if cap.get(1).is_some() {
            continue;
        }
        let clause = parse_clause(&cap[2]);
        locals.extend(clause.default);
        locals.extend(clause.namespace);
        locals.extend(clause.named.into_iter().map(|(_, local)| local));
    }
    locals
}

#[derive(Debug, Default, PartialEq, Eq)]
struct ImportClause {
    default: Option<String>,
    namespace: Option<String>,
    /// (imported, local)
    named: Vec<(String, String)>,
}

fn parse_clause(clause: &str) -> ImportClause {
    let mut parsed = ImportClause::default();
    let clause = clause.trim();

    let (head, braces) = match (clause.find('{'), clause.rfind('}')) {
        (Some(open), Some(close)) if close > open => (&clause[..open], Some(&clause[open + 1..close])),
        _ => (clause, None),
    };

    for part in head.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        if let Some(rest) = part.strip_prefix('*') {
            let name = rest.trim().trim_start_matches("as").trim();
            if !name.is_empty() {
                parsed.namespace = Some(name.to_string());
            }
        } else {
            parsed.default = Some(part.to_string());
        }
    }

    if let Some(inner) = braces {
        for item in inner.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            if item.starts_with("type ") {
                continue;
            }
            let mut pieces = item.split_whitespace();
            let imported = pieces.next().unwrap_or_default().to_string();
            let local = match (pieces.next(), pieces.next()) {
                (Some("as"), Some(local)) => local.to_string(),
                _ => imported.clone(),
            };
            parsed.named.push((imported, local));
        }
    }

    parsed
}

// ── Default export ───────────────────────────────────────────────────

fn find_default_export(
    source: &str,
    locals: &BTreeSet<String>,
) -> Result<DefaultExport, CompileError> {
    if let Some(m) = EXPORT_DEFAULT_REGEX.find(source) {
        return classify(&source[m.end()..], source, locals, 0);
    }
    if let Some(cap) = EXPORT_AS_DEFAULT_REGEX.captures(source) {
        return resolve_identifier(&cap[1], source, locals, 0);
    }
    if let Some(m) = MODULE_EXPORTS_REGEX.find(source) {
        return classify(&source[m.end()..], source, locals, 0);
    }
    Err(CompileError::MissingDefaultExport)
}

fn invalid(found: &str) -> CompileError {
    CompileError::InvalidDefaultExport {
        found: found.to_string(),
    }
}

/// Classify the expression at the start of `expr`.
fn classify(
    expr: &str,
    source: &str,
    locals: &BTreeSet<String>,
    depth: usize,
) -> Result<DefaultExport, CompileError> {
    let expr = expr.trim_start();

    if let Some(cap) = FUNCTION_EXPR_REGEX.captures(expr) {
        return Ok(DefaultExport {
            name: cap.get(1).map(|m| m.as_str().to_string()),
            kind: ExportKind::Function,
        });
    }
    if let Some(cap) = CLASS_EXPR_REGEX.captures(expr) {
        return Ok(DefaultExport {
            name: cap.get(1).map(|m| m.as_str().to_string()),
            kind: ExportKind::Class,
        });
    }
    if ARROW_EXPR_REGEX.is_match(expr) {
        return Ok(DefaultExport {
            name: None,
            kind: ExportKind::Arrow,
        });
    }
    if WRAPPER_EXPR_REGEX.is_match(expr) {
        return Err(invalid("an object (memo/forwardRef/lazy wrapper)"));
    }
    if let Some(cap) = IDENT_EXPR_REGEX.captures(expr) {
        return match &cap[1] {
            "true" | "false" => Err(invalid("a boolean")),
            "null" => Err(invalid("null")),
            "undefined" => Err(invalid("undefined")),
            name => resolve_identifier(name, source, locals, depth),
        };
    }

    match expr.chars().next() {
        None => Err(CompileError::MissingDefaultExport),
        Some('{') => Err(invalid("an object")),
        Some('[') => Err(invalid("an array")),
        Some('"' | '\'' | '`') => Err(invalid("a string")),
        Some(c) if c.is_ascii_digit() || c == '-' || c == '+' => Err(invalid("a number")),
        Some('<') => Err(invalid("a rendered element")),
        _ => Ok(DefaultExport {
            name: None,
            kind: ExportKind::Expression,
        }),
    }
}

fn resolve_identifier(
    name: &str,
    source: &str,
    locals: &BTreeSet<String>,
    depth: usize,
) -> Result<DefaultExport, CompileError> {
    let escaped = regex::escape(name);
    let named = |kind| {
        Ok(DefaultExport {
            name: Some(name.to_string()),
            kind,
        })
    };

    let function_decl = Regex::new(&format!(r"\bfunction\s*\*?\s+{}\s*[(<]", escaped));
    if function_decl.is_ok_and(|re| re.is_match(source)) {
        return named(ExportKind::Function);
    }
    let class_decl = Regex::new(&format!(r"\bclass\s+{}\b", escaped));
    if class_decl.is_ok_and(|re| re.is_match(source)) {
        return named(ExportKind::Class);
    }
    let var_decl = Regex::new(&format!(r"\b(?:const|let|var)\s+{}\s*(?::[^=]+)?=\s*", escaped));
    if let Some(m) = var_decl.ok().and_then(|re| re.find(source)) {
        if depth >= 2 {
            return named(ExportKind::Expression);
        }
        let resolved = classify(&source[m.end()..], source, locals, depth + 1)?;
        return Ok(DefaultExport {
            name: Some(name.to_string()),
            kind: resolved.kind,
        });
    }
    if locals.contains(name) {
        return named(ExportKind::Imported);
    }
    Err(CompileError::UndefinedExport {
        name: name.to_string(),
    })
}

// ── Linking ──────────────────────────────────────────────────────────

fn require_statements(clause: &ImportClause, specifier: &str) -> String {
    let mut statements = Vec::new();
    let target = format!("require({:?})", specifier);
    if let Some(default) = &clause.default {
        statements.push(format!("const {} = {};", default, target));
    }
    if let Some(namespace) = &clause.namespace {
        statements.push(format!("const {} = {};", namespace, target));
    }
    if !clause.named.is_empty() {
        let fields = clause
            .named
            .iter()
            .map(|(imported, local)| {
                if imported == local {
                    imported.clone()
                } else {
                    format!("{}: {}", imported, local)
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        statements.push(format!("const {{ {} }} = {};", fields, target));
    }
    if statements.is_empty() {
        statements.push(format!("{};", target));
    }
    statements.join(" ")
}

/// A replacement of `start..end` in the source.
struct Edit {
    start: usize,
    end: usize,
    text: String,
}

#[derive(Default)]
struct Edits(Vec<Edit>);

impl Edits {
    /// Record an edit unless it overlaps one recorded earlier.
    fn push(&mut self, start: usize, end: usize, text: impl Into<String>) {
        if self.0.iter().any(|e| start < e.end && e.start < end) {
            return;
        }
        self.0.push(Edit {
            start,
            end,
            text: text.into(),
        });
    }

    fn apply(mut self, source: &str) -> String {
        self.0.sort_by_key(|e| e.start);
        let mut out = String::with_capacity(source.len());
        let mut at = 0;
        for edit in self.0 {
            // a match may end inside a blanked comment holding multi-byte text
            let start = floor_char_boundary(source, edit.start).max(at);
            let end = floor_char_boundary(source, edit.end).max(start);
            out.push_str(&source[at..start]);
            out.push_str(&edit.text);
            // keep the line count so engine errors point at artifact lines
            let replaced = source[start..end].matches('\n').count();
            let written = edit.text.matches('\n').count();
            for _ in written..replaced {
                out.push('\n');
            }
            at = end;
        }
        out.push_str(&source[at..]);
        out
    }
}

fn floor_char_boundary(source: &str, mut index: usize) -> usize {
    index = index.min(source.len());
    while !source.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// Rewrite module syntax. Matches come from `masked`; the text they replace
/// is taken from `source`, so comments and JSX text survive untouched.
fn link(source: &str, masked: &str) -> String {
    let mut edits = Edits::default();

    for cap in IMPORT_FROM_REGEX.captures_iter(masked) {
        let Some(m) = cap.get(0) else { continue };
        let text = if cap.get(1).is_some() {
            String::new()
        } else {
            require_statements(&parse_clause(&cap[2]), &cap[3])
        };
        edits.push(m.start(), m.end(), text);
    }
    for cap in IMPORT_BARE_REGEX.captures_iter(masked) {
        let Some(m) = cap.get(0) else { continue };
        edits.push(m.start(), m.end(), format!("require({:?});", &cap[1]));
    }
    for cap in EXPORT_FROM_REGEX.captures_iter(masked) {
        let Some(m) = cap.get(0) else { continue };
        let text = if cap.get(1).is_some() {
            String::new()
        } else {
            format!("require({:?});", &cap[2])
        };
        edits.push(m.start(), m.end(), text);
    }

    let mut footer = None;
    if let Some(cap) = NAMED_DEFAULT_DECL_REGEX.captures(masked) {
        if let (Some(m), Some(decl)) = (cap.get(0), cap.get(1)) {
            let name = cap.get(2).or_else(|| cap.get(3)).map(|n| n.as_str());
            footer = name.map(|n| format!("\nmodule.exports.default = {};", n));
            edits.push(m.start(), decl.start(), "");
        }
    } else if let Some(m) = EXPORT_DEFAULT_REGEX.find(masked) {
        edits.push(m.start(), m.end(), "module.exports.default = ");
    }

    if let Some(cap) = EXPORT_AS_DEFAULT_REGEX.captures(masked) {
        if let Some(m) = cap.get(0) {
            edits.push(m.start(), m.end(), format!("module.exports.default = {};", &cap[1]));
        }
    }
    for m in EXPORT_LIST_REGEX.find_iter(masked) {
        edits.push(m.start(), m.end(), "");
    }
    for cap in EXPORT_DECL_REGEX.captures_iter(masked) {
        if let (Some(indent), Some(decl)) = (cap.get(1), cap.get(2)) {
            edits.push(indent.end(), decl.start(), "");
        }
    }

    let mut program = edits.apply(source);
    if let Some(footer) = footer {
        program.push_str(&footer);
    }
    program
}

#[cfg(test)]
mod tests {
    use super::*;

    const DASHBOARD: &str = r#"import React, { useState } from "react";
import { LineChart, Line, XAxis as X } from 'recharts';
import type { Props } from "./types";

// Don't forget: this comment has an apostrophe
export default function SalesDashboard({ title }: Props) {
  const [count, setCount] = useState(0);
  return (
    <div className="p-4" title={`Total ${count}`}>
      <p>Don't panic, it's "fine"</p>
      <LineChart data={[]}><Line dataKey="v" /><X /></LineChart>
    </div>
  );
}
"#;

    #[test]
    fn test_compiles_typical_artifact() {
        let module = compile(DASHBOARD).unwrap();
        assert_eq!(module.default_export.kind, ExportKind::Function);
        assert_eq!(module.default_export.name.as_deref(), Some("SalesDashboard"));
        assert_eq!(
            module.bindings().into_iter().collect::<Vec<_>>(),
            vec![ModuleBinding::React, ModuleBinding::Recharts]
        );
        assert_eq!(module.imports.len(), 2);
        assert_eq!(module.imports[1].line, 2);
    }

    #[test]
    fn test_linked_program_uses_require() {
        let module = compile(DASHBOARD).unwrap();
        let program = &module.program;
        assert!(program.contains(r#"const React = require("react");"#));
        assert!(program.contains(r#"const { useState } = require("react");"#));
        assert!(program.contains(r#"const { LineChart, Line, XAxis: X } = require("recharts");"#));
        assert!(!program.contains("./types"));
        assert!(!program.contains("import "));
        assert!(program.contains("function SalesDashboard("));
        assert!(program.trim_end().ends_with("module.exports.default = SalesDashboard;"));
    }

    #[test]
    fn test_relative_import_rejected() {
        let code = "import Bar from './bar';\nexport default function App() { return <Bar/>; }";
        assert_eq!(
            compile(code).unwrap_err(),
            CompileError::RelativeImport {
                specifier: "./bar".to_string()
            }
        );
    }

    #[test]
    fn test_unsupported_package_rejected() {
        let code = "import _ from 'lodash';\nexport default () => <div/>;";
        let err = compile(code).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Artifact tried to import unsupported module \"lodash\"."
        );
    }

    #[test]
    fn test_require_and_dynamic_import_checked() {
        let code = "const fs = require('fs');\nexport default () => <div/>;";
        assert!(matches!(
            compile(code),
            Err(CompileError::UnsupportedImport { specifier }) if specifier == "fs"
        ));

        let code = "export default function App() { import('./chunk'); return <div/>; }";
        assert!(matches!(compile(code), Err(CompileError::RelativeImport { .. })));
    }

    #[test]
    fn test_reexport_checked() {
        let code = "export * from 'axios';\nexport default () => <div/>;";
        assert!(matches!(compile(code), Err(CompileError::UnsupportedImport { .. })));
    }

    #[test]
    fn test_first_bad_import_in_source_order_wins() {
        let code = "import a from 'alpha';\nimport b from './beta';\nexport default () => <div/>;";
        assert!(matches!(
            compile(code),
            Err(CompileError::UnsupportedImport { specifier }) if specifier == "alpha"
        ));
    }

    #[test]
    fn test_commented_out_import_ignored() {
        let code = "// import x from './x';\n/* import y from 'y'; */\nexport default () => <div/>;";
        assert!(compile(code).unwrap().imports.is_empty());
    }

    #[test]
    fn test_missing_default_export() {
        let code = "function Foo() { return <div/>; }";
        assert_eq!(compile(code).unwrap_err(), CompileError::MissingDefaultExport);
    }

    #[test]
    fn test_named_export_is_not_default() {
        let code = "export function Foo() { return <div/>; }";
        assert_eq!(compile(code).unwrap_err(), CompileError::MissingDefaultExport);
    }

    #[test]
    fn test_non_callable_default_exports() {
        for (code, found) in [
            ("export default { a: 1 };", "an object"),
            ("export default [1, 2];", "an array"),
            ("export default 'hello';", "a string"),
            ("export default 42;", "a number"),
            ("export default null;", "null"),
            ("export default <div/>;", "a rendered element"),
        ] {
            match compile(code) {
                Err(CompileError::InvalidDefaultExport { found: f }) => assert_eq!(f, found, "{}", code),
                other => panic!("{}: expected InvalidDefaultExport, got {:?}", code, other),
            }
        }
    }

    #[test]
    fn test_memo_wrapper_is_not_a_function() {
        let code = "import React from 'react';\nfunction A(){ return <div/>; }\nexport default React.memo(A);";
        assert!(matches!(compile(code), Err(CompileError::InvalidDefaultExport { .. })));
    }

    #[test]
    fn test_default_export_identifier_resolution() {
        let code = "const Counter = () => (<button/>);\nexport default Counter;";
        let module = compile(code).unwrap();
        assert_eq!(module.default_export.kind, ExportKind::Arrow);
        assert_eq!(module.default_export.name.as_deref(), Some("Counter"));

        let code = "function Panel() { return <div/>; }\nexport default Panel;";
        assert_eq!(compile(code).unwrap().default_export.kind, ExportKind::Function);

        let code = "const config = { a: 1 };\nexport default config;";
        assert!(matches!(compile(code), Err(CompileError::InvalidDefaultExport { .. })));

        let code = "export default Missing;";
        assert_eq!(
            compile(code).unwrap_err(),
            CompileError::UndefinedExport {
                name: "Missing".to_string()
            }
        );
    }

    #[test]
    fn test_imported_component_as_default() {
        let code = "import { ResponsiveContainer } from 'recharts';\nexport default ResponsiveContainer;";
        assert_eq!(compile(code).unwrap().default_export.kind, ExportKind::Imported);
    }

    #[test]
    fn test_export_as_default_and_module_exports() {
        let code = "function App() { return <div/>; }\nexport { App as default };";
        let module = compile(code).unwrap();
        assert_eq!(module.default_export.name.as_deref(), Some("App"));
        assert!(module.program.contains("module.exports.default = App;"));

        let code = "module.exports = function App() { return <div/>; };";
        assert_eq!(compile(code).unwrap().default_export.kind, ExportKind::Function);
    }

    #[test]
    fn test_class_and_arrow_defaults() {
        let code = "import React from 'react';\nexport default class Board extends React.Component { render() { return <div/>; } }";
        assert_eq!(compile(code).unwrap().default_export.kind, ExportKind::Class);

        let code = "export default ({ items }) => (<ul/>);";
        let module = compile(code).unwrap();
        assert_eq!(module.default_export.kind, ExportKind::Arrow);
        assert!(module.program.starts_with("module.exports.default = "));
    }

    #[test]
    fn test_call_expression_default_is_accepted() {
        let code = "function A(){ return <div/>; }\nexport default withTheme(A);";
        assert_eq!(compile(code).unwrap().default_export.kind, ExportKind::Expression);
    }

    #[test]
    fn test_incomplete_source_is_left_to_the_parser() {
        let code = "export default function App() {\n  return (<div>";
        let module = compile(code).unwrap();
        assert_eq!(module.default_export.name.as_deref(), Some("App"));
        assert!(module.program.starts_with("function App() {\n  return (<div>"));
    }

    #[test]
    fn test_regex_literal_with_quote() {
        let code = "const s = \"it's\".replace(/'/g, \"\");\nexport default function Quote() { return <p>{s}</p>; }";
        let module = compile(code).unwrap();
        assert_eq!(module.default_export.name.as_deref(), Some("Quote"));
        assert!(module.program.contains(r#"replace(/'/g, "")"#));
    }

    #[test]
    fn test_url_in_jsx_text_survives_linking() {
        let code = r#"import React from "react";
export default function Links({ items }) {
  return (
    <div>
      <p>See https://example.com</p>{items.map(i => (<span key={i}>{i}</span>))}
    </div>
  );
}"#;
        let module = compile(code).unwrap();
        assert!(module.program.contains("<p>See https://example.com</p>{items.map(i => (<span key={i}>{i}</span>))}"));
        assert_eq!(module.program.lines().count(), code.lines().count() + 1);
    }

    #[test]
    fn test_multiline_import_keeps_line_numbers() {
        let code = "import {\n  useState,\n  useEffect,\n} from 'react';\nexport default function App() { return <div/>; }";
        let module = compile(code).unwrap();
        let lines: Vec<&str> = module.program.lines().collect();
        assert_eq!(lines[0], r#"const { useState, useEffect } = require("react");"#);
        assert_eq!(lines[4], "function App() { return <div/>; }");
    }

    #[test]
    fn test_mask_blanks_comments_in_place() {
        let code = "const a = 1; // note é\n/* block\n */ const b = '//';";
        let masked = mask(code);
        assert_eq!(masked.len(), code.len());
        assert_eq!(masked.lines().count(), code.lines().count());
        assert!(!masked.contains("note"));
        assert!(!masked.contains("block"));
        assert!(masked.contains("const b = '//';"));
    }

    #[test]
    fn test_unclosed_comment_is_not_masked() {
        let code = "/* never closed\nexport default () => <div/>;";
        assert_eq!(mask(code), code);
    }

    #[test]
    fn test_braces_inside_literals_do_not_count() {
        let code = "const a = '{';\nconst b = \"}}\";\nconst c = `${ {x: '}'}.x }`;\n// }\nexport default () => <div>{a}</div>;";
        assert!(compile(code).is_ok());
    }

    #[test]
    fn test_parse_clause_forms() {
        assert_eq!(
            parse_clause("React, { useState, useEffect as ue, type FC }"),
            ImportClause {
                default: Some("React".to_string()),
                namespace: None,
                named: vec![
                    ("useState".to_string(), "useState".to_string()),
                    ("useEffect".to_string(), "ue".to_string()),
                ],
            }
        );
        assert_eq!(parse_clause("* as R").namespace.as_deref(), Some("R"));
    }

    #[test]
    fn test_resolve_module_map() {
        assert_eq!(resolve_module("react/jsx-runtime").unwrap(), ModuleBinding::React);
        assert_eq!(resolve_module("react-dom/client").unwrap(), ModuleBinding::ReactDom);
        assert!(matches!(resolve_module("/abs/path"), Err(CompileError::RelativeImport { .. })));
        assert!(matches!(resolve_module("React"), Err(CompileError::UnsupportedImport { .. })));
    }
}
