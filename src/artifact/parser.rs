//! Fence parsing from streamed assistant text.
//!
//! Extracts component snippets from fenced blocks using regex patterns:
//! - ```` ```tsx ... ``` ```` or ```` ```jsx ... ``` ```` closed blocks → `Ready`
//! - an opened block running to end-of-text → `Streaming`
//!
//! Parsing is pure: the same text always yields the same ids, so it can be
//! re-run on every growth of a message without side effects.

use super::types::{Artifact, ArtifactStatus};
use chrono::Utc;
use regex::Regex;
use std::sync::LazyLock;

/// Dialect tags recognized when no configuration overrides them.
pub const DEFAULT_LANGUAGES: &[&str] = &["tsx", "jsx"];

// Lazy body match terminated by a closing fence OR end-of-text
static FENCE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```([a-zA-Z]+)\s*\n(.*?)(```|$)").unwrap());

static COMPONENT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"return\s*[(<]|=>\s*[(<]|React\.createElement|\bcreateElement\(").unwrap()
});

static FUNCTION_TITLE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"function\s+([A-Z]\w*)").unwrap());

static CONST_TITLE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:const|let)\s+([A-Z]\w*)\s*(?::[^=]+)?=\s*(?:async\s*)?(?:\(|function\b)").unwrap()
});

static EXPORT_DEFAULT_TITLE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"export\s+default\s+([A-Z]\w*)").unwrap());

static CAMEL_BOUNDARY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([a-z])([A-Z])").unwrap());

/// Parser for extracting artifacts from assistant text.
#[derive(Debug, Clone)]
pub struct FenceParser {
    languages: Vec<String>,
    code_class: Option<Regex>,
}

impl Default for FenceParser {
    fn default() -> Self {
        Self::new(DEFAULT_LANGUAGES.iter().map(|l| l.to_string()))
    }
}

impl FenceParser {
    /// Create a parser recognizing the given dialect tags (case-insensitive).
    pub fn new<I, S>(languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let languages: Vec<String> = languages
            .into_iter()
            .map(|l| l.into().to_lowercase())
            .filter(|l| !l.is_empty())
            .collect();

        let alternation = languages
            .iter()
            .map(|l| regex::escape(l))
            .collect::<Vec<_>>()
            .join("|");
        let code_class = if alternation.is_empty() {
            None
        } else {
            Regex::new(&format!(r"language-(?:{alt})\b|^(?:{alt})$", alt = alternation)).ok()
        };

        Self {
            languages,
            code_class,
        }
    }

    pub fn languages(&self) -> &[String] {
        &self.languages
    }

    /// Whether a fence tag belongs to the recognized dialect set.
    pub fn is_dialect(&self, language: &str) -> bool {
        let lower = language.to_lowercase();
        self.languages.iter().any(|l| *l == lower)
    }

    /// Whether a rendered code block's class names mark it as a dialect block
    /// (`language-tsx`, or a bare `jsx`).
    pub fn matches_code_class(&self, class_name: &str) -> bool {
        self.code_class
            .as_ref()
            .is_some_and(|re| re.is_match(class_name))
    }

    /// Extract all artifacts from `content`, in source order.
    pub fn parse(&self, content: &str, message_id: Option<&str>) -> Vec<Artifact> {
        if content.is_empty() {
            return Vec::new();
        }

        let mut artifacts = Vec::new();
        let mut ordinal = 0usize;

        for cap in FENCE_REGEX.captures_iter(content) {
            let Some(language) = cap.get(1).map(|m| m.as_str().to_lowercase()) else {
                continue;
            };
            if !self.is_dialect(&language) {
                continue;
            }

            let closed = cap.get(3).is_some_and(|m| m.as_str() == "```");
            let body = cap.get(2).map(|m| m.as_str()).unwrap_or("");
            let code = if closed {
                body.trim()
            } else {
                // A closing fence may be half-arrived
                body.trim_end().trim_end_matches('`').trim()
            };

            if !looks_like_component(code) {
                tracing::trace!(%language, ordinal, "fenced block rejected by component heuristic");
                continue;
            }

            artifacts.push(Artifact {
                id: Artifact::make_id(message_id, ordinal),
                title: derive_title(code)
                    .unwrap_or_else(|| format!("Interactive artifact {}", ordinal + 1)),
                code: code.to_string(),
                language,
                status: if closed {
                    ArtifactStatus::Ready
                } else {
                    ArtifactStatus::Streaming
                },
                timestamp: Utc::now(),
                message_id: message_id.map(str::to_string),
            });

            ordinal += 1;
        }

        artifacts
    }
}

/// Convenience function to parse with the default dialect set.
pub fn parse_artifacts(content: &str, message_id: Option<&str>) -> Vec<Artifact> {
    FenceParser::default().parse(content, message_id)
}

/// Textual evidence that the block produces a UI element.
fn looks_like_component(code: &str) -> bool {
    !code.is_empty() && COMPONENT_REGEX.is_match(code)
}

/// Best-effort title from a declaration name, in pattern order.
pub fn derive_title(code: &str) -> Option<String> {
    [
        &*FUNCTION_TITLE_REGEX,
        &*CONST_TITLE_REGEX,
        &*EXPORT_DEFAULT_TITLE_REGEX,
    ]
    .iter()
    .find_map(|re| re.captures(code).and_then(|c| c.get(1)))
    .map(|m| beautify_title(m.as_str()))
}

/// `SalesDashboard` → `Sales Dashboard`
fn beautify_title(name: &str) -> String {
    CAMEL_BOUNDARY_REGEX.replace_all(name, "$1 $2").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLOSED: &str = "Here you go:\n```tsx\nexport default function SalesDashboard() {\n  return (<div>Sales</div>);\n}\n```\nEnjoy!";

    #[test]
    fn test_no_fences_yields_nothing() {
        assert!(parse_artifacts("Just a plain answer without code.", Some("m1")).is_empty());
        assert!(parse_artifacts("", Some("m1")).is_empty());
    }

    #[test]
    fn test_closed_block_is_ready() {
        let artifacts = parse_artifacts(CLOSED, Some("m1"));
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].status, ArtifactStatus::Ready);
        assert_eq!(artifacts[0].id, "m1-0");
        assert_eq!(artifacts[0].language, "tsx");
        assert_eq!(artifacts[0].title, "Sales Dashboard");
        assert!(artifacts[0].code.starts_with("export default function"));
        assert!(!artifacts[0].code.contains("```"));
    }

    #[test]
    fn test_unterminated_block_is_streaming() {
        let text = "Building it now:\n```jsx\nconst Counter = () => (\n  <button>";
        let artifacts = parse_artifacts(text, Some("m1"));
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].status, ArtifactStatus::Streaming);
        assert_eq!(artifacts[0].title, "Counter");
    }

    #[test]
    fn test_half_arrived_closing_fence_is_trimmed() {
        let text = "```jsx\nfunction Foo(){return <div/>;}\n``";
        let artifacts = parse_artifacts(text, Some("m1"));
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].status, ArtifactStatus::Streaming);
        assert_eq!(artifacts[0].code, "function Foo(){return <div/>;}");
    }

    #[test]
    fn test_inline_closing_fence_scenario() {
        let text = "here: ```jsx\nfunction Foo(){return <div/>;}```";
        let artifacts = parse_artifacts(text, Some("msg"));
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].title, "Foo");
        assert_eq!(artifacts[0].status, ArtifactStatus::Ready);
        assert_eq!(artifacts[0].code, "function Foo(){return <div/>;}");
    }

    #[test]
    fn test_other_languages_ignored() {
        let text = "```sql\nSELECT * FROM sales;\n```\n```json\n{\"a\": 1}\n```\n```bash\nls\n```";
        assert!(parse_artifacts(text, Some("m1")).is_empty());
    }

    #[test]
    fn test_language_tag_is_case_insensitive() {
        let text = "```TSX\nconst App = () => (<div/>);\n```";
        let artifacts = parse_artifacts(text, None);
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].language, "tsx");
        assert_eq!(artifacts[0].id, "temp-0");
    }

    #[test]
    fn test_heuristic_rejects_non_components() {
        let text = "```tsx\ntype Props = { name: string };\nexport const add = (a: number, b: number) => a + b;\n```";
        assert!(parse_artifacts(text, Some("m1")).is_empty());
    }

    #[test]
    fn test_create_element_counts_as_component() {
        let text = "```jsx\nfunction Hello() { return React.createElement('h1', null, 'hi'); }\n```";
        assert_eq!(parse_artifacts(text, Some("m1")).len(), 1);
    }

    #[test]
    fn test_multiple_blocks_in_source_order() {
        let text = "First:\n```tsx\nfunction Alpha(){ return (<div/>); }\n```\nSQL:\n```sql\nSELECT 1;\n```\nSecond:\n```jsx\nfunction Beta(){ return <span/>; }\n```";
        let artifacts = parse_artifacts(text, Some("m7"));
        assert_eq!(artifacts.len(), 2);
        assert_eq!(artifacts[0].id, "m7-0");
        assert_eq!(artifacts[0].title, "Alpha");
        assert_eq!(artifacts[1].id, "m7-1");
        assert_eq!(artifacts[1].title, "Beta");
    }

    #[test]
    fn test_rejected_blocks_do_not_consume_ordinals() {
        let text = "```tsx\nconst x = 1;\n```\n```tsx\nfunction Real(){ return (<div/>); }\n```";
        let artifacts = parse_artifacts(text, Some("m1"));
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].id, "m1-0");
    }

    #[test]
    fn test_positional_title_fallback() {
        let text = "```jsx\nexport default () => (<div>anon</div>);\n```";
        let artifacts = parse_artifacts(text, Some("m1"));
        assert_eq!(artifacts[0].title, "Interactive artifact 1");
    }

    #[test]
    fn test_title_pattern_order() {
        assert_eq!(
            derive_title("const ChartCard = () => (<div/>);\nfunction helper(){}").as_deref(),
            Some("Chart Card")
        );
        assert_eq!(
            derive_title("function RevenueChart(){}\nexport default Other;").as_deref(),
            Some("Revenue Chart")
        );
        assert_eq!(
            derive_title("export default MyWidget;").as_deref(),
            Some("My Widget")
        );
        assert_eq!(derive_title("const lower = () => (<div/>);"), None);
    }

    #[test]
    fn test_parse_is_idempotent() {
        let first = parse_artifacts(CLOSED, Some("m1"));
        let second = parse_artifacts(CLOSED, Some("m1"));
        let ids = |a: &[Artifact]| a.iter().map(|x| x.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&first), ids(&second));
        assert_eq!(first[0].code, second[0].code);
    }

    #[test]
    fn test_growing_prefix_keeps_identity() {
        let full = CLOSED;
        let cut = full.find("}\n```").unwrap();
        let partial = &full[..cut];
        let early = parse_artifacts(partial, Some("m1"));
        let late = parse_artifacts(full, Some("m1"));
        assert_eq!(early.len(), 1);
        assert_eq!(early[0].status, ArtifactStatus::Streaming);
        assert_eq!(late[0].status, ArtifactStatus::Ready);
        assert_eq!(early[0].id, late[0].id);
    }

    #[test]
    fn test_custom_language_set() {
        let parser = FenceParser::new(["vue"]);
        assert!(parser.is_dialect("VUE"));
        assert!(!parser.is_dialect("tsx"));
        let text = "```vue\nconst Widget = () => (<div/>);\n```";
        assert_eq!(parser.parse(text, Some("m")).len(), 1);
    }

    #[test]
    fn test_code_class_matching() {
        let parser = FenceParser::default();
        assert!(parser.matches_code_class("language-tsx"));
        assert!(parser.matches_code_class("hljs language-jsx"));
        assert!(parser.matches_code_class("jsx"));
        assert!(!parser.matches_code_class("language-sql"));
        assert!(!parser.matches_code_class("language-tsxx"));
        assert!(!parser.matches_code_class(""));
    }

    #[test]
    fn test_empty_language_set_matches_nothing() {
        let parser = FenceParser::new(Vec::<String>::new());
        assert!(!parser.matches_code_class("language-tsx"));
        assert!(parser.parse(CLOSED, Some("m1")).is_empty());
    }
}
