//! Transcript region seam.
//!
//! The transcript renderer is an external collaborator. The bridge only needs
//! to enumerate the code blocks it rendered for one message and toggle their
//! visibility; it is told about incremental growth through
//! [`StreamBridge::on_region_changed`](super::StreamBridge::on_region_changed).

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Position of a rendered code block within its message region.
pub type BlockId = usize;

/// A code block as rendered in the plain transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedCodeBlock {
    pub id: BlockId,
    /// Class names of the code element, e.g. `language-tsx`
    pub class_name: String,
}

/// The rendered region of one message in the transcript.
pub trait TranscriptRegion {
    fn code_blocks(&self) -> Vec<RenderedCodeBlock>;

    fn set_hidden(&mut self, block: BlockId, hidden: bool);
}

/// A region whose code blocks are derived from the message markdown itself.
///
/// Stands in for a real renderer in the CLI and in tests: every fenced block
/// (closed or still open) becomes one rendered block with a
/// `language-<tag>` class.
#[derive(Debug, Default, Clone)]
pub struct MarkdownRegion {
    blocks: Vec<RenderedCodeBlock>,
    hidden: HashSet<BlockId>,
}

static OPEN_FENCE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```([a-zA-Z0-9_+-]*)[^\n]*\n(.*?)(```|$)").unwrap());

impl MarkdownRegion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-render from the latest text. Returns `true` when the set of blocks
    /// changed, i.e. new content nodes were appended.
    pub fn refresh(&mut self, text: &str) -> bool {
        let blocks: Vec<RenderedCodeBlock> = OPEN_FENCE_REGEX
            .captures_iter(text)
            .enumerate()
            .map(|(id, cap)| {
                let lang = cap.get(1).map(|m| m.as_str()).unwrap_or("");
                RenderedCodeBlock {
                    id,
                    class_name: if lang.is_empty() {
                        String::new()
                    } else {
                        format!("language-{}", lang.to_lowercase())
                    },
                }
            })
            .collect();

        if blocks == self.blocks {
            return false;
        }
        self.hidden.retain(|id| *id < blocks.len());
        self.blocks = blocks;
        true
    }

    pub fn is_hidden(&self, block: BlockId) -> bool {
        self.hidden.contains(&block)
    }

    pub fn hidden_count(&self) -> usize {
        self.hidden.len()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

impl TranscriptRegion for MarkdownRegion {
    fn code_blocks(&self) -> Vec<RenderedCodeBlock> {
        self.blocks.clone()
    }

    fn set_hidden(&mut self, block: BlockId, hidden: bool) {
        if hidden {
            self.hidden.insert(block);
        } else {
            self.hidden.remove(&block);
        }
    }
}
