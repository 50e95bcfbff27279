//! Stream bridge: adapts one streaming assistant message into registry
//! operations.
//!
//! ## Flow
//!
//! ```text
//! transport ──MessageSnapshot──> StreamBridge::on_message
//!                                   │  FenceParser::parse(text, message_id)
//!                                   │  registry.upsert(artifact, auto_open = streaming)
//!                                   v
//!                               apply_suppression ──> TranscriptRegion::set_hidden
//! renderer ──growth──> StreamBridge::on_region_changed ──> apply_suppression
//! ```
//!
//! Once a message owns at least one artifact, every rendered dialect code
//! block in its region is hidden so the source only appears as an artifact
//! trigger. Hidden blocks are shown again when the bridge detaches or drops.

mod region;
pub mod transport;

pub use region::{BlockId, MarkdownRegion, RenderedCodeBlock, TranscriptRegion};
pub use transport::{MessagePart, MessageSnapshot, Role, TransportEvent};

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use serde::Serialize;

use crate::artifact::{Artifact, FenceParser};
use crate::registry::{self, SharedRegistry, UpsertOptions};

/// What one growth event did to the registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BridgeOutcome {
    /// Artifacts recognized in the current text
    pub parsed: usize,
    /// Of those, how many were new to the registry
    pub created: usize,
}

pub struct StreamBridge<R: TranscriptRegion> {
    message_id: String,
    registry: SharedRegistry,
    parser: Arc<FenceParser>,
    region: R,
    hidden: Vec<BlockId>,
    last_text: Option<String>,
    detached: bool,
}

impl<R: TranscriptRegion> StreamBridge<R> {
    pub fn new(
        message_id: impl Into<String>,
        registry: SharedRegistry,
        parser: Arc<FenceParser>,
        region: R,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            registry,
            parser,
            region,
            hidden: Vec::new(),
            last_text: None,
            detached: false,
        }
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn region(&self) -> &R {
        &self.region
    }

    /// Mutable access for the renderer that owns the region's content.
    pub fn region_mut(&mut self) -> &mut R {
        &mut self.region
    }

    /// Handle a growth of this bridge's message.
    ///
    /// Never fails: a panic inside the parser is treated as "no artifact this
    /// pass" so the rest of the chat pipeline keeps rendering.
    pub fn on_message(&mut self, message: &MessageSnapshot) -> BridgeOutcome {
        if self.detached || message.id != self.message_id || !message.is_assistant() {
            return BridgeOutcome::default();
        }

        let text = message.text();
        if text.trim().is_empty() || self.last_text.as_deref() == Some(text.as_str()) {
            return BridgeOutcome::default();
        }

        let parser = Arc::clone(&self.parser);
        let message_id = self.message_id.clone();
        let parsed = match catch_unwind(AssertUnwindSafe(|| parser.parse(&text, Some(&message_id)))) {
            Ok(parsed) => parsed,
            Err(_) => {
                tracing::warn!(message_id = %self.message_id, "artifact parse panicked; skipping this pass");
                return BridgeOutcome::default();
            }
        };
        self.last_text = Some(text);

        let outcome = self.push(parsed);
        self.apply_suppression();
        outcome
    }

    /// Re-apply suppression after the renderer appended content nodes.
    pub fn on_region_changed(&mut self) {
        if !self.detached {
            self.apply_suppression();
        }
    }

    /// Artifacts the registry holds for this message.
    pub fn artifacts(&self) -> Vec<Arc<Artifact>> {
        registry::read(&self.registry).by_message(&self.message_id)
    }

    /// Stop reacting to events and reveal every block this bridge hid.
    pub fn detach(&mut self) {
        if self.detached {
            return;
        }
        self.reveal_all();
        self.detached = true;
        tracing::trace!(message_id = %self.message_id, "stream bridge detached");
    }

    fn push(&mut self, parsed: Vec<Artifact>) -> BridgeOutcome {
        let mut outcome = BridgeOutcome {
            parsed: parsed.len(),
            created: 0,
        };
        let mut registry = registry::write(&self.registry);
        for artifact in parsed {
            let options = UpsertOptions {
                auto_open: artifact.is_streaming(),
            };
            if registry.upsert(artifact, options) {
                outcome.created += 1;
            }
        }
        outcome
    }

    fn apply_suppression(&mut self) {
        self.reveal_all();

        let has_artifacts = !registry::read(&self.registry)
            .by_message(&self.message_id)
            .is_empty();
        if !has_artifacts {
            return;
        }

        for block in self.region.code_blocks() {
            if self.parser.matches_code_class(&block.class_name) {
                self.region.set_hidden(block.id, true);
                self.hidden.push(block.id);
            }
        }
    }

    fn reveal_all(&mut self) {
        for id in self.hidden.drain(..) {
            self.region.set_hidden(id, false);
        }
    }
}

impl<R: TranscriptRegion> Drop for StreamBridge<R> {
    fn drop(&mut self) {
        self.detach();
    }
}

/// Routes transport events to one bridge per assistant message, rendering
/// each message into a [`MarkdownRegion`].
///
/// A finished message without artifacts has nothing hidden, so its bridge is
/// released on `Done`. Bridges that hide source blocks stay until
/// [`Transcript::remove`], since dropping one reveals its blocks again.
pub struct Transcript {
    registry: SharedRegistry,
    parser: Arc<FenceParser>,
    bridges: HashMap<String, StreamBridge<MarkdownRegion>>,
}

impl Transcript {
    pub fn new(registry: SharedRegistry, parser: Arc<FenceParser>) -> Self {
        Self {
            registry,
            parser,
            bridges: HashMap::new(),
        }
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn apply(&mut self, event: TransportEvent) -> BridgeOutcome {
        match event {
            TransportEvent::Message { message } => {
                if !message.is_assistant() {
                    return BridgeOutcome::default();
                }
                let bridge = self.bridges.entry(message.id.clone()).or_insert_with(|| {
                    StreamBridge::new(
                        message.id.clone(),
                        self.registry.clone(),
                        Arc::clone(&self.parser),
                        MarkdownRegion::new(),
                    )
                });
                if bridge.region_mut().refresh(&message.text()) {
                    bridge.on_region_changed();
                }
                bridge.on_message(&message)
            }
            TransportEvent::Done { message_id } => {
                tracing::debug!(message_id = %message_id, "message stream finished");
                let owns_artifacts = self
                    .bridges
                    .get(&message_id)
                    .is_some_and(|bridge| !bridge.artifacts().is_empty());
                if !owns_artifacts && self.bridges.remove(&message_id).is_some() {
                    tracing::trace!(message_id = %message_id, "released bridge of artifact-free message");
                }
                BridgeOutcome::default()
            }
            TransportEvent::Unknown => BridgeOutcome::default(),
        }
    }

    pub fn bridge(&self, message_id: &str) -> Option<&StreamBridge<MarkdownRegion>> {
        self.bridges.get(message_id)
    }

    /// Messages currently tracked.
    pub fn len(&self) -> usize {
        self.bridges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bridges.is_empty()
    }

    /// Drop a message's bridge when its view goes away, revealing its blocks.
    pub fn remove(&mut self, message_id: &str) -> bool {
        self.bridges.remove(message_id).is_some()
    }
}
