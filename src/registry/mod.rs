//! Artifact registry: the lifecycle authority for detected artifacts.
//!
//! The registry owns artifact identity, the current selection and the side
//! pane state. It is an explicitly constructed store: the stream bridge is
//! its only writer, while trigger/pane consumers read from it and issue the
//! three pane commands (`open`, `close`, `set_pane_width`).
//!
//! Records are held behind `Arc` so an unchanged upsert leaves the stored
//! pointer untouched; consumers compare with `Arc::ptr_eq` to skip needless
//! re-renders.

mod events;

pub use events::{RegistryEvent, broadcast_event};

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::artifact::Artifact;
use crate::config::PaneConfig;

/// Registry shared between the bridge (writer) and UI consumers (readers).
pub type SharedRegistry = Arc<RwLock<ArtifactRegistry>>;

/// Options for [`ArtifactRegistry::upsert`].
#[derive(Debug, Clone, Copy, Default)]
pub struct UpsertOptions {
    /// Select the artifact and open the pane, but only if it is newly created
    pub auto_open: bool,
}

/// Serializable view of the pane for consumers.
#[derive(Debug, Clone, Serialize)]
pub struct PaneSnapshot {
    pub current: Option<Artifact>,
    pub open: bool,
    pub width: u32,
}

pub struct ArtifactRegistry {
    artifacts: Vec<Arc<Artifact>>,
    current: Option<Arc<Artifact>>,
    pane_open: bool,
    pane: PaneConfig,
    pane_width: u32,
    events: broadcast::Sender<RegistryEvent>,
}

impl Default for ArtifactRegistry {
    fn default() -> Self {
        Self::new(PaneConfig::default())
    }
}

impl ArtifactRegistry {
    pub fn new(pane: PaneConfig) -> Self {
        let (events, _) = broadcast::channel(256);
        let pane_width = pane.clamp(pane.width);
        Self {
            artifacts: Vec::new(),
            current: None,
            pane_open: false,
            pane,
            pane_width,
            events,
        }
    }

    /// Wrap a new registry for sharing.
    pub fn shared(pane: PaneConfig) -> SharedRegistry {
        Arc::new(RwLock::new(Self::new(pane)))
    }

    /// Subscribe to change events.
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    /// Insert or update an artifact by id. Returns `true` only when the
    /// artifact was newly created.
    ///
    /// An update never touches selection or pane state, so a growing
    /// streaming block cannot steal focus after the user closed the pane.
    pub fn upsert(&mut self, incoming: Artifact, options: UpsertOptions) -> bool {
        if let Some(index) = self.artifacts.iter().position(|a| a.id == incoming.id) {
            let existing = &self.artifacts[index];
            // Status never moves backward
            let status = existing.status.max(incoming.status);
            let candidate = Artifact {
                status,
                message_id: incoming.message_id.or_else(|| existing.message_id.clone()),
                ..incoming
            };

            if !candidate.differs_from(existing) {
                return false;
            }

            let updated = Arc::new(Artifact {
                timestamp: Utc::now(),
                ..candidate
            });
            tracing::debug!(
                artifact_id = %updated.id,
                status = %updated.status,
                code_len = updated.code.len(),
                "artifact updated"
            );
            self.artifacts[index] = Arc::clone(&updated);
            self.sync_selection();
            broadcast_event(
                &self.events,
                RegistryEvent::ArtifactUpdated {
                    artifact: (*updated).clone(),
                },
            );
            return false;
        }

        let created = Arc::new(incoming);
        tracing::debug!(
            artifact_id = %created.id,
            status = %created.status,
            title = %created.title,
            "artifact created"
        );
        self.artifacts.push(Arc::clone(&created));
        broadcast_event(
            &self.events,
            RegistryEvent::ArtifactCreated {
                artifact: (*created).clone(),
            },
        );

        if options.auto_open {
            self.select(created);
        }
        true
    }

    /// Select an artifact by id and open the pane. Unknown ids are a no-op.
    pub fn open(&mut self, id: &str) -> bool {
        match self.get(id) {
            Some(artifact) => {
                self.select(artifact);
                true
            }
            None => {
                tracing::debug!(artifact_id = %id, "open ignored for unknown artifact");
                false
            }
        }
    }

    /// Hide the pane but keep the selection for reopening.
    pub fn close(&mut self) {
        if self.pane_open {
            self.pane_open = false;
            tracing::debug!("artifact pane closed");
            broadcast_event(&self.events, RegistryEvent::PaneClosed);
        }
    }

    /// Store the pane width, clamped to the configured bounds.
    pub fn set_pane_width(&mut self, width: u32) -> u32 {
        let width = self.pane.clamp(width);
        if width != self.pane_width {
            self.pane_width = width;
            broadcast_event(&self.events, RegistryEvent::PaneResized { width });
        }
        width
    }

    pub fn list(&self) -> Vec<Arc<Artifact>> {
        self.artifacts.clone()
    }

    pub fn by_message(&self, message_id: &str) -> Vec<Arc<Artifact>> {
        self.artifacts
            .iter()
            .filter(|a| a.message_id.as_deref() == Some(message_id))
            .cloned()
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<Arc<Artifact>> {
        self.artifacts.iter().find(|a| a.id == id).cloned()
    }

    pub fn current(&self) -> Option<Arc<Artifact>> {
        self.current.clone()
    }

    pub fn is_pane_open(&self) -> bool {
        self.pane_open
    }

    pub fn pane_width(&self) -> u32 {
        self.pane_width
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    pub fn pane_snapshot(&self) -> PaneSnapshot {
        PaneSnapshot {
            current: self.current.as_deref().cloned(),
            open: self.pane_open,
            width: self.pane_width,
        }
    }

    fn select(&mut self, artifact: Arc<Artifact>) {
        let id = artifact.id.clone();
        self.current = Some(artifact);
        self.pane_open = true;
        tracing::debug!(artifact_id = %id, "artifact pane opened");
        broadcast_event(&self.events, RegistryEvent::PaneOpened { artifact_id: id });
    }

    /// Point the selection at the live record when its id still exists but
    /// the stored object was replaced.
    fn sync_selection(&mut self) {
        let Some(current) = &self.current else {
            return;
        };
        if let Some(live) = self.artifacts.iter().find(|a| a.id == current.id) {
            if !Arc::ptr_eq(live, current) {
                self.current = Some(Arc::clone(live));
            }
        }
    }
}

/// Acquire a read guard, recovering the data if a writer panicked.
pub fn read(registry: &SharedRegistry) -> RwLockReadGuard<'_, ArtifactRegistry> {
    registry.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Acquire a write guard, recovering the data if a writer panicked.
pub fn write(registry: &SharedRegistry) -> RwLockWriteGuard<'_, ArtifactRegistry> {
    registry.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}
