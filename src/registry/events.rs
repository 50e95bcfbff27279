use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::artifact::Artifact;

// ── Registry change events ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum RegistryEvent {
    ArtifactCreated {
        artifact: Artifact,
    },
    ArtifactUpdated {
        artifact: Artifact,
    },
    PaneOpened {
        artifact_id: String,
    },
    PaneClosed,
    PaneResized {
        width: u32,
    },
}

/// Send an event to all subscribers. Having none is not an error.
pub fn broadcast_event(tx: &broadcast::Sender<RegistryEvent>, event: RegistryEvent) {
    let _ = tx.send(event);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization_shape() {
        let json = serde_json::to_value(RegistryEvent::PaneResized { width: 640 }).unwrap();
        assert_eq!(json["type"], "PaneResized");
        assert_eq!(json["data"]["width"], 640);

        let json = serde_json::to_value(RegistryEvent::PaneClosed).unwrap();
        assert_eq!(json["type"], "PaneClosed");
    }

    #[test]
    fn test_broadcast_without_receivers_is_silent() {
        let (tx, rx) = broadcast::channel(4);
        drop(rx);
        broadcast_event(&tx, RegistryEvent::PaneClosed);
    }

    #[test]
    fn test_broadcast_reaches_subscribers() {
        let (tx, _) = broadcast::channel(4);
        let mut rx = tx.subscribe();
        broadcast_event(
            &tx,
            RegistryEvent::PaneOpened {
                artifact_id: "m1-0".to_string(),
            },
        );
        match rx.try_recv().unwrap() {
            RegistryEvent::PaneOpened { artifact_id } => assert_eq!(artifact_id, "m1-0"),
            other => panic!("Expected PaneOpened, got {:?}", other),
        }
    }
}
