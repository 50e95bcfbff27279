use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Events from the chat transport's newline-delimited JSON stream.
///
/// Every `message` event carries the full current content of a message,
/// not a delta: the bridge re-parses the whole text on each growth.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum TransportEvent {
    #[serde(rename = "message")]
    Message { message: MessageSnapshot },

    #[serde(rename = "done")]
    Done { message_id: String },

    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Assistant,
    User,
    System,
    Tool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MessageSnapshot {
    pub id: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub content: Vec<MessagePart>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum MessagePart {
    #[serde(rename = "text")]
    Text { text: String },

    #[serde(rename = "tool-call")]
    ToolCall {
        #[serde(rename = "toolName")]
        tool_name: String,
        #[serde(default)]
        args: Value,
    },

    #[serde(other)]
    Other,
}

impl MessageSnapshot {
    /// Build an assistant message from plain text.
    pub fn assistant(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::Assistant,
            content: vec![MessagePart::Text { text: text.into() }],
        }
    }

    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }

    /// Concatenate the text parts, one per line; other parts contribute nothing.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .map(|part| match part {
                MessagePart::Text { text } => text.as_str(),
                _ => "",
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Parse one NDJSON line; blank lines yield `None`.
pub fn parse_event_line(line: &str) -> Option<serde_json::Result<TransportEvent>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(serde_json::from_str(trimmed))
}
