//! Messages exchanged between the host and an isolated context.
//!
//! Host → context: `{"code": "...", "renderId": "..."}`
//! Context → host: `{"renderId": "...", "status": "ok"}` or
//! `{"renderId": "...", "status": "error", "message": "..."}`, preceded once
//! by the readiness signal `{"ready": true, "version": "..."}`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderRequest {
    pub code: String,
    pub render_id: String,
}

impl RenderRequest {
    pub fn new(code: impl Into<String>, render_id: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            render_id: render_id.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderResponse {
    pub render_id: String,
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RenderResponse {
    pub fn ok(render_id: impl Into<String>) -> Self {
        Self {
            render_id: render_id.into(),
            status: ResponseStatus::Ok,
            message: None,
        }
    }

    pub fn error(render_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            render_id: render_id.into(),
            status: ResponseStatus::Error,
            message: Some(message.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ResponseStatus::Ok
    }
}

/// Sent once by the isolated context before it accepts render requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadySignal {
    pub ready: bool,
    pub version: String,
}

/// Anything the isolated context can send back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RunnerMessage {
    Rendered(RenderResponse),
    Ready(ReadySignal),
}

/// Where an inbound message claims to come from.
///
/// A maximally isolated context has no real origin and reports the opaque
/// sentinel `"null"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Origin {
    Opaque,
    Url(String),
}

impl Origin {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "" | "null" => Origin::Opaque,
            other => Origin::Url(other.trim_end_matches('/').to_string()),
        }
    }
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Origin::Opaque => write!(f, "null"),
            Origin::Url(url) => write!(f, "{}", url),
        }
    }
}

/// A message received from an isolated context, tagged with its origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub origin: Origin,
    pub message: RunnerMessage,
}

impl InboundMessage {
    pub fn opaque(message: RunnerMessage) -> Self {
        Self {
            origin: Origin::Opaque,
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_shape() {
        let json = serde_json::to_value(RenderRequest::new("code", "r1")).unwrap();
        assert_eq!(json, serde_json::json!({"code": "code", "renderId": "r1"}));
    }

    #[test]
    fn test_ok_response_omits_message() {
        let json = serde_json::to_string(&RenderResponse::ok("r1")).unwrap();
        assert_eq!(json, r#"{"renderId":"r1","status":"ok"}"#);
    }

    #[test]
    fn test_error_response_round_trip() {
        let raw = r#"{"renderId":"r2","status":"error","message":"boom"}"#;
        let response: RenderResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response, RenderResponse::error("r2", "boom"));
        assert!(!response.is_ok());
    }

    #[test]
    fn test_runner_message_distinguishes_ready() {
        let ready: RunnerMessage = serde_json::from_str(r#"{"ready":true,"version":"1"}"#).unwrap();
        assert!(matches!(ready, RunnerMessage::Ready(ReadySignal { ready: true, .. })));

        let rendered: RunnerMessage =
            serde_json::from_str(r#"{"renderId":"r1","status":"ok"}"#).unwrap();
        assert!(matches!(rendered, RunnerMessage::Rendered(r) if r.is_ok()));

        assert!(serde_json::from_str::<RunnerMessage>(r#"{"status":"ok"}"#).is_err());
    }

    #[test]
    fn test_origin_parse() {
        assert_eq!(Origin::parse("null"), Origin::Opaque);
        assert_eq!(Origin::parse(""), Origin::Opaque);
        assert_eq!(
            Origin::parse("http://127.0.0.1:3141/"),
            Origin::Url("http://127.0.0.1:3141".to_string())
        );
        assert_eq!(Origin::Opaque.to_string(), "null");
    }
}
