use crate::model::RunId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Version of the artifact → host message format.
pub const PROTOCOL_VERSION: u32 = 1;

/// Value of the `source` field on every message the shim posts. Messages from
/// anything else in the boundary (user code calling `postMessage`, browser
/// extensions) carry a different source and are rejected.
pub const MESSAGE_SOURCE: &str = "sketchbox";

/// Where a contained fault happened.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FaultKind {
    /// Exception while evaluating the top-level snippet.
    Load,
    /// Exception inside the initialization hook.
    Setup,
    /// Exception inside one per-frame hook invocation.
    Draw,
    /// The frame counter passed the ceiling and the draw hook was disabled.
    FrameLimit,
    /// Exception in any other callback after setup began.
    Runtime,
    /// Host-side: the wall-clock guard fired before the first frame.
    Timeout,
}

impl FaultKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::Setup => "setup",
            Self::Draw => "draw",
            Self::FrameLimit => "frame-limit",
            Self::Runtime => "runtime",
            Self::Timeout => "timeout",
        }
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status reported by the instrumented artifact.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StatusEvent {
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        line: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        context: Option<FaultKind>,
    },
    FirstFrame,
    SetupComplete,
}

impl StatusEvent {
    pub fn error(message: impl Into<String>, line: Option<u32>, context: FaultKind) -> Self {
        Self::Error {
            message: message.into(),
            line,
            context: Some(context),
        }
    }

    /// Wire tag, as used in logs.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Error { .. } => "error",
            Self::FirstFrame => "firstFrame",
            Self::SetupComplete => "setupComplete",
        }
    }
}

/// Envelope the shim posts for each [`StatusEvent`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    pub source: String,
    pub protocol_version: u32,
    pub run_id: RunId,
    #[serde(flatten)]
    pub event: StatusEvent,
}

impl WireMessage {
    pub fn new(run_id: RunId, event: StatusEvent) -> Self {
        Self {
            source: MESSAGE_SOURCE.to_string(),
            protocol_version: PROTOCOL_VERSION,
            run_id,
            event,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn frame_limit_uses_kebab_case_on_the_wire() {
        let event = StatusEvent::error("too many frames", None, FaultKind::FrameLimit);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["context"], "frame-limit");
        assert!(json.get("line").is_none());
    }

    #[test]
    fn unit_events_decode_from_bare_tags() {
        let event: StatusEvent =
            serde_json::from_str(r#"{"type":"firstFrame"}"#).unwrap();
        assert_eq!(event, StatusEvent::FirstFrame);
    }

    #[test]
    fn envelope_flattens_event_fields() {
        let run_id = RunId::new();
        let raw = format!(
            r#"{{"source":"sketchbox","protocolVersion":1,"runId":"{run_id}","type":"error","message":"x is not defined","line":3,"context":"draw"}}"#
        );
        let msg: WireMessage = serde_json::from_str(&raw).unwrap();
        assert_eq!(msg.run_id, run_id);
        assert_eq!(
            msg.event,
            StatusEvent::error("x is not defined", Some(3), FaultKind::Draw)
        );
    }
}
