//! Machine-readable description of the artifact → host protocol.
//!
//! Built from the library's own constants so the output cannot drift from
//! what the shim and channel actually speak.

use serde::Serialize;
use sketchbox::error::ErrorCode;
use sketchbox::model::config::{
    DEFAULT_GRAPHICS_TIMEOUT_MS, DEFAULT_MAX_FRAMES, DEFAULT_SCRIPT_TIMEOUT_MS,
};
use sketchbox::model::policy::{SandboxPolicy, POLICY_VERSION};
use sketchbox::model::{FaultKind, MESSAGE_SOURCE, PROTOCOL_VERSION};
use std::collections::BTreeMap;

#[derive(Debug, Serialize)]
pub struct ProtocolHelp {
    pub protocol_version: u32,
    pub policy_version: u32,
    /// Envelope fields every message carries.
    pub envelope: BTreeMap<String, String>,
    /// Event `type` tags and their meaning.
    pub events: BTreeMap<String, String>,
    /// Values of `context` on error events.
    pub fault_kinds: BTreeMap<String, String>,
    pub error_codes: BTreeMap<String, ErrorCodeHelp>,
    pub defaults: Defaults,
    /// The default policy, as it would appear in a policy file.
    pub default_policy: SandboxPolicy,
}

#[derive(Debug, Serialize)]
pub struct ErrorCodeHelp {
    pub exit_code: i32,
    pub description: String,
}

#[derive(Debug, Serialize)]
pub struct Defaults {
    pub script_timeout_ms: u64,
    pub graphics_timeout_ms: u64,
    pub max_frames: u64,
}

#[must_use]
pub fn generate_protocol_help() -> ProtocolHelp {
    ProtocolHelp {
        protocol_version: PROTOCOL_VERSION,
        policy_version: POLICY_VERSION,
        envelope: envelope(),
        events: events(),
        fault_kinds: fault_kinds(),
        error_codes: error_codes(),
        defaults: Defaults {
            script_timeout_ms: DEFAULT_SCRIPT_TIMEOUT_MS,
            graphics_timeout_ms: DEFAULT_GRAPHICS_TIMEOUT_MS,
            max_frames: DEFAULT_MAX_FRAMES,
        },
        default_policy: SandboxPolicy::default(),
    }
}

fn envelope() -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    fields.insert(
        "source".to_string(),
        format!("always \"{MESSAGE_SOURCE}\"; anything else is rejected"),
    );
    fields.insert(
        "protocolVersion".to_string(),
        format!("must equal {PROTOCOL_VERSION}"),
    );
    fields.insert(
        "runId".to_string(),
        "identifier of the run the artifact was built for; messages for other runs are ignored"
            .to_string(),
    );
    fields.insert(
        "type".to_string(),
        "event tag, see events".to_string(),
    );
    fields
}

fn events() -> BTreeMap<String, String> {
    let mut events = BTreeMap::new();
    events.insert(
        "error".to_string(),
        "contained fault: {message, line?, context?}; the run keeps going".to_string(),
    );
    events.insert(
        "setupComplete".to_string(),
        "the initialization hook returned".to_string(),
    );
    events.insert(
        "firstFrame".to_string(),
        "the sketch yielded its first frame; cancels the runaway guard".to_string(),
    );
    events
}

fn fault_kinds() -> BTreeMap<String, String> {
    [
        (FaultKind::Load, "exception while evaluating the top-level snippet"),
        (FaultKind::Setup, "exception inside setup()"),
        (FaultKind::Draw, "exception inside one draw() call"),
        (FaultKind::FrameLimit, "frame ceiling reached; draw() disabled"),
        (FaultKind::Runtime, "exception in any other callback"),
        (FaultKind::Timeout, "host-side: no first frame within the budget"),
    ]
    .into_iter()
    .map(|(kind, text)| (kind.as_str().to_string(), text.to_string()))
    .collect()
}

fn error_codes() -> BTreeMap<String, ErrorCodeHelp> {
    ErrorCode::ALL
        .into_iter()
        .map(|code| {
            (
                code.as_str().to_string(),
                ErrorCodeHelp {
                    exit_code: code.exit_code(),
                    description: code.description().to_string(),
                },
            )
        })
        .collect()
}
