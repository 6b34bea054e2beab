//! One-directional message channel from isolation boundary to host.
//!
//! Each boundary receives an [`EventSender`] bound to the run it was created
//! for. Every message it produces is stamped with that [`RunId`], so the host
//! can drop traffic from boundaries it has already replaced. The host holds
//! the single [`EventReceiver`].

use thiserror::Error;
use tokio::sync::mpsc;

use crate::error::{ErrorCode, SandboxError};
use crate::model::{RunId, StatusEvent, WireMessage, MESSAGE_SOURCE, PROTOCOL_VERSION};

/// What a boundary can tell the host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BoundarySignal {
    /// The artifact finished loading; pending callbacks may run.
    Ready,
    /// A status event posted by the shim.
    Status(StatusEvent),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelMessage {
    pub run_id: RunId,
    pub signal: BoundarySignal,
}

/// Rejected raw message.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("malformed message: {0}")]
    Malformed(String),
    #[error("message from foreign source {0:?}")]
    ForeignSource(String),
    #[error("unsupported protocol version {found} (expected {expected})")]
    VersionMismatch { found: u32, expected: u32 },
    #[error("message for run {found} delivered to boundary of run {expected}")]
    RunMismatch { found: RunId, expected: RunId },
}

impl From<ChannelError> for SandboxError {
    fn from(err: ChannelError) -> Self {
        let code = match err {
            ChannelError::VersionMismatch { .. } => ErrorCode::ProtocolVersionMismatch,
            _ => ErrorCode::Protocol,
        };
        SandboxError::new(code, err.to_string(), None)
    }
}

/// Boundary-side end of the channel, bound to one run.
#[derive(Clone, Debug)]
pub struct EventSender {
    run_id: RunId,
    tx: mpsc::UnboundedSender<ChannelMessage>,
}

impl EventSender {
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Re-bind to another run. Used by the host when it creates a boundary.
    #[must_use]
    pub fn for_run(&self, run_id: RunId) -> Self {
        Self {
            run_id,
            tx: self.tx.clone(),
        }
    }

    pub fn ready(&self) {
        self.send(BoundarySignal::Ready);
    }

    pub fn emit(&self, event: StatusEvent) {
        self.send(BoundarySignal::Status(event));
    }

    /// Decode a JSON message as posted by the artifact shim and forward it.
    pub fn post_raw(&self, raw: &str) -> Result<(), ChannelError> {
        let value: serde_json::Value =
            serde_json::from_str(raw).map_err(|e| ChannelError::Malformed(e.to_string()))?;

        // Check the envelope before the body so foreign traffic is named as such.
        let source = value.get("source").and_then(|s| s.as_str()).unwrap_or("");
        if source != MESSAGE_SOURCE {
            return Err(ChannelError::ForeignSource(source.to_string()));
        }
        let version = value
            .get("protocolVersion")
            .and_then(|v| v.as_u64())
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| ChannelError::Malformed("missing protocolVersion".to_string()))?;
        if version != PROTOCOL_VERSION {
            return Err(ChannelError::VersionMismatch {
                found: version,
                expected: PROTOCOL_VERSION,
            });
        }

        let message: WireMessage =
            serde_json::from_value(value).map_err(|e| ChannelError::Malformed(e.to_string()))?;
        if message.run_id != self.run_id {
            return Err(ChannelError::RunMismatch {
                found: message.run_id,
                expected: self.run_id,
            });
        }
        self.emit(message.event);
        Ok(())
    }

    fn send(&self, signal: BoundarySignal) {
        // A closed receiver means the host is gone; late traffic is dropped.
        let _ = self.tx.send(ChannelMessage {
            run_id: self.run_id,
            signal,
        });
    }
}

/// Host-side end of the channel.
#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::UnboundedReceiver<ChannelMessage>,
}

impl EventReceiver {
    /// Next message. `None` once every sender is dropped.
    pub async fn recv(&mut self) -> Option<ChannelMessage> {
        self.rx.recv().await
    }

    /// Next message if one is already queued.
    pub fn try_recv(&mut self) -> Option<ChannelMessage> {
        self.rx.try_recv().ok()
    }
}

/// Create a channel whose sender starts bound to `run_id`.
pub fn event_channel(run_id: RunId) -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { run_id, tx }, EventReceiver { rx })
}
