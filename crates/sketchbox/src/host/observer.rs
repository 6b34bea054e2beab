//! Observer hook for host lifecycle transitions.

use serde::Serialize;

use crate::model::{ExecutionConfig, ExecutionMode, RunId, RunState, StatusEvent};

/// Something the host did or saw.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HostEvent {
    StateChanged {
        from: RunState,
        to: RunState,
    },
    /// A boundary was created and the artifact handed to it.
    RunStarted {
        run_id: RunId,
        mode: ExecutionMode,
        config: Option<ExecutionConfig>,
    },
    /// Validator findings kept the snippet from loading.
    Blocked {
        issues: Vec<String>,
    },
    GuardArmed {
        run_id: RunId,
        budget_ms: u64,
    },
    GuardCancelled {
        run_id: RunId,
    },
    GuardFired {
        run_id: RunId,
    },
    /// The boundary signalled readiness; `drained` pending callbacks ran.
    Ready {
        run_id: RunId,
        drained: usize,
    },
    Status {
        run_id: RunId,
        event: StatusEvent,
    },
    /// A message arrived for a run that is no longer live.
    Ignored {
        run_id: RunId,
    },
}

/// Receives every [`HostEvent`], in order.
pub trait HostObserver: Send {
    fn on_event(&self, event: &HostEvent);
}

/// Discards all events.
pub struct NoopObserver;

impl HostObserver for NoopObserver {
    fn on_event(&self, _event: &HostEvent) {}
}
