use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a host controller. Exactly one is live per controller.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// No boundary. Initial state and the state after `cleanup`.
    #[default]
    Idle,
    /// The boundary signalled readiness.
    Loaded,
    /// A boundary exists and the artifact is loading.
    Running,
    /// The runaway guard fired and tore the boundary down.
    TimedOut,
    /// `stop` was called with a reason other than a timeout.
    Stopped,
    /// A newer `run` discarded the live boundary.
    Replaced,
}

impl RunState {
    /// States in which a boundary exists and the run may still report events.
    pub fn is_live(self) -> bool {
        matches!(self, Self::Running | Self::Loaded)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Loaded => "loaded",
            Self::Running => "running",
            Self::TimedOut => "timed_out",
            Self::Stopped => "stopped",
            Self::Replaced => "replaced",
        };
        f.write_str(name)
    }
}
