//! Wall-clock guard against runaway sketches.
//!
//! The guard is armed when a script-mode run starts and is cancelled by the
//! first `firstFrame` event. A sketch stuck in a synchronous loop never yields
//! to post that event, so the deadline passing is the host's only evidence.

use std::time::Duration;
use tokio::time::{sleep_until, Instant};

use crate::model::RunId;

/// Reason passed to `stop` when the guard fires.
pub const TIMEOUT_REASON: &str = "execution timeout";

/// An armed deadline for one run. Dropping it disarms it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunawayGuard {
    run_id: RunId,
    deadline: Instant,
    budget: Duration,
}

impl RunawayGuard {
    /// Start the clock for `run_id`; the deadline is `budget` from now.
    pub fn arm(run_id: RunId, budget: Duration) -> Self {
        Self {
            run_id,
            deadline: Instant::now() + budget,
            budget,
        }
    }

    /// Run the guard was armed for.
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Instant at which the run is declared runaway.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time allowed until the first frame.
    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Whether the deadline has passed at `now`.
    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.deadline
    }
}

/// Resolve at the guard's deadline, or never when no guard is armed.
pub(crate) async fn wait_for_guard(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}
