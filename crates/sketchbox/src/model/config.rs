use serde::{Deserialize, Serialize};

/// Budget for a script-mode run without the graphics marker.
pub const DEFAULT_SCRIPT_TIMEOUT_MS: u64 = 5_000;
/// Budget for a script-mode run that uses hardware-accelerated rendering.
pub const DEFAULT_GRAPHICS_TIMEOUT_MS: u64 = 15_000;
/// Frame ceiling enforced by the draw-hook wrapper.
pub const DEFAULT_MAX_FRAMES: u64 = 100_000;

/// Limits for one run, derived from the code by [`crate::detect::execution_config`].
///
/// Immutable for the lifetime of the run it was built for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    pub max_execution_time_ms: u64,
    pub max_frames: u64,
    pub is_long_running_graphics_mode: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_execution_time_ms: DEFAULT_SCRIPT_TIMEOUT_MS,
            max_frames: DEFAULT_MAX_FRAMES,
            is_long_running_graphics_mode: false,
        }
    }
}

impl ExecutionConfig {
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.max_execution_time_ms)
    }
}
