use serde::{Deserialize, Serialize};

use crate::model::config::{DEFAULT_GRAPHICS_TIMEOUT_MS, DEFAULT_MAX_FRAMES, DEFAULT_SCRIPT_TIMEOUT_MS};

/// Current policy format version.
pub const POLICY_VERSION: u32 = 1;

/// Drawing library loaded ahead of every script-mode snippet.
pub const DEFAULT_LIBRARY_URL: &str = "https://cdnjs.cloudflare.com/ajax/libs/p5.js/1.9.0/p5.min.js";

/// Case-insensitive marker that flags hardware-accelerated rendering.
pub const DEFAULT_GRAPHICS_MARKER: &str = "webgl";

// =============================================================================
// Policy Sections
// =============================================================================

/// Time and iteration budgets.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Budgets {
    /// Wall-clock budget until the first frame, in milliseconds.
    pub script_timeout_ms: u64,
    /// Same budget when the graphics marker is present.
    pub graphics_timeout_ms: u64,
    /// Per-frame hook ceiling before the draw loop is stopped.
    pub max_frames: u64,
    /// Memory hint forwarded to boundaries that can enforce it.
    pub max_memory_mb: u64,
}

impl Default for Budgets {
    fn default() -> Self {
        Self {
            script_timeout_ms: DEFAULT_SCRIPT_TIMEOUT_MS,
            graphics_timeout_ms: DEFAULT_GRAPHICS_TIMEOUT_MS,
            max_frames: DEFAULT_MAX_FRAMES,
            max_memory_mb: 100,
        }
    }
}

/// Drawing-library bootstrap used by the artifact builder.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct LibraryPolicy {
    /// Script URL of the drawing library.
    pub bootstrap_url: String,
    /// Substring that switches a run to the graphics budget.
    pub graphics_marker: String,
    /// Canvas created for bare snippets that define no hooks.
    pub canvas_width: u32,
    pub canvas_height: u32,
}

impl Default for LibraryPolicy {
    fn default() -> Self {
        Self {
            bootstrap_url: DEFAULT_LIBRARY_URL.to_string(),
            graphics_marker: DEFAULT_GRAPHICS_MARKER.to_string(),
            canvas_width: 400,
            canvas_height: 400,
        }
    }
}

/// Browser capabilities granted to script-mode artifacts.
///
/// Rendered into the artifact's content security policy and shim. The
/// boundary itself stays the primary containment.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct CapabilityPolicy {
    /// Allow outbound connections to `allowed_domains`.
    pub enable_network: bool,
    /// Origins reachable when network is enabled (e.g. `https://api.example.org`).
    pub allowed_domains: Vec<String>,
    /// Leave `localStorage`/`sessionStorage`/`indexedDB` reachable.
    pub enable_storage: bool,
}

/// What the host does with static validator findings.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMode {
    /// Skip the validator.
    Off,
    /// Log findings and run anyway.
    #[default]
    Warn,
    /// Refuse to load snippets with findings.
    Enforce,
}

/// Sandbox configuration for a host controller.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct SandboxPolicy {
    /// Policy format version for compatibility checking.
    pub policy_version: u32,
    pub budgets: Budgets,
    pub library: LibraryPolicy,
    pub capabilities: CapabilityPolicy,
    pub validation: ValidationMode,
}

impl Default for SandboxPolicy {
    fn default() -> Self {
        Self {
            policy_version: POLICY_VERSION,
            budgets: Budgets::default(),
            library: LibraryPolicy::default(),
            capabilities: CapabilityPolicy::default(),
            validation: ValidationMode::default(),
        }
    }
}

// =============================================================================
// Policy Builder
// =============================================================================

/// Fluent builder for [`SandboxPolicy`].
///
/// ```
/// use sketchbox::model::policy::{PolicyBuilder, ValidationMode};
///
/// let policy = PolicyBuilder::new()
///     .script_timeout_ms(2_000)
///     .max_frames(600)
///     .validation(ValidationMode::Enforce)
///     .build();
/// assert_eq!(policy.budgets.max_frames, 600);
/// ```
#[derive(Clone, Debug, Default)]
pub struct PolicyBuilder {
    policy: SandboxPolicy,
}

impl PolicyBuilder {
    /// Start from the default policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn script_timeout_ms(mut self, ms: u64) -> Self {
        self.policy.budgets.script_timeout_ms = ms;
        self
    }

    #[must_use]
    pub fn graphics_timeout_ms(mut self, ms: u64) -> Self {
        self.policy.budgets.graphics_timeout_ms = ms;
        self
    }

    #[must_use]
    pub fn max_frames(mut self, frames: u64) -> Self {
        self.policy.budgets.max_frames = frames;
        self
    }

    #[must_use]
    pub fn max_memory_mb(mut self, mb: u64) -> Self {
        self.policy.budgets.max_memory_mb = mb;
        self
    }

    #[must_use]
    pub fn bootstrap_url(mut self, url: impl Into<String>) -> Self {
        self.policy.library.bootstrap_url = url.into();
        self
    }

    #[must_use]
    pub fn canvas_size(mut self, width: u32, height: u32) -> Self {
        self.policy.library.canvas_width = width;
        self.policy.library.canvas_height = height;
        self
    }

    /// Enable network access for the given origins.
    #[must_use]
    pub fn allow_domains(mut self, domains: Vec<String>) -> Self {
        self.policy.capabilities.enable_network = true;
        self.policy.capabilities.allowed_domains = domains;
        self
    }

    #[must_use]
    pub fn enable_storage(mut self) -> Self {
        self.policy.capabilities.enable_storage = true;
        self
    }

    #[must_use]
    pub fn validation(mut self, mode: ValidationMode) -> Self {
        self.policy.validation = mode;
        self
    }

    /// Build the policy. Use [`crate::policy::validate_policy`] before use.
    #[must_use]
    pub fn build(self) -> SandboxPolicy {
        self.policy
    }
}
