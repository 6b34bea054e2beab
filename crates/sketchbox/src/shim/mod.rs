//! Lifecycle-hook instrumentation state for one run.
//!
//! [`LifecycleShim`] is the per-run, per-boundary record behind the wrapped
//! `setup` and `draw` hooks. The JavaScript emitted by
//! [`crate::artifact::ArtifactBuilder`] implements the same transitions inside
//! the browser; in-process boundaries drive this type directly.
//!
//! The shim never runs user hooks itself: callers pass the hook as a closure,
//! and the shim decides whether to call it and which [`StatusEvent`]s result.
//! A failing hook is contained here and never propagates to the caller.

use crate::model::{ExecutionConfig, FaultKind, RunId, StatusEvent};

/// Exception raised by a user hook.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HookError {
    pub message: String,
    pub line: Option<u32>,
}

impl HookError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: None,
        }
    }

    #[must_use]
    pub fn at_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }
}

/// What a single draw-hook invocation amounted to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The user hook ran to completion.
    Drawn,
    /// The user hook threw; later frames still run.
    Faulted,
    /// This invocation crossed the ceiling. The caller must stop its loop.
    LimitReached,
    /// The hook is disabled; nothing ran.
    Disabled,
}

/// Result of one wrapped hook call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HookReport<T> {
    pub outcome: T,
    pub events: Vec<StatusEvent>,
}

/// Hook slots as the user's code leaves them.
///
/// Passed to the initialization hook so it can bind a per-frame hook late
/// (`window.draw = ...` inside `setup`). Whatever the slot holds when setup
/// returns is what the shim wraps.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HookBindings {
    draw: bool,
}

impl HookBindings {
    pub fn bind_draw(&mut self) {
        self.draw = true;
    }

    pub fn has_draw(&self) -> bool {
        self.draw
    }
}

#[derive(Debug)]
pub struct LifecycleShim {
    run_id: RunId,
    max_frames: u64,
    bindings: HookBindings,
    frames: u64,
    setup_started: bool,
    first_frame_sent: bool,
    limit_hit: bool,
    panel: Vec<String>,
}

impl LifecycleShim {
    /// Fresh state for one run, with no hooks bound yet.
    pub fn new(run_id: RunId, config: &ExecutionConfig) -> Self {
        Self {
            run_id,
            max_frames: config.max_frames,
            bindings: HookBindings::default(),
            frames: 0,
            setup_started: false,
            first_frame_sent: false,
            limit_hit: false,
            panel: Vec::new(),
        }
    }

    /// The inspection pass found a per-frame hook once the snippet finished
    /// evaluating.
    pub fn bind_draw(&mut self) {
        self.bindings.bind_draw();
    }

    /// Whether a per-frame hook is bound and wrapped.
    pub fn has_draw(&self) -> bool {
        self.bindings.has_draw()
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Number of draw invocations counted so far, including the one that
    /// crossed the ceiling.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn is_disabled(&self) -> bool {
        self.limit_hit
    }

    /// Lines shown in the on-artifact error panel, oldest first.
    pub fn error_panel(&self) -> &[String] {
        &self.panel
    }

    /// Wrapped initialization hook. The draw slot is re-inspected after
    /// `setup` returns or throws, so a hook bound during setup is wrapped and
    /// the static-sketch decision sees it.
    pub fn run_setup<F>(&mut self, setup: F) -> HookReport<bool>
    where
        F: FnOnce(&mut HookBindings) -> Result<(), HookError>,
    {
        self.setup_started = true;
        let mut events = Vec::new();
        let result = setup(&mut self.bindings);
        match result {
            Ok(()) => {
                events.push(StatusEvent::SetupComplete);
                // A sketch without a draw hook has produced all of its output.
                if !self.has_draw() {
                    self.mark_first_frame(&mut events);
                }
                HookReport {
                    outcome: true,
                    events,
                }
            }
            Err(err) => {
                events.push(self.contain(err, FaultKind::Setup));
                // The hook returned control; a draw-less sketch is not runaway.
                if !self.has_draw() {
                    self.mark_first_frame(&mut events);
                }
                HookReport {
                    outcome: false,
                    events,
                }
            }
        }
    }

    /// Wrapped per-frame hook. `draw` receives the 1-based frame number.
    pub fn run_frame<F>(&mut self, draw: F) -> HookReport<FrameOutcome>
    where
        F: FnOnce(u64) -> Result<(), HookError>,
    {
        let mut events = Vec::new();
        if self.limit_hit {
            return HookReport {
                outcome: FrameOutcome::Disabled,
                events,
            };
        }

        self.frames += 1;
        if self.frames > self.max_frames {
            self.limit_hit = true;
            let message = format!("Stopped after {} frames", self.max_frames);
            self.panel.push(message.clone());
            events.push(StatusEvent::error(message, None, FaultKind::FrameLimit));
            return HookReport {
                outcome: FrameOutcome::LimitReached,
                events,
            };
        }

        self.mark_first_frame(&mut events);
        let outcome = match draw(self.frames) {
            Ok(()) => FrameOutcome::Drawn,
            Err(err) => {
                events.push(self.contain(err, FaultKind::Draw));
                FrameOutcome::Faulted
            }
        };
        HookReport { outcome, events }
    }

    /// Global error trap for exceptions outside the wrapped hooks.
    pub fn report_uncaught(&mut self, err: HookError) -> StatusEvent {
        let kind = if self.setup_started {
            FaultKind::Runtime
        } else {
            FaultKind::Load
        };
        self.contain(err, kind)
    }

    fn mark_first_frame(&mut self, events: &mut Vec<StatusEvent>) {
        if !self.first_frame_sent {
            self.first_frame_sent = true;
            events.push(StatusEvent::FirstFrame);
        }
    }

    fn contain(&mut self, err: HookError, kind: FaultKind) -> StatusEvent {
        let shown = match err.line {
            Some(line) => format!("Line {line}: {}", err.message),
            None => err.message.clone(),
        };
        self.panel.push(shown);
        StatusEvent::error(err.message, err.line, kind)
    }
}
