//! Scripted in-process isolation boundaries.
//!
//! A [`ScriptedBoundary`] does not run JavaScript. It plays a [`SketchScript`]
//! through [`LifecycleShim`], the same state machine the artifact's shim
//! implements, and posts whatever the shim produces on the real
//! [`EventSender`]. Everything happens synchronously inside `load`, so the
//! host sees the events on its next `drain` or `tick`.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use sketchbox::artifact::{binds_draw, Artifact};
use sketchbox::channel::EventSender;
use sketchbox::error::SandboxError;
use sketchbox::host::{BoundaryFactory, BoundaryRequest, IsolationBoundary};
use sketchbox::model::{ExecutionConfig, ExecutionMode, RunId, StatusEvent};
use sketchbox::policy::CodeValidator;
use sketchbox::shim::{FrameOutcome, HookError, LifecycleShim};
use tracing::debug;

/// How a scripted sketch behaves once loaded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SketchScript {
    /// Setup succeeds, then up to `frames` draw calls.
    Animated { frames: u64 },
    /// Setup succeeds; the sketch has no draw hook.
    Static,
    /// No draw hook at inspection time; `setup` binds one, then up to
    /// `frames` draw calls.
    DrawBoundInSetup { frames: u64 },
    /// The initialization hook throws.
    SetupThrows { message: String, line: Option<u32> },
    /// Draw throws on frame `at` and keeps running for `frames` calls.
    DrawThrows { frames: u64, at: u64, message: String },
    /// Top-level code throws before the library starts.
    LoadThrows { message: String },
    /// Never yields: no readiness, no events. Tests drive these by hand
    /// through [`ScriptedFactory::sender`].
    Silent,
}

impl SketchScript {
    /// Rough guess at how `code` would behave, for offline simulation.
    pub fn infer(code: &str, frames: u64) -> Self {
        let report = CodeValidator::new().validate(code);
        if report.issues.iter().any(|issue| issue.rule == "infinite-loop") {
            return Self::Silent;
        }
        if binds_draw(code) {
            Self::Animated { frames }
        } else {
            Self::Static
        }
    }
}

/// One artifact handed to a boundary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadRecord {
    pub run_id: RunId,
    pub mode: ExecutionMode,
    pub html: String,
    pub config: Option<ExecutionConfig>,
}

#[derive(Debug)]
struct FactoryState {
    default_script: SketchScript,
    queued: VecDeque<SketchScript>,
    fail_next: Option<String>,
    requests: Vec<BoundaryRequest>,
    senders: Vec<EventSender>,
    loaded: Vec<LoadRecord>,
    focused: Vec<RunId>,
    destroyed: Vec<RunId>,
    draw_calls: Vec<(RunId, u64)>,
    panels: Vec<(RunId, Vec<String>)>,
}

type Shared = Arc<Mutex<FactoryState>>;

fn lock(shared: &Shared) -> MutexGuard<'_, FactoryState> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Factory whose boundaries play scripts. Clones share state, so keep one
/// clone to inspect what the host did.
#[derive(Clone, Debug)]
pub struct ScriptedFactory {
    shared: Shared,
}

impl ScriptedFactory {
    /// Every boundary plays `script` unless one is queued.
    pub fn new(script: SketchScript) -> Self {
        Self {
            shared: Arc::new(Mutex::new(FactoryState {
                default_script: script,
                queued: VecDeque::new(),
                fail_next: None,
                requests: Vec::new(),
                senders: Vec::new(),
                loaded: Vec::new(),
                focused: Vec::new(),
                destroyed: Vec::new(),
                draw_calls: Vec::new(),
                panels: Vec::new(),
            })),
        }
    }

    /// Script for the next boundary only.
    pub fn queue(&self, script: SketchScript) {
        lock(&self.shared).queued.push_back(script);
    }

    /// Make the next `create` fail with `message`.
    pub fn fail_next(&self, message: &str) {
        lock(&self.shared).fail_next = Some(message.to_string());
    }

    pub fn requests(&self) -> Vec<BoundaryRequest> {
        lock(&self.shared).requests.clone()
    }

    pub fn created(&self) -> usize {
        lock(&self.shared).requests.len()
    }

    /// The sender handed to the boundary for `run_id`.
    pub fn sender(&self, run_id: RunId) -> Option<EventSender> {
        lock(&self.shared)
            .senders
            .iter()
            .find(|s| s.run_id() == run_id)
            .cloned()
    }

    pub fn loaded(&self) -> Vec<LoadRecord> {
        lock(&self.shared).loaded.clone()
    }

    pub fn focused(&self) -> Vec<RunId> {
        lock(&self.shared).focused.clone()
    }

    pub fn destroyed(&self) -> Vec<RunId> {
        lock(&self.shared).destroyed.clone()
    }

    /// Number of user draw-hook invocations the shim let through.
    pub fn draw_calls(&self, run_id: RunId) -> u64 {
        lock(&self.shared)
            .draw_calls
            .iter()
            .find(|(id, _)| *id == run_id)
            .map_or(0, |(_, calls)| *calls)
    }

    /// Lines the shim rendered into the on-artifact error panel.
    pub fn error_panel(&self, run_id: RunId) -> Vec<String> {
        lock(&self.shared)
            .panels
            .iter()
            .find(|(id, _)| *id == run_id)
            .map(|(_, lines)| lines.clone())
            .unwrap_or_default()
    }
}

impl BoundaryFactory for ScriptedFactory {
    fn create(
        &mut self,
        request: &BoundaryRequest,
        events: EventSender,
    ) -> Result<Box<dyn IsolationBoundary>, SandboxError> {
        let mut state = lock(&self.shared);
        if let Some(message) = state.fail_next.take() {
            return Err(SandboxError::internal(message));
        }
        let queued = state.queued.pop_front();
        let script = queued.unwrap_or_else(|| state.default_script.clone());
        state.requests.push(request.clone());
        state.senders.push(events.clone());
        drop(state);

        Ok(Box::new(ScriptedBoundary {
            run_id: request.run_id,
            script,
            events,
            shared: Arc::clone(&self.shared),
            destroyed: false,
        }))
    }
}

/// Boundary created by [`ScriptedFactory`].
#[derive(Debug)]
pub struct ScriptedBoundary {
    run_id: RunId,
    script: SketchScript,
    events: EventSender,
    shared: Shared,
    destroyed: bool,
}

impl ScriptedBoundary {
    fn emit_all(&self, events: Vec<StatusEvent>) {
        for event in events {
            self.events.emit(event);
        }
    }

    fn play(&self, config: &ExecutionConfig) {
        let mut shim = LifecycleShim::new(self.run_id, config);
        if matches!(
            self.script,
            SketchScript::Animated { .. } | SketchScript::DrawThrows { .. }
        ) {
            shim.bind_draw();
        }
        let mut calls = 0;
        match &self.script {
            SketchScript::Silent => return,
            SketchScript::LoadThrows { message } => {
                let event = shim.report_uncaught(HookError::new(message.clone()));
                self.events.emit(event);
                self.events.ready();
            }
            SketchScript::Static => {
                self.emit_all(shim.run_setup(|_| Ok(())).events);
                self.events.ready();
            }
            SketchScript::SetupThrows { message, line } => {
                let mut err = HookError::new(message.clone());
                err.line = *line;
                self.emit_all(shim.run_setup(|_| Err(err)).events);
                self.events.ready();
            }
            SketchScript::Animated { frames } => {
                self.emit_all(shim.run_setup(|_| Ok(())).events);
                self.events.ready();
                calls = self.play_frames(&mut shim, *frames, None);
            }
            SketchScript::DrawBoundInSetup { frames } => {
                let report = shim.run_setup(|hooks| {
                    hooks.bind_draw();
                    Ok(())
                });
                self.emit_all(report.events);
                self.events.ready();
                calls = self.play_frames(&mut shim, *frames, None);
            }
            SketchScript::DrawThrows {
                frames,
                at,
                message,
            } => {
                self.emit_all(shim.run_setup(|_| Ok(())).events);
                self.events.ready();
                calls = self.play_frames(&mut shim, *frames, Some((*at, message.as_str())));
            }
        }

        let mut state = lock(&self.shared);
        state.draw_calls.push((self.run_id, calls));
        state.panels.push((self.run_id, shim.error_panel().to_vec()));
    }

    /// Returns how many times the user hook actually ran.
    fn play_frames(&self, shim: &mut LifecycleShim, frames: u64, fault: Option<(u64, &str)>) -> u64 {
        let mut calls = 0;
        for _ in 0..frames {
            let report = shim.run_frame(|frame| {
                calls += 1;
                match fault {
                    Some((at, message)) if at == frame => Err(HookError::new(message)),
                    _ => Ok(()),
                }
            });
            self.emit_all(report.events);
            if matches!(
                report.outcome,
                FrameOutcome::LimitReached | FrameOutcome::Disabled
            ) {
                break;
            }
        }
        calls
    }
}

impl IsolationBoundary for ScriptedBoundary {
    fn load(&mut self, artifact: &Artifact) {
        debug!(run_id = %self.run_id, mode = %artifact.mode, "scripted boundary loading");
        lock(&self.shared).loaded.push(LoadRecord {
            run_id: artifact.run_id,
            mode: artifact.mode,
            html: artifact.html.clone(),
            config: artifact.config,
        });
        match artifact.config {
            Some(config) if artifact.mode == ExecutionMode::Script => self.play(&config),
            _ => {
                if self.script != SketchScript::Silent {
                    self.events.ready();
                }
            }
        }
    }

    fn focus(&mut self) {
        lock(&self.shared).focused.push(self.run_id);
    }

    fn destroy(&mut self) {
        if !self.destroyed {
            self.destroyed = true;
            lock(&self.shared).destroyed.push(self.run_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infer_spots_endless_loops_and_draw_hooks() {
        assert_eq!(SketchScript::infer("while (true) {}", 5), SketchScript::Silent);
        assert_eq!(
            SketchScript::infer("function draw() { circle(1, 1, 1); }", 5),
            SketchScript::Animated { frames: 5 }
        );
        assert_eq!(
            SketchScript::infer("ellipse(50,50,20,20)", 5),
            SketchScript::Static
        );
    }

    #[test]
    fn infer_ignores_lookalike_draw_names() {
        assert_eq!(
            SketchScript::infer("let redraw = true; if (draw == null) {}", 5),
            SketchScript::Static
        );
        assert_eq!(
            SketchScript::infer("function setup() { window.draw = function () {}; }", 5),
            SketchScript::Animated { frames: 5 }
        );
    }
}
