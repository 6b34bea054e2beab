//! Host controller: owns the one live isolation boundary.
//!
//! [`HostController`] is a single-owner state machine. `run`, `stop`, `focus`
//! and `cleanup` are synchronous and never fail; everything asynchronous (the
//! runaway guard and channel delivery) is awaited in [`HostController::tick`].
//! [`spawn_host`] moves a controller into a Tokio task and hands back a
//! cloneable [`HostHandle`].
//!
//! Every terminal path funnels through one teardown: cancel the guard, drop
//! pending callbacks, destroy the boundary, forget the live run. After that,
//! anything the old boundary still manages to send is recognised by its
//! [`RunId`] and ignored.

pub mod guard;
mod observer;
pub mod pending;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::artifact::{Artifact, ArtifactBuilder};
use crate::channel::{event_channel, BoundarySignal, ChannelMessage, EventReceiver, EventSender};
use crate::detect::{detect_mode, execution_config};
use crate::error::SandboxError;
use crate::model::policy::{SandboxPolicy, ValidationMode};
use crate::model::{
    ExecutionConfig, ExecutionMode, LanguageHint, RunId, RunState, StatusEvent,
};
use crate::policy::CodeValidator;

pub use guard::{RunawayGuard, TIMEOUT_REASON};
pub use observer::{HostEvent, HostObserver, NoopObserver};
pub use pending::{PendingReady, ReadyCallback};

// =============================================================================
// Collaborator seams
// =============================================================================

/// What the host asks a factory to build.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoundaryRequest {
    /// Run the boundary is created for; its events carry this id.
    pub run_id: RunId,
    /// Whether the artifact is an instrumented script or a raw document.
    pub mode: ExecutionMode,
    /// Hint only; enforced by boundaries that can.
    pub memory_limit_mb: u64,
}

/// An embedded execution context running one artifact.
///
/// Implementations report back exclusively through the [`EventSender`] they
/// were created with.
pub trait IsolationBoundary: Send {
    /// Start loading `artifact`. Readiness is reported later over the channel.
    fn load(&mut self, artifact: &Artifact);
    /// Give keyboard focus to the context.
    fn focus(&mut self);
    /// Tear down the context. Must be safe to call while the context is
    /// unresponsive; nothing it was running may outlive this call.
    fn destroy(&mut self);
}

/// Creates one [`IsolationBoundary`] per run.
pub trait BoundaryFactory: Send {
    /// Build a boundary for `request`. `events` is tagged with the request's
    /// run id and is the only way the boundary reports back.
    fn create(
        &mut self,
        request: &BoundaryRequest,
        events: EventSender,
    ) -> Result<Box<dyn IsolationBoundary>, SandboxError>;
}

/// Where the host renders its own UI.
pub trait Surface: Send {
    /// Shown when there is no code to run.
    fn show_placeholder(&mut self);
    fn show_diagnostic(&mut self, panel: &DiagnosticPanel);
    /// Remove whatever the host last showed.
    fn clear(&mut self);
}

/// Diagnostic shown when a run is stopped, blocked or fails to start.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DiagnosticPanel {
    /// Short heading, e.g. "Sketch stopped".
    pub title: String,
    /// Why the run ended, as given to `stop` or collected from the validator.
    pub reason: String,
    /// What the author can do about it.
    pub hint: String,
}

impl DiagnosticPanel {
    /// Panel for `stop(Some(reason))`, with a hint matched to the reason.
    pub fn stopped(reason: &str) -> Self {
        Self {
            title: "Sketch stopped".to_string(),
            reason: reason.to_string(),
            hint: remediation_hint(reason).to_string(),
        }
    }

    /// Panel listing validator findings that kept a snippet from loading.
    pub fn blocked(issues: &[String]) -> Self {
        Self {
            title: "Sketch blocked".to_string(),
            reason: issues.join("; "),
            hint: "Remove the blocked code and run the sketch again.".to_string(),
        }
    }

    /// Panel for a boundary the factory could not create.
    pub fn failed_to_start(err: &SandboxError) -> Self {
        Self {
            title: "Sketch could not start".to_string(),
            reason: err.message.clone(),
            hint: "Try running the sketch again.".to_string(),
        }
    }
}

/// Advice shown under a stop reason.
pub fn remediation_hint(reason: &str) -> &'static str {
    if reason == TIMEOUT_REASON {
        "The sketch never finished starting. Look for a loop that never ends, \
         such as while (true), and make sure draw() returns after each frame."
    } else {
        "Check the code for mistakes and run it again."
    }
}

// =============================================================================
// Controller
// =============================================================================

#[derive(Clone, Copy, Debug)]
struct LiveRun {
    run_id: RunId,
    mode: ExecutionMode,
    config: Option<ExecutionConfig>,
}

enum Wake {
    Message(Option<ChannelMessage>),
    Deadline,
}

pub struct HostController {
    policy: SandboxPolicy,
    validator: CodeValidator,
    factory: Box<dyn BoundaryFactory>,
    surface: Box<dyn Surface>,
    observer: Box<dyn HostObserver>,
    sender: EventSender,
    receiver: EventReceiver,
    boundary: Option<Box<dyn IsolationBoundary>>,
    live: Option<LiveRun>,
    ready: bool,
    guard: Option<RunawayGuard>,
    pending: PendingReady,
    state: RunState,
}

impl HostController {
    /// Fresh controller: `Idle`, no boundary. `policy` is used as given; run
    /// [`crate::policy::validate_policy`] on untrusted input first.
    pub fn new(
        policy: SandboxPolicy,
        factory: Box<dyn BoundaryFactory>,
        surface: Box<dyn Surface>,
    ) -> Self {
        let (sender, receiver) = event_channel(RunId::new());
        Self {
            policy,
            validator: CodeValidator::new(),
            factory,
            surface,
            observer: Box::new(NoopObserver),
            sender,
            receiver,
            boundary: None,
            live: None,
            ready: false,
            guard: None,
            pending: PendingReady::default(),
            state: RunState::Idle,
        }
    }

    #[must_use]
    pub fn with_observer(mut self, observer: Box<dyn HostObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn policy(&self) -> &SandboxPolicy {
        &self.policy
    }

    /// Id of the live run, if any.
    pub fn current_run(&self) -> Option<RunId> {
        self.live.map(|l| l.run_id)
    }

    pub fn current_mode(&self) -> Option<ExecutionMode> {
        self.live.map(|l| l.mode)
    }

    /// Limits of the live script-mode run.
    pub fn current_config(&self) -> Option<ExecutionConfig> {
        self.live.and_then(|l| l.config)
    }

    pub fn has_boundary(&self) -> bool {
        self.boundary.is_some()
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn guard(&self) -> Option<&RunawayGuard> {
        self.guard.as_ref()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Discard whatever is running and start `code`.
    pub fn run(&mut self, code: &str, hint: &LanguageHint) {
        if self.teardown() {
            self.set_state(RunState::Replaced);
        }
        self.surface.clear();

        if code.trim().is_empty() {
            debug!("empty code; showing placeholder");
            self.surface.show_placeholder();
            self.set_state(RunState::Idle);
            return;
        }

        let mode = detect_mode(code, hint);
        if mode == ExecutionMode::Script && !self.passes_validation(code) {
            self.set_state(RunState::Stopped);
            return;
        }

        let run_id = RunId::new();
        let (artifact, config) = self.build_artifact(run_id, mode, code);
        let request = BoundaryRequest {
            run_id,
            mode,
            memory_limit_mb: self.policy.budgets.max_memory_mb,
        };
        let mut boundary = match self.factory.create(&request, self.sender.for_run(run_id)) {
            Ok(boundary) => boundary,
            Err(err) => {
                warn!(run_id = %run_id, error = %err, "boundary creation failed");
                self.surface.show_diagnostic(&DiagnosticPanel::failed_to_start(&err));
                self.set_state(RunState::Stopped);
                return;
            }
        };

        self.live = Some(LiveRun {
            run_id,
            mode,
            config,
        });
        info!(run_id = %run_id, mode = %mode, "run started");
        self.observer.on_event(&HostEvent::RunStarted {
            run_id,
            mode,
            config,
        });

        // Armed before load so readiness can never be observed without it.
        if let Some(config) = config {
            self.arm_guard(run_id, config);
        }
        boundary.load(&artifact);
        self.boundary = Some(boundary);
        self.set_state(RunState::Running);
    }

    /// Tear down the live run. With a reason, show a diagnostic naming it.
    pub fn stop(&mut self, reason: Option<&str>) {
        self.teardown();
        match reason {
            Some(reason) => {
                info!(reason, "run stopped");
                self.surface.show_diagnostic(&DiagnosticPanel::stopped(reason));
                let next = if reason == TIMEOUT_REASON {
                    RunState::TimedOut
                } else {
                    RunState::Stopped
                };
                self.set_state(next);
            }
            None => self.set_state(RunState::Idle),
        }
    }

    pub fn cleanup(&mut self) {
        self.stop(None);
    }

    /// Focus the boundary now if it is ready, otherwise once it is.
    pub fn focus(&mut self) {
        self.when_ready(Box::new(|boundary: &mut dyn IsolationBoundary| {
            boundary.focus();
        }));
    }

    /// Run `callback` against the boundary once it signals readiness, or
    /// immediately if it already has. Dropped when there is no boundary.
    pub fn when_ready(&mut self, callback: ReadyCallback) {
        match self.boundary.as_deref_mut() {
            Some(boundary) if self.ready => callback(boundary),
            Some(_) => self.pending.push(callback),
            None => debug!("no boundary; ready callback dropped"),
        }
    }

    /// Wait for the next channel message or the guard deadline, and react.
    pub async fn tick(&mut self) {
        let deadline = self.guard.as_ref().map(RunawayGuard::deadline);
        let wake = tokio::select! {
            biased;
            msg = self.receiver.recv() => Wake::Message(msg),
            () = guard::wait_for_guard(deadline) => Wake::Deadline,
        };
        match wake {
            Wake::Message(Some(msg)) => self.handle(msg),
            // The controller holds a sender, so the channel cannot close.
            Wake::Message(None) => {}
            Wake::Deadline => self.fire_guard(),
        }
    }

    /// Handle every queued message, then fire the guard if it is due.
    /// Returns the number of messages handled.
    pub fn drain(&mut self) -> usize {
        let mut handled = 0;
        while let Some(msg) = self.receiver.try_recv() {
            self.handle(msg);
            handled += 1;
        }
        if self
            .guard
            .as_ref()
            .is_some_and(|guard| guard.is_due(Instant::now()))
        {
            self.fire_guard();
        }
        handled
    }

    fn passes_validation(&mut self, code: &str) -> bool {
        if self.policy.validation == ValidationMode::Off {
            return true;
        }
        let report = self.validator.validate(code);
        if report.valid {
            return true;
        }
        let issues = report.messages();
        if self.policy.validation == ValidationMode::Enforce {
            warn!(issues = ?issues, "snippet blocked by validator");
            self.surface.show_diagnostic(&DiagnosticPanel::blocked(&issues));
            self.observer.on_event(&HostEvent::Blocked { issues });
            return false;
        }
        warn!(issues = ?issues, "validator findings; running anyway");
        true
    }

    fn build_artifact(
        &self,
        run_id: RunId,
        mode: ExecutionMode,
        code: &str,
    ) -> (Artifact, Option<ExecutionConfig>) {
        match mode {
            ExecutionMode::Document => (ArtifactBuilder::document(run_id, code), None),
            ExecutionMode::Script => {
                let config = execution_config(
                    code,
                    &self.policy.budgets,
                    &self.policy.library.graphics_marker,
                );
                let artifact = ArtifactBuilder::new(&self.policy).script(run_id, code, config);
                (artifact, Some(config))
            }
        }
    }

    fn arm_guard(&mut self, run_id: RunId, config: ExecutionConfig) {
        let guard = RunawayGuard::arm(run_id, config.timeout());
        debug!(
            run_id = %run_id,
            budget_ms = config.max_execution_time_ms,
            graphics = config.is_long_running_graphics_mode,
            "guard armed"
        );
        self.observer.on_event(&HostEvent::GuardArmed {
            run_id,
            budget_ms: config.max_execution_time_ms,
        });
        self.guard = Some(guard);
    }

    fn fire_guard(&mut self) {
        let Some(guard) = self.guard.take() else {
            return;
        };
        warn!(
            run_id = %guard.run_id(),
            budget_ms = u64::try_from(guard.budget().as_millis()).unwrap_or(u64::MAX),
            "no first frame within budget; destroying boundary"
        );
        self.observer.on_event(&HostEvent::GuardFired {
            run_id: guard.run_id(),
        });
        self.stop(Some(TIMEOUT_REASON));
    }

    fn handle(&mut self, msg: ChannelMessage) {
        if self.current_run() != Some(msg.run_id) {
            debug!(run_id = %msg.run_id, "message for a run that is not live; ignored");
            self.observer.on_event(&HostEvent::Ignored { run_id: msg.run_id });
            return;
        }
        match msg.signal {
            BoundarySignal::Ready => self.on_ready(msg.run_id),
            BoundarySignal::Status(event) => self.dispatch(msg.run_id, event),
        }
    }

    fn on_ready(&mut self, run_id: RunId) {
        if self.ready {
            debug!(run_id = %run_id, "duplicate ready signal");
            return;
        }
        let Some(boundary) = self.boundary.as_deref_mut() else {
            return;
        };
        self.ready = true;
        let drained = self.pending.drain_into(boundary);
        boundary.focus();
        debug!(run_id = %run_id, drained, "boundary ready");
        self.observer.on_event(&HostEvent::Ready { run_id, drained });
        if self.state == RunState::Running {
            self.set_state(RunState::Loaded);
        }
    }

    fn dispatch(&mut self, run_id: RunId, event: StatusEvent) {
        match &event {
            StatusEvent::Error {
                message,
                line,
                context,
            } => {
                info!(run_id = %run_id, error = %message, line = ?line, context = ?context, "sketch error");
            }
            StatusEvent::FirstFrame => {
                if let Some(guard) = self.guard.take() {
                    debug!(run_id = %run_id, "first frame; guard cancelled");
                    self.observer.on_event(&HostEvent::GuardCancelled {
                        run_id: guard.run_id(),
                    });
                } else {
                    debug!(run_id = %run_id, "first frame with no guard armed");
                }
            }
            StatusEvent::SetupComplete => debug!(run_id = %run_id, "setup complete"),
        }
        self.observer.on_event(&HostEvent::Status { run_id, event });
    }

    /// Release everything tied to the current run. Returns whether a live
    /// boundary was discarded.
    fn teardown(&mut self) -> bool {
        if let Some(guard) = self.guard.take() {
            debug!(run_id = %guard.run_id(), "guard cancelled by teardown");
        }
        self.pending.clear();
        self.ready = false;
        self.live = None;
        match self.boundary.take() {
            Some(mut boundary) => {
                boundary.destroy();
                self.state.is_live()
            }
            None => false,
        }
    }

    fn set_state(&mut self, to: RunState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        self.observer.on_event(&HostEvent::StateChanged { from, to });
    }
}

impl Drop for HostController {
    fn drop(&mut self) {
        self.teardown();
    }
}

// =============================================================================
// Actor
// =============================================================================

#[derive(Debug)]
enum HostCommand {
    Run { code: String, hint: LanguageHint },
    Stop { reason: Option<String> },
    Focus,
    Cleanup,
    Shutdown,
}

/// Cloneable handle to a spawned controller. Commands are applied in the
/// order they were sent; there are no return values.
#[derive(Clone, Debug)]
pub struct HostHandle {
    tx: mpsc::UnboundedSender<HostCommand>,
}

impl HostHandle {
    pub fn run(&self, code: impl Into<String>, hint: LanguageHint) {
        self.send(HostCommand::Run {
            code: code.into(),
            hint,
        });
    }

    pub fn stop(&self, reason: Option<&str>) {
        self.send(HostCommand::Stop {
            reason: reason.map(str::to_string),
        });
    }

    pub fn focus(&self) {
        self.send(HostCommand::Focus);
    }

    pub fn cleanup(&self) {
        self.send(HostCommand::Cleanup);
    }

    /// Clean up and end the task. The join handle yields the controller.
    pub fn shutdown(&self) {
        self.send(HostCommand::Shutdown);
    }

    fn send(&self, command: HostCommand) {
        if self.tx.send(command).is_err() {
            debug!("host task has exited; command dropped");
        }
    }
}

/// Move `controller` into a Tokio task.
///
/// The task ends on [`HostHandle::shutdown`] or when every handle is dropped,
/// cleaning up on the way out.
pub fn spawn_host(controller: HostController) -> (HostHandle, JoinHandle<HostController>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(host_loop(controller, rx));
    (HostHandle { tx }, task)
}

async fn host_loop(
    mut controller: HostController,
    mut commands: mpsc::UnboundedReceiver<HostCommand>,
) -> HostController {
    loop {
        let command = tokio::select! {
            biased;
            command = commands.recv() => Some(command),
            () = controller.tick() => None,
        };
        match command {
            None => {}
            Some(None | Some(HostCommand::Shutdown)) => break,
            Some(Some(HostCommand::Run { code, hint })) => controller.run(&code, &hint),
            Some(Some(HostCommand::Stop { reason })) => controller.stop(reason.as_deref()),
            Some(Some(HostCommand::Focus)) => controller.focus(),
            Some(Some(HostCommand::Cleanup)) => controller.cleanup(),
        }
    }
    controller.cleanup();
    controller
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_panel_points_at_endless_loops() {
        let panel = DiagnosticPanel::stopped(TIMEOUT_REASON);
        assert_eq!(panel.title, "Sketch stopped");
        assert_eq!(panel.reason, "execution timeout");
        assert!(panel.hint.contains("while (true)"));
        let other = DiagnosticPanel::stopped("stop button pressed");
        assert_eq!(other.hint, remediation_hint("anything else"));
    }

    #[test]
    fn blocked_and_start_failure_panels_carry_their_reason() {
        let blocked = DiagnosticPanel::blocked(&["eval".to_string(), "fetch".to_string()]);
        assert_eq!(blocked.reason, "eval; fetch");
        let failed = DiagnosticPanel::failed_to_start(&SandboxError::protocol("no frame"));
        assert_eq!(failed.title, "Sketch could not start");
        assert_eq!(failed.reason, "no frame");
    }
}
