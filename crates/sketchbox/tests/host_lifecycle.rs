// Test module - relaxed lint rules
#![allow(clippy::default_trait_access)]
#![allow(clippy::indexing_slicing)]
#![allow(clippy::unreadable_literal)]
#![allow(clippy::panic)]
#![allow(clippy::manual_assert)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(missing_docs)]

use std::time::Duration;

use sketchbox::host::{HostController, HostEvent, TIMEOUT_REASON};
use sketchbox::model::policy::{PolicyBuilder, SandboxPolicy, ValidationMode};
use sketchbox::model::{ExecutionMode, FaultKind, LanguageHint, RunState, StatusEvent};
use sketchbox_fixtures::{CollectingObserver, RecordingSurface, ScriptedFactory, SketchScript};
use tokio::time::Instant;

struct Harness {
    host: HostController,
    factory: ScriptedFactory,
    surface: RecordingSurface,
    observer: CollectingObserver,
}

fn harness(policy: SandboxPolicy, script: SketchScript) -> Harness {
    let factory = ScriptedFactory::new(script);
    let surface = RecordingSurface::new();
    let observer = CollectingObserver::new();
    let host = HostController::new(
        policy,
        Box::new(factory.clone()),
        Box::new(surface.clone()),
    )
    .with_observer(Box::new(observer.clone()));
    Harness {
        host,
        factory,
        surface,
        observer,
    }
}

fn p5() -> LanguageHint {
    LanguageHint::parse("p5js")
}

fn is_frame_limit(event: &HostEvent) -> bool {
    matches!(
        event,
        HostEvent::Status {
            event: StatusEvent::Error {
                context: Some(FaultKind::FrameLimit),
                ..
            },
            ..
        }
    )
}

#[tokio::test(start_paused = true)]
async fn empty_code_creates_no_boundary_and_no_guard() {
    let mut h = harness(SandboxPolicy::default(), SketchScript::Static);
    h.host.run("   \n\t ", &p5());

    assert_eq!(h.host.state(), RunState::Idle);
    assert!(!h.host.has_boundary());
    assert!(h.host.guard().is_none());
    assert_eq!(h.factory.created(), 0);
    assert_eq!(h.surface.placeholders(), 1);
}

#[tokio::test(start_paused = true)]
async fn cleanup_is_idempotent_on_a_fresh_controller() {
    let mut h = harness(SandboxPolicy::default(), SketchScript::Static);
    h.host.cleanup();
    h.host.cleanup();
    assert_eq!(h.host.state(), RunState::Idle);
    assert!(h.surface.diagnostics().is_empty());
}

#[tokio::test(start_paused = true)]
async fn bare_snippet_loads_and_first_frame_cancels_guard() {
    let mut h = harness(SandboxPolicy::default(), SketchScript::Static);
    h.host.run("ellipse(50,50,20,20)", &p5());

    assert_eq!(h.host.current_mode(), Some(ExecutionMode::Script));
    let config = h.host.current_config().unwrap();
    assert_eq!(config.max_execution_time_ms, 5_000);
    assert!(!config.is_long_running_graphics_mode);
    assert_eq!(h.host.guard().unwrap().budget(), Duration::from_millis(5_000));
    assert_eq!(h.host.state(), RunState::Running);

    h.host.drain();

    assert!(h.host.guard().is_none());
    assert_eq!(h.host.state(), RunState::Loaded);
    assert_eq!(
        h.observer
            .count(|e| matches!(e, HostEvent::GuardCancelled { .. })),
        1
    );
    assert_eq!(
        h.observer.states(),
        vec![RunState::Running, RunState::Loaded]
    );
}

#[tokio::test(start_paused = true)]
async fn document_is_loaded_verbatim_without_guard() {
    let code = "<html><body><h1>Hi</h1></body></html>";
    let mut h = harness(SandboxPolicy::default(), SketchScript::Static);
    h.host.run(code, &LanguageHint::Document);

    assert_eq!(h.host.current_mode(), Some(ExecutionMode::Document));
    assert!(h.host.guard().is_none());
    let loaded = h.factory.loaded();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].html, code);
    assert!(loaded[0].config.is_none());

    h.host.drain();
    assert_eq!(h.host.state(), RunState::Loaded);
}

#[tokio::test(start_paused = true)]
async fn markup_with_library_hint_is_still_a_document() {
    let mut h = harness(SandboxPolicy::default(), SketchScript::Static);
    h.host.run("<!DOCTYPE html><p>x</p>", &p5());
    assert_eq!(h.host.current_mode(), Some(ExecutionMode::Document));
    assert!(h.host.guard().is_none());
}

#[tokio::test(start_paused = true)]
async fn endless_loop_times_out_after_script_budget() {
    let mut h = harness(SandboxPolicy::default(), SketchScript::Silent);
    let start = Instant::now();
    h.host.run("while(true){}", &p5());
    let run_id = h.host.current_run().unwrap();

    h.host.tick().await;

    assert_eq!(start.elapsed(), Duration::from_millis(5_000));
    assert_eq!(h.host.state(), RunState::TimedOut);
    assert!(!h.host.has_boundary());
    assert!(h.host.guard().is_none());
    assert_eq!(h.factory.destroyed(), vec![run_id]);
    let panel = h.surface.showing().unwrap();
    assert_eq!(panel.reason, TIMEOUT_REASON);
    assert!(!panel.hint.is_empty());
}

#[tokio::test(start_paused = true)]
async fn graphics_marker_extends_budget() {
    let mut h = harness(SandboxPolicy::default(), SketchScript::Silent);
    let start = Instant::now();
    h.host.run(
        "function setup(){ createCanvas(100, 100, WEBGL); while(true){} }",
        &p5(),
    );
    assert!(h.host.current_config().unwrap().is_long_running_graphics_mode);

    h.host.tick().await;

    assert_eq!(start.elapsed(), Duration::from_millis(15_000));
    assert_eq!(h.host.state(), RunState::TimedOut);
}

#[tokio::test(start_paused = true)]
async fn first_frame_after_guard_fired_is_ignored() {
    let mut h = harness(SandboxPolicy::default(), SketchScript::Silent);
    h.host.run("while(true){}", &p5());
    let run_id = h.host.current_run().unwrap();
    let sender = h.factory.sender(run_id).unwrap();

    h.host.tick().await;
    assert_eq!(h.host.state(), RunState::TimedOut);

    sender.emit(StatusEvent::FirstFrame);
    sender.ready();
    assert_eq!(h.host.drain(), 2);

    assert_eq!(h.host.state(), RunState::TimedOut);
    assert_eq!(
        h.observer.count(|e| matches!(e, HostEvent::Ignored { .. })),
        2
    );
    assert_eq!(
        h.observer.count(|e| matches!(e, HostEvent::GuardFired { .. })),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn frame_ceiling_reports_once_and_stops_the_hook() {
    let policy = PolicyBuilder::new().max_frames(5).build();
    let mut h = harness(policy, SketchScript::Animated { frames: 50 });
    h.host.run("function draw(){ circle(10, 10, 5); }", &p5());
    let run_id = h.host.current_run().unwrap();
    h.host.drain();

    assert_eq!(h.factory.draw_calls(run_id), 5);
    assert_eq!(h.observer.count(is_frame_limit), 1);
    assert_eq!(h.factory.error_panel(run_id), vec!["Stopped after 5 frames"]);
    // The frame limit is contained in the artifact; the run stays up.
    assert_eq!(h.host.state(), RunState::Loaded);
}

#[tokio::test(start_paused = true)]
async fn draw_bound_inside_setup_cancels_guard_and_hits_ceiling() {
    let policy = PolicyBuilder::new().max_frames(3).build();
    let mut h = harness(policy, SketchScript::DrawBoundInSetup { frames: 10 });
    h.host
        .run("var n = 0;\nfunction setup() { window.draw = function () { n++; }; }", &p5());
    let run_id = h.host.current_run().unwrap();
    h.host.drain();

    assert!(h.host.guard().is_none());
    assert_eq!(h.observer.count(|e| matches!(e, HostEvent::GuardCancelled { .. })), 1);
    assert_eq!(h.factory.draw_calls(run_id), 3);
    assert_eq!(h.observer.count(is_frame_limit), 1);
    assert_eq!(h.host.state(), RunState::Loaded);

    tokio::time::advance(Duration::from_secs(30)).await;
    h.host.drain();
    assert_eq!(h.host.state(), RunState::Loaded);
    assert_eq!(h.observer.count(|e| matches!(e, HostEvent::GuardFired { .. })), 0);
}

#[tokio::test(start_paused = true)]
async fn draw_error_is_logged_and_run_continues() {
    let script = SketchScript::DrawThrows {
        frames: 4,
        at: 2,
        message: "ball is not defined".to_string(),
    };
    let mut h = harness(SandboxPolicy::default(), script);
    h.host.run("function draw(){ ball.move(); }", &p5());
    let run_id = h.host.current_run().unwrap();
    h.host.drain();

    assert_eq!(h.factory.draw_calls(run_id), 4);
    assert_eq!(h.host.state(), RunState::Loaded);
    assert!(h.surface.diagnostics().is_empty());
    assert_eq!(h.factory.error_panel(run_id), vec!["ball is not defined"]);
}

#[tokio::test(start_paused = true)]
async fn new_run_replaces_live_boundary_and_drops_its_messages() {
    let mut h = harness(SandboxPolicy::default(), SketchScript::Silent);
    h.host.run("while(true){}", &p5());
    let first = h.host.current_run().unwrap();
    let stale = h.factory.sender(first).unwrap();

    h.host.run("function draw(){}", &p5());
    let second = h.host.current_run().unwrap();
    assert_ne!(first, second);
    assert_eq!(h.factory.destroyed(), vec![first]);
    assert!(h.observer.states().contains(&RunState::Replaced));
    assert_eq!(h.host.guard().unwrap().run_id(), second);

    stale.emit(StatusEvent::FirstFrame);
    h.host.drain();
    assert_eq!(h.host.guard().unwrap().run_id(), second);
    assert_eq!(h.host.state(), RunState::Running);
}

#[tokio::test(start_paused = true)]
async fn focus_waits_for_readiness_and_runs_once() {
    let mut h = harness(SandboxPolicy::default(), SketchScript::Silent);
    h.host.run("function draw(){}", &p5());
    let run_id = h.host.current_run().unwrap();

    h.host.focus();
    assert_eq!(h.host.pending_len(), 1);
    assert!(h.factory.focused().is_empty());

    h.factory.sender(run_id).unwrap().ready();
    h.host.drain();
    assert_eq!(h.host.pending_len(), 0);
    assert_eq!(h.host.state(), RunState::Loaded);
    // Queued focus plus the automatic one on readiness.
    assert_eq!(h.factory.focused(), vec![run_id, run_id]);

    h.host.focus();
    assert_eq!(h.factory.focused().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn pending_callbacks_do_not_survive_into_next_run() {
    let mut h = harness(SandboxPolicy::default(), SketchScript::Silent);
    h.host.run("function draw(){}", &p5());
    h.host.focus();
    h.host.run("function draw(){}", &p5());
    assert_eq!(h.host.pending_len(), 0);
}

#[tokio::test(start_paused = true)]
async fn stop_reason_decides_final_state() {
    let mut h = harness(SandboxPolicy::default(), SketchScript::Silent);
    h.host.run("function draw(){}", &p5());
    h.host.stop(Some("stop button pressed"));
    assert_eq!(h.host.state(), RunState::Stopped);
    assert_eq!(h.surface.showing().unwrap().reason, "stop button pressed");

    h.host.run("function draw(){}", &p5());
    h.host.stop(None);
    assert_eq!(h.host.state(), RunState::Idle);
    assert!(h.host.guard().is_none());
}

#[tokio::test(start_paused = true)]
async fn enforce_mode_blocks_flagged_snippets() {
    let policy = PolicyBuilder::new()
        .validation(ValidationMode::Enforce)
        .build();
    let mut h = harness(policy, SketchScript::Static);
    h.host.run("fetch('https://example.org/steal')", &p5());

    assert_eq!(h.host.state(), RunState::Stopped);
    assert_eq!(h.factory.created(), 0);
    assert!(h.host.guard().is_none());
    assert_eq!(h.surface.showing().unwrap().title, "Sketch blocked");
}

#[tokio::test(start_paused = true)]
async fn warn_mode_runs_flagged_snippets() {
    let mut h = harness(SandboxPolicy::default(), SketchScript::Static);
    h.host.run("fetch('https://example.org/data')", &p5());
    assert_eq!(h.factory.created(), 1);
    h.host.drain();
    assert_eq!(h.host.state(), RunState::Loaded);
}

#[tokio::test(start_paused = true)]
async fn boundary_failure_is_reported_not_raised() {
    let mut h = harness(SandboxPolicy::default(), SketchScript::Static);
    h.factory.fail_next("webview unavailable");
    h.host.run("function draw(){}", &p5());

    assert_eq!(h.host.state(), RunState::Stopped);
    assert!(h.host.guard().is_none());
    assert_eq!(h.surface.showing().unwrap().reason, "webview unavailable");
}

#[tokio::test(start_paused = true)]
async fn memory_hint_reaches_the_factory() {
    let policy = PolicyBuilder::new().max_memory_mb(64).build();
    let mut h = harness(policy, SketchScript::Static);
    h.host.run("function draw(){}", &p5());
    assert_eq!(h.factory.requests()[0].memory_limit_mb, 64);
}
