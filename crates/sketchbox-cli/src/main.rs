//! Sketchbox CLI: build, inspect and simulate sandboxed sketch runs.
//!
//! Everything here runs offline. `simulate` drives the real host controller
//! against an in-process scripted boundary, so no browser is involved.

// CLI-specific lint allowances (CLI binary, not library)
#![allow(missing_docs)]
#![allow(clippy::print_stdout)] // CLI must print to stdout
#![allow(clippy::print_stderr)] // CLI must print to stderr
#![allow(clippy::exit)] // CLI uses exit codes

mod protocol_help;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use miette::{IntoDiagnostic, Result};
use sketchbox::artifact::{snippet_shape, ArtifactBuilder};
use sketchbox::detect::{detect_mode, execution_config};
use sketchbox::error::SandboxError;
use sketchbox::host::{HostController, HostEvent};
use sketchbox::model::policy::{SandboxPolicy, ValidationMode};
use sketchbox::model::{ExecutionMode, LanguageHint, RunId, StatusEvent};
use sketchbox::policy::{load_policy_file, CodeValidator};
use sketchbox_fixtures::{CollectingObserver, RecordingSurface, ScriptedFactory, SketchScript};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Color output mode
#[derive(Copy, Clone, Debug, Default, ValueEnum)]
enum ColorMode {
    /// Auto-detect based on terminal and `NO_COLOR` env
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

#[derive(Debug, Parser)]
#[command(
    name = "sketchbox",
    version,
    about = "Sandboxed execution engine for untrusted sketches"
)]
struct Cli {
    /// Color output mode
    #[arg(long, value_enum, default_value_t = ColorMode::Auto, global = true)]
    color: ColorMode,
    /// Log at debug level (overrides `SKETCHBOX_LOG`)
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Classify code as a document or a script and print its limits
    Detect {
        /// Source file, or `-` for stdin
        input: PathBuf,
        /// Declared language (e.g. `p5js`, `document`)
        #[arg(long, default_value = "p5js")]
        language: String,
        #[arg(long)]
        policy: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Assemble the artifact a boundary would load
    Build {
        /// Source file, or `-` for stdin
        input: PathBuf,
        #[arg(long, default_value = "p5js")]
        language: String,
        /// Write the artifact here instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
        #[arg(long)]
        policy: Option<PathBuf>,
    },
    /// Run the static code validator
    Validate {
        /// Source file, or `-` for stdin
        input: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Run code through the host controller with a scripted boundary
    ///
    /// Runs on a real clock: a sketch that never yields a frame is only
    /// stopped once its budget (5 s, or 15 s in graphics mode) has elapsed.
    /// Pass a policy with a smaller `budgets.script_timeout_ms` to shorten it.
    Simulate {
        /// Source file, or `-` for stdin
        input: PathBuf,
        #[arg(long, default_value = "p5js")]
        language: String,
        /// Draw calls an animated sketch attempts
        #[arg(long, default_value_t = 3)]
        frames: u64,
        #[arg(long)]
        policy: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Document the artifact protocol and error codes
    ProtocolHelp {
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Configure color output based on the color mode and environment.
fn configure_colors(mode: ColorMode) {
    let use_color = match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => {
            if std::env::var("NO_COLOR").is_ok() {
                false
            } else {
                supports_color::on(supports_color::Stream::Stderr).is_some()
            }
        }
    };

    miette::set_hook(Box::new(move |_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .color(use_color)
                .unicode(use_color)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("SKETCHBOX_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    configure_colors(cli.color);
    init_tracing(cli.verbose);
    match cli.command {
        Commands::Detect {
            input,
            language,
            policy,
            json,
        } => cmd_detect(&input, &language, policy.as_deref(), json),
        Commands::Build {
            input,
            language,
            output,
            policy,
        } => cmd_build(&input, &language, output.as_deref(), policy.as_deref()),
        Commands::Validate { input, json } => cmd_validate(&input, json),
        Commands::Simulate {
            input,
            language,
            frames,
            policy,
            json,
        } => cmd_simulate(&input, &language, frames, policy.as_deref(), json),
        Commands::ProtocolHelp { json } => cmd_protocol_help(json),
        Commands::Completions { shell } => cmd_completions(shell),
    }
}

// =============================================================================
// Commands
// =============================================================================

fn cmd_detect(input: &Path, language: &str, policy: Option<&Path>, json: bool) -> Result<()> {
    let (code, policy) = match load_inputs(input, policy) {
        Ok(loaded) => loaded,
        Err(err) => return emit_error(json, &err),
    };
    let mode = detect_mode(&code, &LanguageHint::parse(language));
    let config = (mode == ExecutionMode::Script)
        .then(|| execution_config(&code, &policy.budgets, &policy.library.graphics_marker));
    let shape = (mode == ExecutionMode::Script).then(|| snippet_shape(&code));

    if json {
        let payload = serde_json::json!({
            "mode": mode,
            "config": config,
            "shape": shape.map(|s| format!("{s:?}").to_lowercase()),
        });
        println!("{}", serde_json::to_string(&payload).into_diagnostic()?);
        return Ok(());
    }
    println!("mode: {mode}");
    if let Some(config) = config {
        println!("timeout_ms: {}", config.max_execution_time_ms);
        println!("max_frames: {}", config.max_frames);
        println!("graphics: {}", config.is_long_running_graphics_mode);
    }
    if let Some(shape) = shape {
        println!("shape: {}", format!("{shape:?}").to_lowercase());
    }
    Ok(())
}

fn cmd_build(
    input: &Path,
    language: &str,
    output: Option<&Path>,
    policy: Option<&Path>,
) -> Result<()> {
    let (code, policy) = match load_inputs(input, policy) {
        Ok(loaded) => loaded,
        Err(err) => return emit_error(false, &err),
    };
    let mode = detect_mode(&code, &LanguageHint::parse(language));
    if mode == ExecutionMode::Script && policy.validation == ValidationMode::Enforce {
        if let Err(err) = CodeValidator::new().sanitize(&code) {
            return emit_error(false, &err);
        }
    }
    let config = execution_config(&code, &policy.budgets, &policy.library.graphics_marker);
    let artifact = ArtifactBuilder::new(&policy).build(RunId::new(), mode, &code, config);

    match output {
        Some(path) => {
            if let Err(err) = std::fs::write(path, &artifact.html) {
                let err = SandboxError::io(format!("failed to write {}", path.display()), err);
                return emit_error(false, &err);
            }
            eprintln!("artifact written to: {}", path.display());
        }
        None => print!("{}", artifact.html),
    }
    Ok(())
}

fn cmd_validate(input: &Path, json: bool) -> Result<()> {
    let code = match read_code(input) {
        Ok(code) => code,
        Err(err) => return emit_error(json, &err),
    };
    let report = CodeValidator::new().validate(&code);
    if json {
        println!("{}", serde_json::to_string(&report).into_diagnostic()?);
    } else if report.valid {
        eprintln!("no issues found");
    } else {
        for issue in &report.issues {
            println!(" - {}: {}", issue.rule, issue.message);
        }
    }
    if !report.valid {
        let err = SandboxError::validation_failed("code validation failed", &report.messages());
        std::process::exit(exit_code_for_error(&err));
    }
    Ok(())
}

fn cmd_simulate(
    input: &Path,
    language: &str,
    frames: u64,
    policy: Option<&Path>,
    json: bool,
) -> Result<()> {
    let (code, policy) = match load_inputs(input, policy) {
        Ok(loaded) => loaded,
        Err(err) => return emit_error(json, &err),
    };
    let factory = ScriptedFactory::new(SketchScript::infer(&code, frames));
    let surface = RecordingSurface::new();
    let observer = CollectingObserver::new();
    let host = HostController::new(policy, Box::new(factory.clone()), Box::new(surface.clone()))
        .with_observer(Box::new(observer.clone()));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .into_diagnostic()?;
    let host = runtime.block_on(settle(host, &code, &LanguageHint::parse(language)));

    let run_id = factory.loaded().last().map(|record| record.run_id);
    let draw_calls = run_id.map_or(0, |id| factory.draw_calls(id));
    let events = observer.events();
    if json {
        let payload = serde_json::json!({
            "state": host.state(),
            "mode": host.current_mode(),
            "draw_calls": draw_calls,
            "panel": surface.showing(),
            "events": events,
        });
        println!("{}", serde_json::to_string(&payload).into_diagnostic()?);
        return Ok(());
    }
    for event in &events {
        println!("{}", describe(event));
    }
    println!("final state: {}", host.state());
    if let Some(panel) = surface.showing() {
        println!("panel: {}: {}", panel.title, panel.reason);
        println!("hint: {}", panel.hint);
    }
    Ok(())
}

/// Run `code` and keep ticking until the runaway guard is resolved one way
/// or the other.
async fn settle(mut host: HostController, code: &str, hint: &LanguageHint) -> HostController {
    host.run(code, hint);
    host.drain();
    while host.guard().is_some() {
        host.tick().await;
        host.drain();
    }
    debug!(state = %host.state(), "simulation settled");
    host
}

fn describe(event: &HostEvent) -> String {
    match event {
        HostEvent::StateChanged { from, to } => format!("state {from} -> {to}"),
        HostEvent::RunStarted { run_id, mode, .. } => format!("run {run_id} started ({mode})"),
        HostEvent::Blocked { issues } => format!("blocked: {}", issues.join("; ")),
        HostEvent::GuardArmed { budget_ms, .. } => format!("guard armed ({budget_ms} ms)"),
        HostEvent::GuardCancelled { .. } => "guard cancelled".to_string(),
        HostEvent::GuardFired { .. } => "guard fired".to_string(),
        HostEvent::Ready { drained, .. } => format!("ready ({drained} pending callbacks)"),
        HostEvent::Status { event, .. } => match event {
            StatusEvent::Error {
                message,
                line,
                context,
            } => {
                let kind = context.map_or("unknown", |kind| kind.as_str());
                match line {
                    Some(line) => format!("error [{kind}] line {line}: {message}"),
                    None => format!("error [{kind}]: {message}"),
                }
            }
            other => other.tag().to_string(),
        },
        HostEvent::Ignored { run_id } => format!("ignored message from stale run {run_id}"),
    }
}

fn cmd_protocol_help(json: bool) -> Result<()> {
    let help = protocol_help::generate_protocol_help();
    if json {
        let output = serde_json::to_string_pretty(&help).into_diagnostic()?;
        println!("{output}");
    } else {
        print_protocol_help_text(&help);
    }
    Ok(())
}

#[allow(clippy::unnecessary_wraps)] // Consistent with other command handlers
fn cmd_completions(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut io::stdout());
    Ok(())
}

// =============================================================================
// Helpers
// =============================================================================

fn read_code(input: &Path) -> Result<String, SandboxError> {
    if input == Path::new("-") {
        let mut code = String::new();
        io::stdin()
            .read_to_string(&mut code)
            .map_err(|err| SandboxError::io("failed to read stdin", err))?;
        return Ok(code);
    }
    std::fs::read_to_string(input)
        .map_err(|err| SandboxError::io(format!("failed to read {}", input.display()), err))
}

fn load_inputs(input: &Path, policy: Option<&Path>) -> Result<(String, SandboxPolicy), SandboxError> {
    let code = read_code(input)?;
    let policy = match policy {
        Some(path) => load_policy_file(path)?,
        None => SandboxPolicy::default(),
    };
    Ok((code, policy))
}

fn emit_error(json: bool, err: &SandboxError) -> Result<()> {
    if json {
        let payload = serde_json::json!({
            "code": err.code.as_str(),
            "message": err.message,
            "context": err.context,
        });
        println!("{}", serde_json::to_string(&payload).into_diagnostic()?);
    } else {
        eprintln!("error: {err}");
    }
    std::process::exit(exit_code_for_error(err));
}

fn exit_code_for_error(err: &SandboxError) -> i32 {
    err.exit_code()
}

fn print_protocol_help_text(help: &protocol_help::ProtocolHelp) {
    println!("sketchbox Protocol Help");
    println!("=======================");
    println!();
    println!("Protocol version: {}", help.protocol_version);
    println!("Policy version: {}", help.policy_version);
    println!();
    println!("ENVELOPE");
    println!("--------");
    for (field, text) in &help.envelope {
        println!("  {field}: {text}");
    }
    println!();
    println!("EVENTS");
    println!("------");
    for (tag, text) in &help.events {
        println!("  {tag}: {text}");
    }
    println!();
    println!("FAULT KINDS");
    println!("-----------");
    for (kind, text) in &help.fault_kinds {
        println!("  {kind}: {text}");
    }
    println!();
    println!("ERROR CODES");
    println!("-----------");
    for (code, info) in &help.error_codes {
        println!("  {code} (exit {}): {}", info.exit_code, info.description);
    }
    println!();
    println!("DEFAULT BUDGETS");
    println!("---------------");
    println!("  script timeout: {} ms", help.defaults.script_timeout_ms);
    println!("  graphics timeout: {} ms", help.defaults.graphics_timeout_ms);
    println!("  max frames: {}", help.defaults.max_frames);
    println!();
    println!("For full JSON documentation: sketchbox protocol-help --json");
}

#[cfg(test)]
mod tests {
    use super::{describe, exit_code_for_error};
    use sketchbox::error::SandboxError;
    use sketchbox::host::HostEvent;
    use sketchbox::model::{FaultKind, RunId, RunState, StatusEvent};

    #[test]
    fn exit_code_maps_validation_failure() {
        let err = SandboxError::validation_failed("blocked", &["eval".to_string()]);
        assert_eq!(exit_code_for_error(&err), 2);
    }

    #[test]
    fn exit_code_maps_policy_denied() {
        let err = SandboxError::policy_denied("denied", Option::<serde_json::Value>::None);
        assert_eq!(exit_code_for_error(&err), 4);
    }

    #[test]
    fn describe_formats_errors_with_line() {
        let event = HostEvent::Status {
            run_id: RunId::new(),
            event: StatusEvent::error("x is not defined", Some(3), FaultKind::Draw),
        };
        assert_eq!(describe(&event), "error [draw] line 3: x is not defined");
    }

    #[test]
    fn describe_formats_state_changes() {
        let event = HostEvent::StateChanged {
            from: RunState::Running,
            to: RunState::Loaded,
        };
        assert_eq!(describe(&event), "state running -> loaded");
    }
}
