//! Artifact synthesis for the isolation boundary.
//!
//! A script-mode artifact is one HTML document laid out as:
//!
//! 1. content security policy and the drawing-library bootstrap
//! 2. the instrumentation shim (see [`crate::shim`] for its semantics)
//! 3. the escaped user snippet, in its own script element
//! 4. auto-focus logic that runs after the `load` event
//!
//! Document-mode code bypasses all of this and is loaded verbatim.

mod shim;

use regex::Regex;
use std::fmt::Write as _;
use std::sync::OnceLock;

use crate::model::policy::{CapabilityPolicy, SandboxPolicy};
use crate::model::{ExecutionConfig, ExecutionMode, RunId};

/// Fully assembled document for one run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Artifact {
    pub run_id: RunId,
    pub mode: ExecutionMode,
    pub html: String,
    /// Limits baked into the shim. `None` for documents.
    pub config: Option<ExecutionConfig>,
    /// Document lines preceding the first snippet line. `None` for documents.
    pub snippet_line_offset: Option<usize>,
}

/// Whether a snippet binds the lifecycle hooks itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SnippetShape {
    /// Declares or assigns `setup` and/or `draw`.
    Sketch,
    /// Top-level drawing calls only; wrapped into a synthesized `setup`.
    Bare,
}

/// Declaration or assignment of one of `names` (a regex alternation).
/// Member access (`p.draw =`), longer identifiers (`redraw =`) and
/// comparisons (`draw ==`) do not count.
fn hook_regex(names: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(
        r"(?m)\bfunction\s+(?:{names})\s*\(|(?:^|[^.\w$])(?:window\.)?(?:{names})\s*=[^=]"
    ))
}

#[allow(clippy::expect_used)]
fn hook_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| hook_regex("setup|draw").expect("hook pattern is valid"))
}

#[allow(clippy::expect_used)]
fn draw_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| hook_regex("draw").expect("draw pattern is valid"))
}

#[allow(clippy::expect_used)]
fn script_close_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)</(script)").expect("script close pattern is valid")
    })
}

/// Whether the snippet binds a per-frame hook anywhere, including inside
/// another function.
pub fn binds_draw(code: &str) -> bool {
    draw_pattern().is_match(code)
}

pub fn snippet_shape(code: &str) -> SnippetShape {
    if hook_pattern().is_match(code) {
        SnippetShape::Sketch
    } else {
        SnippetShape::Bare
    }
}

/// Neutralize sequences that would end the enclosing script element early.
///
/// `</script` (any case) becomes `<\/script` and `<!--` becomes `<\!--`. Both
/// rewrites are no-ops for the JavaScript parser inside string and regex
/// literals, which is where they legitimately occur.
pub fn escape_snippet(code: &str) -> String {
    script_close_pattern()
        .replace_all(code, r"<\/$1")
        .replace("<!--", r"<\!--")
}

/// Minimal attribute escaping for values we interpolate into markup.
fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// `scheme://host[:port]` of a URL, or the URL itself when it has no path.
fn origin_of(url: &str) -> &str {
    let Some(scheme_end) = url.find("://") else {
        return url;
    };
    let after = scheme_end + 3;
    match url.get(after..).and_then(|rest| rest.find('/')) {
        Some(slash) => url.get(..after + slash).unwrap_or(url),
        None => url,
    }
}

fn content_security_policy(library_url: &str, caps: &CapabilityPolicy) -> String {
    let connect = if caps.enable_network && !caps.allowed_domains.is_empty() {
        caps.allowed_domains.join(" ")
    } else {
        "'none'".to_string()
    };
    format!(
        "default-src 'none'; script-src 'unsafe-inline' {}; style-src 'unsafe-inline'; \
         img-src data: blob:; font-src data:; media-src data: blob:; connect-src {connect}",
        origin_of(library_url)
    )
}

/// Builds artifacts according to a [`SandboxPolicy`].
#[derive(Clone, Debug)]
pub struct ArtifactBuilder<'a> {
    policy: &'a SandboxPolicy,
}

impl<'a> ArtifactBuilder<'a> {
    pub fn new(policy: &'a SandboxPolicy) -> Self {
        Self { policy }
    }

    /// Build the artifact for `code` in the given mode.
    pub fn build(
        &self,
        run_id: RunId,
        mode: ExecutionMode,
        code: &str,
        config: ExecutionConfig,
    ) -> Artifact {
        match mode {
            ExecutionMode::Document => Self::document(run_id, code),
            ExecutionMode::Script => self.script(run_id, code, config),
        }
    }

    /// Raw code, untouched.
    pub fn document(run_id: RunId, code: &str) -> Artifact {
        Artifact {
            run_id,
            mode: ExecutionMode::Document,
            html: code.to_string(),
            config: None,
            snippet_line_offset: None,
        }
    }

    /// Library bootstrap + shim + escaped snippet + focus logic.
    pub fn script(&self, run_id: RunId, code: &str, config: ExecutionConfig) -> Artifact {
        let library = &self.policy.library;
        let caps = &self.policy.capabilities;

        let mut head = String::new();
        head.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
        let _ = writeln!(
            head,
            "<meta http-equiv=\"Content-Security-Policy\" content=\"{}\">",
            escape_attr(&content_security_policy(&library.bootstrap_url, caps))
        );
        head.push_str(
            "<style>html,body{margin:0;padding:0;overflow:hidden;background:#fff}\
             canvas{display:block;outline:none}</style>\n",
        );
        let _ = writeln!(
            head,
            "<script src=\"{}\"></script>",
            escape_attr(&library.bootstrap_url)
        );
        head.push_str("<script>\n");
        head.push_str(shim::SHIM_JS);
        head.push_str("\n</script>\n</head>\n<body>\n<script>\n");

        let escaped = escape_snippet(code);
        let (preamble, body, postamble) = match snippet_shape(code) {
            SnippetShape::Sketch => (String::new(), escaped, String::new()),
            SnippetShape::Bare => (
                format!(
                    "function setup() {{ createCanvas({}, {});\n",
                    library.canvas_width, library.canvas_height
                ),
                escaped,
                "\n}".to_string(),
            ),
        };
        head.push_str(&preamble);

        // The config literal is a single line, so counting before substitution
        // gives the final offset.
        let line_offset = head.matches('\n').count();
        let config_json =
            shim::shim_config_json(run_id, config.max_frames, line_offset, caps.enable_storage);
        let mut html = head.replacen(shim::CONFIG_PLACEHOLDER, &config_json, 1);

        html.push_str(&body);
        html.push_str(&postamble);
        html.push_str("\n</script>\n<script>\n");
        html.push_str(shim::FOCUS_JS);
        html.push_str("\n</script>\n</body>\n</html>\n");

        Artifact {
            run_id,
            mode: ExecutionMode::Script,
            html,
            config: Some(config),
            snippet_line_offset: Some(line_offset),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(code: &str) -> Artifact {
        let policy = SandboxPolicy::default();
        ArtifactBuilder::new(&policy).script(RunId::new(), code, ExecutionConfig::default())
    }

    #[test]
    fn sections_appear_in_order() {
        let artifact = build("function setup(){ createCanvas(100,100); }");
        let html = &artifact.html;
        let bootstrap = html.find("p5.min.js").unwrap_or(usize::MAX);
        let shim = html.find("function wrapDraw").unwrap_or(usize::MAX);
        let snippet = html.find("createCanvas(100,100)").unwrap_or(usize::MAX);
        let focus = html.find("dispatchEvent(new MouseEvent").unwrap_or(usize::MAX);
        assert!(bootstrap < shim && shim < snippet && snippet < focus);
    }

    #[test]
    fn script_close_is_split_in_any_case() {
        let escaped = escape_snippet("let s = '</script><script>alert(1)</SCRIPT>';");
        assert!(!escaped.to_ascii_lowercase().contains("</script"));
        assert!(escaped.contains(r"<\/script><script>alert(1)<\/SCRIPT>"));
    }

    #[test]
    fn comment_open_is_split() {
        assert_eq!(escape_snippet("'<!--'"), r"'<\!--'");
    }

    #[test]
    fn snippet_cannot_close_shim_scope() {
        let artifact = build("function draw(){ text('</script>', 10, 10); }");
        // Head has the shim's own closer, then exactly the body's two closers.
        let closers = artifact.html.matches("</script>").count();
        let fixed = build("function draw(){}").html.matches("</script>").count();
        assert_eq!(closers, fixed);
    }

    #[test]
    fn bare_snippet_is_wrapped_into_setup() {
        let artifact = build("ellipse(50,50,20,20)");
        assert!(artifact
            .html
            .contains("function setup() { createCanvas(400, 400);\nellipse(50,50,20,20)\n}"));
    }

    #[test]
    fn hook_detection_covers_declarations_and_assignments() {
        assert_eq!(snippet_shape("function draw() {}"), SnippetShape::Sketch);
        assert_eq!(snippet_shape("window.setup = () => {}"), SnippetShape::Sketch);
        assert_eq!(snippet_shape("draw = function () {}"), SnippetShape::Sketch);
        assert_eq!(snippet_shape("if (draw == null) {}"), SnippetShape::Bare);
        assert_eq!(snippet_shape("p.draw = 1"), SnippetShape::Bare);
        assert_eq!(snippet_shape("rect(0, 0, 10, 10);"), SnippetShape::Bare);
    }

    #[test]
    fn draw_binding_ignores_lookalikes() {
        assert!(binds_draw("function setup() { window.draw = () => {}; }"));
        assert!(binds_draw("function draw() {}"));
        assert!(!binds_draw("redraw = true;"));
        assert!(!binds_draw("if (draw == null) {}"));
        assert!(!binds_draw("function setup() {}"));
    }

    #[test]
    fn config_literal_carries_run_and_limits() {
        let policy = SandboxPolicy::default();
        let run_id = RunId::new();
        let config = ExecutionConfig {
            max_frames: 42,
            ..ExecutionConfig::default()
        };
        let artifact = ArtifactBuilder::new(&policy).script(run_id, "function draw(){}", config);
        assert!(artifact.html.contains(&format!("\"runId\":\"{run_id}\"")));
        assert!(artifact.html.contains("\"maxFrames\":42"));
        assert!(!artifact.html.contains("__SKETCHBOX_CONFIG__"));
    }

    #[test]
    fn line_offset_points_at_first_snippet_line() {
        let artifact = build("function setup(){}\nfunction draw(){}");
        let offset = artifact.snippet_line_offset.unwrap_or(0);
        let first_line = artifact.html.lines().nth(offset);
        assert_eq!(first_line, Some("function setup(){}"));
    }

    #[test]
    fn network_stays_closed_without_capability() {
        let artifact = build("function draw(){}");
        assert!(artifact.html.contains("connect-src 'none'"));
        assert!(artifact.html.contains("script-src 'unsafe-inline' https://cdnjs.cloudflare.com;"));
    }

    #[test]
    fn documents_are_verbatim() {
        let code = "<html><body>Hi</body></html>";
        let artifact = ArtifactBuilder::document(RunId::new(), code);
        assert_eq!(artifact.html, code);
        assert_eq!(artifact.mode, ExecutionMode::Document);
        assert!(artifact.config.is_none());
    }
}
