//! Input classification: document vs. script, and the graphics heuristic.

use crate::model::policy::Budgets;
use crate::model::{ExecutionConfig, ExecutionMode, LanguageHint};

/// Classify `code` as a full page or a library snippet.
///
/// Sniffing wins over declaration: a snippet whose first non-blank character
/// is `<` is treated as a document whatever the hint says.
pub fn detect_mode(code: &str, hint: &LanguageHint) -> ExecutionMode {
    if hint.is_document() || code.trim_start().starts_with('<') {
        ExecutionMode::Document
    } else {
        ExecutionMode::Script
    }
}

/// Case-insensitive substring search for the graphics marker.
pub fn uses_graphics_mode(code: &str, marker: &str) -> bool {
    if marker.is_empty() {
        return false;
    }
    code.to_ascii_lowercase()
        .contains(&marker.to_ascii_lowercase())
}

/// Derive the per-run limits for a script-mode snippet.
pub fn execution_config(code: &str, budgets: &Budgets, marker: &str) -> ExecutionConfig {
    let graphics = uses_graphics_mode(code, marker);
    ExecutionConfig {
        max_execution_time_ms: if graphics {
            budgets.graphics_timeout_ms
        } else {
            budgets.script_timeout_ms
        },
        max_frames: budgets.max_frames,
        is_long_running_graphics_mode: graphics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::policy::DEFAULT_GRAPHICS_MARKER;

    fn p5() -> LanguageHint {
        LanguageHint::parse("p5js")
    }

    #[test]
    fn markup_prefix_wins_over_library_hint() {
        for code in ["<html></html>", "  \n<!DOCTYPE html>", "<div>", "<!-- c -->"] {
            assert_eq!(detect_mode(code, &p5()), ExecutionMode::Document, "{code}");
        }
    }

    #[test]
    fn document_hint_wins_over_script_body() {
        assert_eq!(
            detect_mode("ellipse(1, 2, 3, 4)", &LanguageHint::Document),
            ExecutionMode::Document
        );
    }

    #[test]
    fn plain_snippets_are_script_mode() {
        assert_eq!(detect_mode("ellipse(50,50,20,20)", &p5()), ExecutionMode::Script);
        assert_eq!(detect_mode("let a = 1 < 2;", &p5()), ExecutionMode::Script);
    }

    #[test]
    fn graphics_marker_extends_budget() {
        let budgets = Budgets::default();
        let cfg = execution_config(
            "function setup(){ createCanvas(400, 400, WEBGL); }",
            &budgets,
            DEFAULT_GRAPHICS_MARKER,
        );
        assert!(cfg.is_long_running_graphics_mode);
        assert_eq!(cfg.max_execution_time_ms, 15_000);

        let cfg = execution_config("// uses WebGl shaders", &budgets, DEFAULT_GRAPHICS_MARKER);
        assert_eq!(cfg.max_execution_time_ms, 15_000);
    }

    #[test]
    fn no_marker_keeps_script_budget() {
        let cfg = execution_config(
            "function draw(){ rect(0,0,5,5); }",
            &Budgets::default(),
            DEFAULT_GRAPHICS_MARKER,
        );
        assert!(!cfg.is_long_running_graphics_mode);
        assert_eq!(cfg.max_execution_time_ms, 5_000);
        assert_eq!(cfg.max_frames, 100_000);
    }

    #[test]
    fn empty_marker_never_matches() {
        assert!(!uses_graphics_mode("anything", ""));
    }
}
