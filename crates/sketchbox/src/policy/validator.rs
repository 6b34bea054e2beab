//! Static scan of snippets for blocked APIs and obvious infinite loops.
//!
//! This is a coarse, text-level filter: it sees comments and string literals
//! as code and can be bypassed by anyone determined to. The isolation boundary
//! and the runaway guard stay the real containment; the validator exists to
//! give kids (and the assistant writing for them) an early, readable
//! explanation of why a sketch is not going to work.

use regex::{Regex, RegexBuilder};
use serde::Serialize;
use std::sync::OnceLock;

use crate::error::{SandboxError, SandboxResult};

struct Rule {
    id: &'static str,
    pattern: &'static str,
    /// Case-sensitive rules match constructor names that differ from keywords
    /// only by case (`Function` vs. `function`).
    case_sensitive: bool,
    message: &'static str,
}

const BLOCKED_RULES: &[Rule] = &[
    Rule { id: "eval", pattern: r"\beval\s*\(", case_sensitive: false, message: "string evaluation with eval()" },
    Rule { id: "function-constructor", pattern: r"\bFunction\s*\(", case_sensitive: true, message: "dynamic code via the Function constructor" },
    Rule { id: "string-timeout", pattern: r#"\bsetTimeout\s*\(\s*["'`]"#, case_sensitive: false, message: "setTimeout with a code string" },
    Rule { id: "string-interval", pattern: r#"\bsetInterval\s*\(\s*["'`]"#, case_sensitive: false, message: "setInterval with a code string" },
    Rule { id: "dynamic-import", pattern: r"\bimport\s*\(", case_sensitive: false, message: "dynamic import()" },
    Rule { id: "worker", pattern: r"\bnew\s+(?:Shared)?Worker\b", case_sensitive: false, message: "background workers" },
    Rule { id: "xhr", pattern: r"\bXMLHttpRequest\b", case_sensitive: false, message: "network access via XMLHttpRequest" },
    Rule { id: "fetch", pattern: r"\bfetch\s*\(", case_sensitive: false, message: "network access via fetch()" },
    Rule { id: "websocket", pattern: r"\bWebSocket\b", case_sensitive: false, message: "network access via WebSocket" },
    Rule { id: "local-storage", pattern: r"\blocalStorage\b", case_sensitive: false, message: "persistent storage via localStorage" },
    Rule { id: "session-storage", pattern: r"\bsessionStorage\b", case_sensitive: false, message: "storage via sessionStorage" },
    Rule { id: "indexed-db", pattern: r"\bindexedDB\b", case_sensitive: false, message: "storage via indexedDB" },
    Rule { id: "window-open", pattern: r"\bopen\s*\(", case_sensitive: false, message: "opening windows with open()" },
    Rule { id: "location", pattern: r"\blocation\.", case_sensitive: false, message: "navigation via location" },
    Rule { id: "cookie", pattern: r"\bdocument\.cookie\b", case_sensitive: false, message: "cookie access" },
    Rule { id: "document-write", pattern: r"\bdocument\.write", case_sensitive: false, message: "document.write()" },
    Rule { id: "parent-frame", pattern: r"\bparent\.", case_sensitive: false, message: "reaching the parent frame" },
    Rule { id: "top-frame", pattern: r"\btop\.", case_sensitive: false, message: "reaching the top frame" },
];

const LOOP_RULES: &[Rule] = &[
    Rule { id: "while-true", pattern: r"\bwhile\s*\(\s*true\s*\)", case_sensitive: false, message: "while (true)" },
    Rule { id: "while-one", pattern: r"\bwhile\s*\(\s*1\s*\)", case_sensitive: false, message: "while (1)" },
    Rule { id: "for-ever", pattern: r"\bfor\s*\(\s*;\s*;\s*\)", case_sensitive: false, message: "for (;;)" },
];

/// One finding.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    /// Stable rule identifier, e.g. `fetch` or `infinite-loop`.
    pub rule: &'static str,
    pub message: String,
}

/// Outcome of [`CodeValidator::validate`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    /// Issue messages, in rule order.
    pub fn messages(&self) -> Vec<String> {
        self.issues.iter().map(|i| i.message.clone()).collect()
    }
}

struct Compiled {
    blocked: Vec<(&'static Rule, Regex)>,
    loops: Vec<Regex>,
}

#[allow(clippy::expect_used)]
fn compile(rule: &Rule) -> Regex {
    RegexBuilder::new(rule.pattern)
        .case_insensitive(!rule.case_sensitive)
        .build()
        .expect("validator rule patterns are valid")
}

fn compiled() -> &'static Compiled {
    static COMPILED: OnceLock<Compiled> = OnceLock::new();
    COMPILED.get_or_init(|| Compiled {
        blocked: BLOCKED_RULES.iter().map(|r| (r, compile(r))).collect(),
        loops: LOOP_RULES.iter().map(compile).collect(),
    })
}

/// Pattern-based snippet validator.
#[derive(Clone, Copy, Debug, Default)]
pub struct CodeValidator;

impl CodeValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate(&self, code: &str) -> ValidationReport {
        let rules = compiled();
        let mut issues: Vec<ValidationIssue> = rules
            .blocked
            .iter()
            .filter(|(_, re)| re.is_match(code))
            .map(|(rule, _)| ValidationIssue {
                rule: rule.id,
                message: format!("Blocked pattern detected: {}", rule.message),
            })
            .collect();

        if rules.loops.iter().any(|re| re.is_match(code)) {
            issues.push(ValidationIssue {
                rule: "infinite-loop",
                message: "Potential infinite loop detected".to_string(),
            });
        }

        ValidationReport {
            valid: issues.is_empty(),
            issues,
        }
    }

    /// Return `code` unchanged when it validates cleanly.
    pub fn sanitize<'a>(&self, code: &'a str) -> SandboxResult<&'a str> {
        let report = self.validate(code);
        if report.valid {
            return Ok(code);
        }
        let messages = report.messages();
        Err(SandboxError::validation_failed(
            format!("code validation failed: {}", messages.join("; ")),
            &messages,
        ))
    }
}
