use serde::{Deserialize, Serialize};
use std::fmt;

/// Shape of the code handed to `run`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// A complete page, loaded verbatim with no instrumentation and no guard.
    Document,
    /// A drawing-library snippet that needs a bootstrap and the shim.
    Script,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Document => f.write_str("document"),
            Self::Script => f.write_str("script"),
        }
    }
}

/// Language declared by the project configuration.
///
/// Projects persist either `"document"` (older records use `"html"`) or a
/// library identifier such as `"p5js"`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum LanguageHint {
    Document,
    Library(String),
}

impl LanguageHint {
    pub fn parse(hint: &str) -> Self {
        let trimmed = hint.trim();
        if trimmed.eq_ignore_ascii_case("document") || trimmed.eq_ignore_ascii_case("html") {
            Self::Document
        } else {
            Self::Library(trimmed.to_string())
        }
    }

    pub fn is_document(&self) -> bool {
        matches!(self, Self::Document)
    }
}

impl From<&str> for LanguageHint {
    fn from(hint: &str) -> Self {
        Self::parse(hint)
    }
}

impl fmt::Display for LanguageHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Document => f.write_str("document"),
            Self::Library(name) => f.write_str(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_is_an_alias_for_document() {
        assert!(LanguageHint::parse("HTML").is_document());
        assert!(LanguageHint::parse(" document ").is_document());
        assert_eq!(
            LanguageHint::parse("p5js"),
            LanguageHint::Library("p5js".to_string())
        );
    }
}
