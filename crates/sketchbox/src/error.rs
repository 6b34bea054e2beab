//! Error codes and the crate-wide error type.
//!
//! Errors here are configuration and tooling failures. Faults raised by the
//! sandboxed code itself never become a [`SandboxError`]; they travel over the
//! message channel as [`crate::model::StatusEvent::Error`].

use miette::Diagnostic;
use serde_json::Value;
use std::fmt;

pub type SandboxResult<T> = Result<T, SandboxError>;

/// Closed set of stable error codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Policy file is malformed or fails validation.
    PolicyInvalid,
    /// Policy forbids the requested configuration.
    PolicyDenied,
    /// Static code validation rejected the snippet.
    ValidationFailed,
    /// A channel message could not be decoded.
    Protocol,
    /// A channel message used an unsupported protocol version.
    ProtocolVersionMismatch,
    /// Filesystem or stream failure.
    Io,
    /// Bug or unexpected internal state.
    Internal,
}

impl ErrorCode {
    pub const ALL: [Self; 7] = [
        Self::PolicyInvalid,
        Self::PolicyDenied,
        Self::ValidationFailed,
        Self::Protocol,
        Self::ProtocolVersionMismatch,
        Self::Io,
        Self::Internal,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PolicyInvalid => "E_POLICY_INVALID",
            Self::PolicyDenied => "E_POLICY_DENIED",
            Self::ValidationFailed => "E_VALIDATION_FAILED",
            Self::Protocol => "E_PROTOCOL",
            Self::ProtocolVersionMismatch => "E_PROTOCOL_VERSION_MISMATCH",
            Self::Io => "E_IO",
            Self::Internal => "E_INTERNAL",
        }
    }

    pub fn parse(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == code)
    }

    /// Process exit code used by the CLI.
    pub fn exit_code(self) -> i32 {
        match self {
            Self::ValidationFailed => 2,
            Self::PolicyInvalid => 3,
            Self::PolicyDenied => 4,
            Self::Protocol => 5,
            Self::ProtocolVersionMismatch => 6,
            Self::Io => 7,
            Self::Internal => 1,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::PolicyInvalid => "Sandbox policy is malformed or fails validation.",
            Self::PolicyDenied => "Sandbox policy forbids the requested configuration.",
            Self::ValidationFailed => "Code validator found blocked patterns in the snippet.",
            Self::Protocol => "Artifact message could not be decoded.",
            Self::ProtocolVersionMismatch => "Artifact message used an unsupported protocol version.",
            Self::Io => "Reading or writing a file failed.",
            Self::Internal => "Unexpected internal error.",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error with a stable code, a human message and optional JSON context.
#[derive(Debug, Clone)]
pub struct SandboxError {
    pub code: ErrorCode,
    pub message: String,
    pub context: Option<Value>,
}

impl SandboxError {
    pub fn new(code: ErrorCode, message: impl Into<String>, context: impl Into<Option<Value>>) -> Self {
        Self {
            code,
            message: message.into(),
            context: context.into(),
        }
    }

    pub fn policy_invalid(message: impl Into<String>, context: impl Into<Option<Value>>) -> Self {
        Self::new(ErrorCode::PolicyInvalid, message, context)
    }

    pub fn policy_denied(message: impl Into<String>, context: impl Into<Option<Value>>) -> Self {
        Self::new(ErrorCode::PolicyDenied, message, context)
    }

    pub fn validation_failed(message: impl Into<String>, issues: &[String]) -> Self {
        Self::new(
            ErrorCode::ValidationFailed,
            message,
            serde_json::json!({ "issues": issues }),
        )
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Protocol, message, None)
    }

    pub fn io(message: impl Into<String>, err: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::Io,
            message,
            serde_json::json!({ "source": err.to_string() }),
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message, None)
    }

    pub fn exit_code(&self) -> i32 {
        self.code.exit_code()
    }
}

impl fmt::Display for SandboxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for SandboxError {}

impl Diagnostic for SandboxError {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new(self.code))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        let fix = self.context.as_ref()?.get("fix")?.as_str()?.to_string();
        Some(Box::new(fix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip_through_parse() {
        for code in ErrorCode::ALL {
            assert_eq!(ErrorCode::parse(code.as_str()), Some(code));
        }
        assert_eq!(ErrorCode::parse("E_NOPE"), None);
    }

    #[test]
    fn validation_failure_maps_to_exit_two() {
        let err = SandboxError::validation_failed("blocked", &["eval".to_string()]);
        assert_eq!(err.exit_code(), 2);
        assert_eq!(err.to_string(), "E_VALIDATION_FAILED: blocked");
    }

    #[test]
    fn help_comes_from_fix_context() {
        let err = SandboxError::policy_invalid(
            "bad budget",
            serde_json::json!({ "fix": "raise max_frames" }),
        );
        let help = Diagnostic::help(&err).map(|h| h.to_string());
        assert_eq!(help.as_deref(), Some("raise max_frames"));
    }
}
