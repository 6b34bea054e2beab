pub mod validator;

use std::fs;
use std::path::Path;

use crate::error::{SandboxError, SandboxResult};
use crate::model::policy::{Budgets, CapabilityPolicy, LibraryPolicy, SandboxPolicy, POLICY_VERSION};

pub use validator::{CodeValidator, ValidationIssue, ValidationReport};

/// Load a policy from `.json`, `.yaml` or `.yml`. Other extensions are read
/// as JSON. The result is validated before it is returned.
pub fn load_policy_file(path: &Path) -> SandboxResult<SandboxPolicy> {
    let data = fs::read_to_string(path)
        .map_err(|err| SandboxError::io(format!("failed to read policy file {}", path.display()), err))?;
    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml" | "yml")
    );
    let policy: SandboxPolicy = if is_yaml {
        serde_yml::from_str(&data).map_err(|err| parse_error("yaml", path, err))?
    } else {
        serde_json::from_str(&data).map_err(|err| parse_error("json", path, err))?
    };
    validate_policy(&policy)?;
    Ok(policy)
}

fn parse_error(format: &str, path: &Path, err: impl std::fmt::Display) -> SandboxError {
    SandboxError::policy_invalid(
        format!("failed to parse {format} policy {}", path.display()),
        serde_json::json!({
            "source": err.to_string(),
            "fix": "Run 'sketchbox protocol-help --json' for the policy format",
        }),
    )
}

pub fn validate_policy_version(policy: &SandboxPolicy) -> SandboxResult<()> {
    if policy.policy_version != POLICY_VERSION {
        return Err(SandboxError::policy_invalid(
            format!(
                "unsupported policy_version {}, expected {}",
                policy.policy_version, POLICY_VERSION
            ),
            serde_json::json!({
                "received_version": policy.policy_version,
                "expected_version": POLICY_VERSION,
                "fix": format!("Set policy_version to {POLICY_VERSION}"),
            }),
        ));
    }
    Ok(())
}

pub fn validate_budgets(budgets: &Budgets) -> SandboxResult<()> {
    let fields = [
        ("script_timeout_ms", budgets.script_timeout_ms),
        ("graphics_timeout_ms", budgets.graphics_timeout_ms),
        ("max_frames", budgets.max_frames),
        ("max_memory_mb", budgets.max_memory_mb),
    ];
    if let Some((name, _)) = fields.iter().find(|(_, value)| *value == 0) {
        return Err(SandboxError::policy_invalid(
            format!("budget {name} must be greater than zero"),
            serde_json::json!({
                "field": name,
                "fix": format!("Remove {name} to use the default, or set a positive value"),
            }),
        ));
    }
    Ok(())
}

pub fn validate_library(library: &LibraryPolicy) -> SandboxResult<()> {
    let url = library.bootstrap_url.trim();
    if !url.starts_with("https://") {
        return Err(SandboxError::policy_invalid(
            "library bootstrap_url must be an https URL",
            serde_json::json!({
                "bootstrap_url": library.bootstrap_url,
                "fix": "Point bootstrap_url at an https CDN or self-hosted copy of the library",
            }),
        ));
    }
    if url.chars().any(|c| c.is_whitespace() || c == '"' || c == '<' || c == '>') {
        return Err(SandboxError::policy_invalid(
            "library bootstrap_url contains characters that are not allowed in a URL",
            serde_json::json!({ "bootstrap_url": library.bootstrap_url }),
        ));
    }
    if library.canvas_width == 0 || library.canvas_height == 0 {
        return Err(SandboxError::policy_invalid(
            "default canvas size must be non-zero",
            serde_json::json!({
                "canvas_width": library.canvas_width,
                "canvas_height": library.canvas_height,
            }),
        ));
    }
    Ok(())
}

pub fn validate_capabilities(caps: &CapabilityPolicy) -> SandboxResult<()> {
    if !caps.enable_network && !caps.allowed_domains.is_empty() {
        return Err(SandboxError::policy_denied(
            "allowed_domains is set but network access is disabled",
            serde_json::json!({
                "allowed_domains": caps.allowed_domains,
                "fix": "Set enable_network to true, or remove allowed_domains",
            }),
        ));
    }
    if caps.enable_network && caps.allowed_domains.is_empty() {
        return Err(SandboxError::policy_denied(
            "network access is enabled without any allowed domains",
            serde_json::json!({
                "fix": "List the origins sketches may reach in allowed_domains",
            }),
        ));
    }
    if let Some(bad) = caps
        .allowed_domains
        .iter()
        .find(|d| d.contains('*') || !d.starts_with("https://"))
    {
        return Err(SandboxError::policy_denied(
            format!("allowed domain {bad:?} must be an explicit https origin"),
            serde_json::json!({
                "domain": bad,
                "fix": "Use a full origin such as https://api.example.org; wildcards are not accepted",
            }),
        ));
    }
    Ok(())
}

pub fn validate_policy(policy: &SandboxPolicy) -> SandboxResult<()> {
    validate_policy_version(policy)?;
    validate_budgets(&policy.budgets)?;
    validate_library(&policy.library)?;
    validate_capabilities(&policy.capabilities)?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::model::policy::PolicyBuilder;

    #[test]
    fn default_policy_is_valid() {
        validate_policy(&SandboxPolicy::default()).unwrap();
    }

    #[test]
    fn zero_budget_names_the_field() {
        let policy = PolicyBuilder::new().max_frames(0).build();
        let err = validate_policy(&policy).unwrap_err();
        assert_eq!(err.code, ErrorCode::PolicyInvalid);
        assert!(err.message.contains("max_frames"));
    }

    #[test]
    fn plain_http_bootstrap_is_rejected() {
        let policy = PolicyBuilder::new()
            .bootstrap_url("http://cdn.example/p5.js")
            .build();
        assert_eq!(validate_policy(&policy).unwrap_err().code, ErrorCode::PolicyInvalid);
    }

    #[test]
    fn domains_without_network_are_denied() {
        let mut policy = SandboxPolicy::default();
        policy.capabilities.allowed_domains = vec!["https://api.example.org".to_string()];
        assert_eq!(validate_policy(&policy).unwrap_err().code, ErrorCode::PolicyDenied);
    }

    #[test]
    fn wildcard_domains_are_denied() {
        let policy = PolicyBuilder::new()
            .allow_domains(vec!["https://*.example.org".to_string()])
            .build();
        assert_eq!(validate_policy(&policy).unwrap_err().code, ErrorCode::PolicyDenied);
    }

    #[test]
    fn explicit_origins_are_accepted() {
        let policy = PolicyBuilder::new()
            .allow_domains(vec!["https://api.example.org".to_string()])
            .build();
        validate_policy(&policy).unwrap();
    }

    #[test]
    fn version_mismatch_has_fix_hint() {
        let policy = SandboxPolicy {
            policy_version: 99,
            ..SandboxPolicy::default()
        };
        let err = validate_policy(&policy).unwrap_err();
        assert!(err.context.unwrap()["fix"].as_str().unwrap().contains("policy_version"));
    }
}
