//! File helpers for tests that load policies from disk.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use sketchbox::model::policy::SandboxPolicy;

/// Create a unique temporary directory for a test.
///
/// # Panics
///
/// Panics if the directory cannot be created.
#[must_use]
pub fn temp_dir(prefix: &str) -> PathBuf {
    let mut dir = std::env::temp_dir();
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    dir.push(format!("sketchbox-{prefix}-{}-{stamp}", std::process::id()));
    #[allow(clippy::expect_used)]
    fs::create_dir_all(&dir).expect("failed to create temp directory");
    dir
}

/// Write `policy` to `path`, as YAML when the extension is `.yaml` or `.yml`
/// and as pretty JSON otherwise. Mirrors the format choice of
/// [`sketchbox::policy::load_policy_file`].
///
/// # Panics
///
/// Panics if serialization or file writing fails.
#[allow(clippy::expect_used)]
pub fn write_policy(path: &Path, policy: &SandboxPolicy) {
    let yaml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));
    let data = if yaml {
        serde_yml::to_string(policy).expect("failed to serialize policy")
    } else {
        serde_json::to_string_pretty(policy).expect("failed to serialize policy")
    };
    fs::write(path, data).expect("failed to write policy file");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn temp_dir_creates_unique_directories() {
        let dir1 = temp_dir("test1");
        let dir2 = temp_dir("test2");

        assert!(dir1.exists());
        assert!(dir2.exists());
        assert_ne!(dir1, dir2);

        let _ = fs::remove_dir_all(&dir1);
        let _ = fs::remove_dir_all(&dir2);
    }

    #[test]
    fn yaml_extension_selects_yaml() {
        let dir = temp_dir("write-yaml");
        let path = dir.join("policy.yml");
        write_policy(&path, &SandboxPolicy::default());
        let data = fs::read_to_string(&path).unwrap();
        assert!(data.contains("policy_version: 1"));
        assert!(!data.trim_start().starts_with('{'));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn written_policy_reads_back() {
        let dir = temp_dir("write-policy");
        let path = dir.join("policy.json");
        write_policy(&path, &SandboxPolicy::default());
        let data = fs::read_to_string(&path).unwrap();
        let back: SandboxPolicy = serde_json::from_str(&data).unwrap();
        assert_eq!(back, SandboxPolicy::default());
        let _ = fs::remove_dir_all(&dir);
    }
}
