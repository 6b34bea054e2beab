// Test module - relaxed lint rules
#![allow(clippy::indexing_slicing)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(missing_docs)]

use std::fs;

use sketchbox::error::ErrorCode;
use sketchbox::model::policy::{PolicyBuilder, ValidationMode};
use sketchbox::policy::load_policy_file;
use sketchbox_fixtures::{temp_dir, write_policy};

#[test]
fn json_and_yaml_policies_load_identically() {
    let dir = temp_dir("policy-formats");
    let policy = PolicyBuilder::new()
        .script_timeout_ms(2_000)
        .max_frames(600)
        .validation(ValidationMode::Enforce)
        .build();

    let json = dir.join("policy.json");
    let yaml = dir.join("policy.yaml");
    write_policy(&json, &policy);
    write_policy(&yaml, &policy);

    assert_eq!(load_policy_file(&json).unwrap(), policy);
    assert_eq!(load_policy_file(&yaml).unwrap(), policy);
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn short_yaml_extension_is_accepted() {
    let dir = temp_dir("policy-yml");
    let path = dir.join("policy.yml");
    fs::write(&path, "budgets:\n  max_frames: 42\n").unwrap();

    let policy = load_policy_file(&path).unwrap();
    assert_eq!(policy.budgets.max_frames, 42);
    assert_eq!(policy.budgets.script_timeout_ms, 5_000);
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = temp_dir("policy-missing");
    let err = load_policy_file(&dir.join("nope.json")).unwrap_err();
    assert_eq!(err.code, ErrorCode::Io);
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn unknown_field_is_invalid_policy() {
    let dir = temp_dir("policy-unknown");
    let path = dir.join("policy.json");
    fs::write(&path, r#"{"budgets":{"max_fps":60}}"#).unwrap();

    let err = load_policy_file(&path).unwrap_err();
    assert_eq!(err.code, ErrorCode::PolicyInvalid);
    assert_eq!(err.exit_code(), 3);
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn loaded_policies_are_validated() {
    let dir = temp_dir("policy-denied");
    let path = dir.join("policy.json");
    fs::write(
        &path,
        r#"{"capabilities":{"allowed_domains":["https://api.example.org"]}}"#,
    )
    .unwrap();

    let err = load_policy_file(&path).unwrap_err();
    assert_eq!(err.code, ErrorCode::PolicyDenied);
    let _ = fs::remove_dir_all(&dir);
}
