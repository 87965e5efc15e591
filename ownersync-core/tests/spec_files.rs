//! Spec file loading from disk: error messages, formats, and naming.

use assert_fs::prelude::*;
use ownersync_core::{
    spec::{load_group_spec, load_ownership_spec},
    IdentityRef, Naming, SpecError,
};
use predicates::prelude::predicate;
use rstest::rstest;

// ---------------------------------------------------------------------------
// 1. Load error messages
// ---------------------------------------------------------------------------

#[test]
fn missing_file_returns_not_found_with_path() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let path = dir.child("CODEGROUPS.json");
    path.assert(predicate::path::missing());

    let err = load_group_spec(path.path()).unwrap_err();
    assert!(matches!(err, SpecError::NotFound { .. }), "got: {err}");
    assert!(err.to_string().contains("CODEGROUPS.json"));
}

#[test]
fn corrupt_json_returns_parse_error_with_path() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("CODEOWNERS.json");
    file.write_str("{ \"functionalBlocks\": { broken").expect("write");

    let err = load_ownership_spec(file.path()).unwrap_err();
    assert!(matches!(err, SpecError::Parse { .. }), "got: {err}");
    let msg = err.to_string();
    assert!(msg.contains("CODEOWNERS.json"), "must contain file path, got: {msg}");
}

#[test]
fn corrupt_yaml_returns_yaml_parse_error() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("CODEGROUPS.yaml");
    file.write_str("groups: [unclosed").expect("write");

    let err = load_group_spec(file.path()).unwrap_err();
    assert!(matches!(err, SpecError::ParseYaml { .. }), "got: {err}");
}

// ---------------------------------------------------------------------------
// 2. Successful loads
// ---------------------------------------------------------------------------

#[test]
fn loads_codegroups_json() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("CODEGROUPS.json");
    file.write_str(
        r#"{ "groups": { "@@team-x": ["a@x.com", "b@x.com"], "@@db": ["@@team-x"] } }"#,
    )
    .expect("write");

    let spec = load_group_spec(file.path()).expect("load");
    assert_eq!(spec.len(), 2);

    let by_name = spec.by_display_name(&Naming::default()).expect("display names");
    assert!(by_name.contains_key("team-x-codeowners"));
    assert!(by_name["db-codeowners"].contains(&IdentityRef::from("@@team-x")));
}

#[test]
fn loads_codeowners_yaml() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("CODEOWNERS.yml");
    file.write_str(
        "functionalBlocks:\n  api:\n    owners: ['@@backend']\n\
         \x20   additionalApprovers: [lead@x.com]\nfilemap:\n  - /api/: api\n",
    )
    .expect("write");

    let spec = load_ownership_spec(file.path()).expect("load");
    assert!(spec.contains_path("/api/"));
    assert_eq!(spec.paths["/api/"].len(), 2);
}

// ---------------------------------------------------------------------------
// 3. Naming convention
// ---------------------------------------------------------------------------

#[rstest]
#[case("", "-codeowners", "@@team-x", "team-x-codeowners")]
#[case("Code Approvers ", "", "@@db", "Code Approvers db")]
#[case("ext-", "-owners", "web", "ext-web-owners")]
fn display_name_follows_convention(
    #[case] prefix: &str,
    #[case] suffix: &str,
    #[case] name: &str,
    #[case] expected: &str,
) {
    let naming = Naming::new(prefix, suffix);
    let display = naming.display_name(name);
    assert_eq!(display, expected);
    assert!(naming.is_managed(&display));
}
