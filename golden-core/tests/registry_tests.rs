//! Registry error-message, atomic-write-safety, and listing integration tests.
//! Storage: <golden_repos_dir>/.registry/<alias>.yaml

use assert_fs::prelude::*;
use golden_core::{
    registry,
    types::{GoldenRepo, RepoAlias},
    MetadataError,
};
use predicates::prelude::predicate;
use rstest::rstest;
use std::fs;

fn alias() -> RepoAlias { RepoAlias::from("payments") }

// ---------------------------------------------------------------------------
// 1. Load error messages
// ---------------------------------------------------------------------------

#[test]
fn load_missing_repo_returns_not_found() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    let err = registry::load_repo_at(root.path(), &alias()).unwrap_err();
    assert!(matches!(err, MetadataError::RepoNotFound { .. }), "got: {err}");
    assert!(err.to_string().contains("payments"));
    assert!(err.to_string().contains("not registered"));
}

#[test]
fn load_corrupt_yaml_returns_parse_error_with_path() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    root.child(".registry/payments.yaml")
        .write_binary(b": : corrupt : yaml : !!!\n  - broken: [unclosed")
        .expect("write");

    let err = registry::load_repo_at(root.path(), &alias()).unwrap_err();
    assert!(matches!(err, MetadataError::Parse { .. }), "got: {err}");
    assert!(err.to_string().contains("payments.yaml"));
}

#[test]
fn one_corrupt_entry_fails_listing_with_its_path() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    registry::register_at(root.path(), "alpha".into(), "https://example.com/a.git", "main", None)
        .expect("register");
    root.child(".registry/broken.yaml")
        .write_str("- this is a list, not a mapping\n")
        .expect("write");

    let err = registry::list_repos_at(root.path()).unwrap_err();
    assert!(err.to_string().contains("broken.yaml"), "got: {err}");
}

// ---------------------------------------------------------------------------
// 2. Atomic write safety
// ---------------------------------------------------------------------------

#[test]
fn mid_write_crash_leaves_original_intact() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    let repo = registry::register_at(root.path(), alias(), "https://example.com/p.git", "main", None)
        .expect("register");

    let yaml_path = registry::repo_path_at(root.path(), &repo.alias);
    let original_bytes = fs::read(&yaml_path).expect("read original");

    // Simulate crash: .tmp written but process died before rename
    let tmp = yaml_path.with_file_name("payments.yaml.tmp");
    fs::write(&tmp, b"CRASH - INCOMPLETE WRITE").expect("write crash tmp");

    assert_eq!(original_bytes, fs::read(&yaml_path).expect("read after crash"));
    let listed = registry::list_repos_at(root.path()).expect("list ignores .tmp orphan");
    assert_eq!(listed.len(), 1);
}

#[test]
fn saved_entry_has_owner_only_permissions() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    registry::register_at(root.path(), alias(), "https://example.com/p.git", "main", None)
        .expect("register");

    root.child(".registry/payments.yaml").assert(predicate::path::exists());

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let path = registry::repo_path_at(root.path(), &alias());
        let mode = fs::metadata(&path).expect("meta").permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "expected 0600, got {mode:o}");
    }
}

// ---------------------------------------------------------------------------
// 3. Listing and registration
// ---------------------------------------------------------------------------

#[test]
fn list_is_sorted_and_deterministic() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    for name in ["zeta", "alpha", "mid-global"] {
        registry::register_at(root.path(), name.into(), "https://example.com/x.git", "main", None)
            .expect("register");
    }

    let aliases: Vec<String> = registry::list_repos_at(root.path())
        .expect("list")
        .into_iter()
        .map(|r| r.alias.0)
        .collect();
    assert_eq!(aliases, vec!["alpha", "mid-global", "zeta"]);
}

#[rstest]
#[case("local://scratch", true)]
#[case("local:///abs/path", true)]
#[case("https://github.com/org/repo.git", false)]
#[case("git@github.com:org/repo.git", false)]
#[case("file:///srv/git/repo.git", false)]
fn registered_repo_reports_local_scheme(#[case] url: &str, #[case] local: bool) {
    let root = assert_fs::TempDir::new().expect("tempdir");
    let repo: GoldenRepo =
        registry::register_at(root.path(), alias(), url, "main", None).expect("register");
    assert_eq!(repo.is_local(), local);
    let loaded = registry::load_repo_at(root.path(), &alias()).expect("load");
    assert_eq!(loaded.repo_url, url);
}

#[test]
fn explicit_clone_path_is_preserved() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    let elsewhere = root.path().join("mirrors").join("payments");
    let repo = registry::register_at(
        root.path(),
        alias(),
        "https://example.com/p.git",
        "main",
        Some(elsewhere.clone()),
    )
    .expect("register");
    assert_eq!(repo.clone_path, elsewhere);
}

#[rstest]
#[case::global_after_base("payments", "payments-global")]
#[case::base_after_global("payments-global", "payments")]
fn aliases_sharing_a_base_name_are_rejected(#[case] first: &str, #[case] second: &str) {
    let root = assert_fs::TempDir::new().expect("tempdir");
    registry::register_at(root.path(), first.into(), "https://example.com/p.git", "main", None)
        .expect("register first");

    let err = registry::register_at(root.path(), second.into(), "https://example.com/p.git", "main", None)
        .unwrap_err();
    assert!(matches!(err, MetadataError::BaseNameConflict { .. }), "got: {err}");
    assert!(err.to_string().contains(first));
    root.child(format!(".registry/{second}.yaml"))
        .assert(predicate::path::missing());
}

#[test]
fn explicit_clone_path_owned_by_another_alias_is_rejected() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    let shared = root.path().join("mirrors").join("shared");
    registry::register_at(root.path(), "billing".into(), "u", "main", Some(shared.clone()))
        .expect("register");

    let err = registry::register_at(root.path(), "ledger".into(), "u", "main", Some(shared))
        .unwrap_err();
    assert!(matches!(err, MetadataError::BaseNameConflict { ref existing, .. } if existing == "billing"));
}
