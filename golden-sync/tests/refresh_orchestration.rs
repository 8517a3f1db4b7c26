mod common;

use common::{Harness, Script};
use golden_core::RepoAlias;
use golden_sync::{OrchestratorError, RefreshOutcome, RefreshScope};

fn alias(s: &str) -> RepoAlias {
    RepoAlias::from(s)
}

#[test]
fn forced_refresh_skips_change_probe_and_runs_pipeline_in_order() {
    let h = Harness::new(Script::default());
    h.register("my-repo", "https://example.com/my-repo.git", "main");

    let outcome = h.orchestrator.execute_refresh(&alias("my-repo"), true).unwrap();

    assert!(matches!(outcome, RefreshOutcome::Promoted { .. }));
    assert_eq!(
        h.calls(),
        vec!["update(force_reset=true)", "index", "snapshot", "promote"]
    );
    assert!(!h.lock_path("my-repo").exists(), "lock released after success");
}

#[test]
fn lock_is_released_when_a_later_step_fails() {
    let h = Harness::new(Script {
        snapshot_error: Some("cp: No space left on device".into()),
        ..Script::default()
    });
    h.register("my-repo", "https://example.com/my-repo.git", "main");

    let err = h.orchestrator.execute_refresh(&alias("my-repo"), true).unwrap_err();

    assert!(matches!(err, OrchestratorError::Snapshot(_)));
    assert_eq!(h.calls(), vec!["update(force_reset=true)", "index", "snapshot"]);
    assert!(!h.lock_path("my-repo").exists(), "lock released after failure");
    assert!(h.orchestrator.execute_refresh(&alias("my-repo"), true).is_err());
    assert!(!h.lock_path("my-repo").exists());
}

#[test]
fn git_failure_propagates_and_releases_lock() {
    let h = Harness::new(Script {
        has_changes: true,
        update_error: Some("fatal: Authentication failed".into()),
        ..Script::default()
    });
    h.register("my-repo", "https://example.com/my-repo.git", "main");

    let err = h.orchestrator.execute_refresh(&alias("my-repo"), false).unwrap_err();

    assert!(err.to_string().contains("fatal: Authentication failed"));
    assert_eq!(h.calls(), vec!["has_changes", "update(force_reset=false)"]);
    assert!(!h.lock_path("my-repo").exists());
}

#[test]
fn upstream_changes_trigger_normal_update() {
    let h = Harness::new(Script {
        has_changes: true,
        ..Script::default()
    });
    h.register("my-repo", "https://example.com/my-repo.git", "main");

    h.orchestrator.execute_refresh(&alias("my-repo"), false).unwrap();

    assert_eq!(
        h.calls(),
        vec!["has_changes", "update(force_reset=false)", "index", "snapshot", "promote"]
    );
}

#[test]
fn no_changes_with_intact_target_short_circuits() {
    let h = Harness::new(Script::default());
    h.register("my-repo", "https://example.com/my-repo.git", "main");

    // First refresh publishes because nothing has been promoted yet.
    let first = h.orchestrator.execute_refresh(&alias("my-repo"), false).unwrap();
    let RefreshOutcome::Promoted { snapshot } = first else {
        panic!("first refresh should promote, got {first:?}");
    };
    assert_eq!(h.calls(), vec!["has_changes", "index", "snapshot", "promote"]);

    h.calls.clear();
    let second = h.orchestrator.execute_refresh(&alias("my-repo"), false).unwrap();
    assert_eq!(second, RefreshOutcome::Unchanged { target: snapshot });
    assert_eq!(h.calls(), vec!["has_changes"]);
    assert!(!h.lock_path("my-repo").exists());
}

#[test]
fn no_changes_with_vanished_target_republishes() {
    let h = Harness::new(Script::default());
    h.register("my-repo", "https://example.com/my-repo.git", "main");
    let RefreshOutcome::Promoted { snapshot } =
        h.orchestrator.execute_refresh(&alias("my-repo"), false).unwrap()
    else {
        panic!("expected promotion");
    };
    std::fs::remove_dir_all(&snapshot).unwrap();

    h.calls.clear();
    let outcome = h.orchestrator.execute_refresh(&alias("my-repo"), false).unwrap();
    assert!(matches!(outcome, RefreshOutcome::Promoted { .. }));
    assert_eq!(h.calls(), vec!["has_changes", "index", "snapshot", "promote"]);
}

#[test]
fn held_lock_is_a_conflict_without_side_effects() {
    let h = Harness::new(Script::default());
    h.register("my-repo", "https://example.com/my-repo.git", "main");
    assert!(h.orchestrator.locks().acquire("my-repo", "someone-else", 3600).unwrap());

    let err = h.orchestrator.execute_refresh(&alias("my-repo"), true).unwrap_err();

    assert!(err.is_lock_conflict());
    assert!(err.to_string().contains("already being indexed or refreshed"));
    assert!(h.calls().is_empty());
    let holder = h.orchestrator.locks().get_lock_info("my-repo").unwrap().unwrap();
    assert_eq!(holder.owner, "someone-else", "foreign lock untouched");
}

#[test]
fn unknown_and_local_repos_are_rejected_before_locking() {
    let h = Harness::new(Script::default());
    h.register("scratch", "local://scratch", "main");

    let missing = h.orchestrator.execute_refresh(&alias("ghost"), false).unwrap_err();
    assert!(matches!(missing, OrchestratorError::RepoNotFound { .. }));

    let local = h.orchestrator.execute_refresh(&alias("scratch"), false).unwrap_err();
    assert!(matches!(local, OrchestratorError::LocalRepo { .. }));
    assert!(h.calls().is_empty());
}

#[test]
fn submit_without_job_submitter_runs_inline() {
    let h = Harness::new(Script::default());
    h.register("my-repo", "https://example.com/my-repo.git", "main");

    let job = h.orchestrator.submit_refresh(&alias("my-repo"), true).unwrap();

    assert_eq!(job, None);
    assert_eq!(
        h.calls(),
        vec!["update(force_reset=true)", "index", "snapshot", "promote"]
    );
}

#[test]
fn submitted_job_captures_force_reset_at_submission() {
    let h = Harness::with_jobs(Script {
        has_changes: true,
        ..Script::default()
    });
    h.register("my-repo", "https://example.com/my-repo.git", "main");

    let job_id = h.orchestrator.submit_refresh(&alias("my-repo"), true).unwrap();
    assert_eq!(job_id.as_deref(), Some("job-1"));
    assert!(h.calls().is_empty(), "nothing runs until the job does");

    let mut parked = h.jobs.take();
    assert_eq!(parked.len(), 1);
    let (name, job) = parked.remove(0);
    assert_eq!(name, "refresh:my-repo");
    let summary = job().unwrap();

    assert!(summary.starts_with("promoted "));
    assert_eq!(h.calls()[0], "update(force_reset=true)");
}

#[test]
fn submit_for_unknown_alias_fails_immediately() {
    let h = Harness::with_jobs(Script::default());
    let err = h.orchestrator.submit_refresh(&alias("ghost"), false).unwrap_err();
    assert!(err.is_validation());
    assert!(h.jobs.take().is_empty());
}

#[test]
fn pipeline_all_continues_past_failures_and_skips_local() {
    let h = Harness::new(Script::default());
    h.register("alpha", "https://example.com/alpha.git", "main");
    h.register("beta", "https://example.com/beta.git", "main");
    h.register("scratch", "local://scratch", "main");
    assert!(h.orchestrator.locks().acquire("alpha", "stuck", 3600).unwrap());

    let results = golden_sync::pipeline::run(&h.orchestrator, RefreshScope::All, true).unwrap();

    let aliases: Vec<&str> = results.iter().map(|r| r.alias.as_str()).collect();
    assert_eq!(aliases, vec!["alpha", "beta"]);
    assert!(results[0].outcome.as_ref().unwrap_err().is_lock_conflict());
    assert!(results[1].outcome.is_ok());
}

#[test]
fn pipeline_single_repo_returns_its_error() {
    let h = Harness::new(Script::default());
    let err = golden_sync::pipeline::run(
        &h.orchestrator,
        RefreshScope::Repo(alias("ghost")),
        false,
    )
    .unwrap_err();
    assert!(matches!(err, OrchestratorError::RepoNotFound { .. }));
}
