use std::path::Path;
use std::sync::Arc;

use golden_sync::testing::{RecordingRunner, TEST_TIMEOUT};
use golden_sync::{CommandOutput, GitSyncError, GitSyncUpdater, RepoUpdater};
use rstest::rstest;

const REPO: &str = "/golden/my-repo";

fn updater(runner: &Arc<RecordingRunner>) -> GitSyncUpdater {
    GitSyncUpdater::new(REPO, runner.clone(), TEST_TIMEOUT)
}

fn with_branch(runner: &RecordingRunner, branch: &str) {
    runner.on(
        &["git", "rev-parse", "--abbrev-ref", "HEAD"],
        CommandOutput::ok(format!("{branch}\n")),
    );
}

#[test]
fn forced_update_fetches_and_resets_without_pulling() {
    let runner = Arc::new(RecordingRunner::new());
    with_branch(&runner, "develop");

    updater(&runner).update(true).unwrap();

    assert_eq!(
        runner.command_lines(),
        vec![
            "git status --porcelain",
            "git rev-parse --abbrev-ref HEAD",
            "git fetch origin",
            "git reset --hard origin/develop",
        ]
    );
    assert_eq!(runner.count(&["git", "pull"]), 0);
}

#[rstest]
#[case::non_zero_exit(Some(CommandOutput::failed(128, "fatal: not a git repository")))]
#[case::timeout(None)]
fn branch_detection_failure_falls_back_to_main(#[case] answer: Option<CommandOutput>) {
    let runner = Arc::new(RecordingRunner::new());
    let prefix = ["git", "rev-parse", "--abbrev-ref", "HEAD"];
    match answer {
        Some(output) => {
            runner.on(&prefix, output);
        }
        None => {
            runner.time_out(&prefix);
        }
    }

    updater(&runner).update(true).unwrap();

    assert_eq!(runner.count(&["git", "reset", "--hard", "origin/main"]), 1);
}

#[rstest]
#[case("hint: You have divergent branches and need to specify how to reconcile them.")]
#[case("fatal: Need to specify how to reconcile divergent branches.")]
fn divergent_pull_recovers_with_fetch_and_reset(#[case] stderr: &str) {
    let runner = Arc::new(RecordingRunner::new());
    with_branch(&runner, "release");
    runner.once(&["git", "pull"], CommandOutput::failed(128, stderr));

    updater(&runner).update(false).unwrap();

    assert_eq!(
        runner.command_lines(),
        vec![
            "git status --porcelain",
            "git pull",
            "git rev-parse --abbrev-ref HEAD",
            "git fetch origin",
            "git reset --hard origin/release",
        ]
    );
}

#[rstest]
#[case("fatal: Authentication failed for 'https://example.com/my-repo.git/'")]
#[case("fatal: unable to access 'https://example.com/': Could not resolve host: example.com")]
#[case("ERROR: Repository not found.")]
fn other_pull_failures_propagate_verbatim(#[case] stderr: &str) {
    let runner = Arc::new(RecordingRunner::new());
    runner.on(&["git", "pull"], CommandOutput::failed(1, stderr));

    let err = updater(&runner).update(false).unwrap_err();

    assert_eq!(err.stderr(), Some(stderr));
    assert!(err.to_string().contains(stderr));
    assert_eq!(runner.count(&["git", "fetch"]), 0);
    assert_eq!(runner.count(&["git", "reset"]), 0);
}

#[test]
fn pull_timeout_is_a_command_error() {
    let runner = Arc::new(RecordingRunner::new());
    runner.time_out(&["git", "pull"]);

    let err = updater(&runner).update(false).unwrap_err();

    assert!(matches!(err, GitSyncError::Command { .. }));
    assert_eq!(runner.count(&["git", "fetch"]), 0);
}

#[rstest]
#[case::normal(false)]
#[case::forced(true)]
fn dirty_tree_is_reset_to_head_first(#[case] force_reset: bool) {
    let runner = Arc::new(RecordingRunner::new());
    runner.on(&["git", "status", "--porcelain"], CommandOutput::ok(" M src/lib.rs\n?? scratch.txt\n"));

    updater(&runner).update(force_reset).unwrap();

    let lines = runner.command_lines();
    assert_eq!(lines[0], "git status --porcelain");
    assert_eq!(lines[1], "git reset --hard HEAD");
}

#[test]
fn failing_status_does_not_block_sync() {
    let runner = Arc::new(RecordingRunner::new());
    runner.on(&["git", "status"], CommandOutput::failed(128, "fatal: index file corrupt"));

    updater(&runner).update(false).unwrap();

    assert_eq!(runner.command_lines(), vec!["git status --porcelain", "git pull"]);
}

#[test]
fn forced_fetch_failure_stops_before_reset() {
    let runner = Arc::new(RecordingRunner::new());
    runner.on(&["git", "fetch"], CommandOutput::failed(128, "fatal: couldn't find remote ref"));

    let err = updater(&runner).update(true).unwrap_err();

    assert!(err.to_string().contains("couldn't find remote ref"));
    assert_eq!(runner.count(&["git", "reset", "--hard", "origin/main"]), 0);
}

#[test]
fn every_git_command_runs_in_the_master_clone() {
    let runner = Arc::new(RecordingRunner::new());
    updater(&runner).update(true).unwrap();
    assert!(runner
        .calls()
        .iter()
        .all(|c| c.cwd.as_deref() == Some(Path::new(REPO))));
}
