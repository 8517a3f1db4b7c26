//! Runtime files, all under `<golden_repos_dir>/.run/`.

use std::path::{Path, PathBuf};

use golden_core::layout::RUN_DIR;

pub const DAEMON_SOCKET: &str = "daemon.sock";

pub fn run_dir(root: &Path) -> PathBuf {
    root.join(RUN_DIR)
}

pub fn socket_path(root: &Path) -> PathBuf {
    run_dir(root).join(DAEMON_SOCKET)
}
