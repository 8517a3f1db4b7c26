//! In-memory fakes for exercising orchestration without real subprocesses.
//!
//! [`RecordingRunner`] is a scripted [`CommandRunner`]: it records every
//! [`CommandSpec`] it receives and answers by matching the command line
//! against registered prefixes. Unmatched commands succeed with empty output.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use crate::command::{CommandOutput, CommandRunner, CommandSpec};
use crate::error::CommandError;

type Responder = Box<dyn Fn(&CommandSpec) -> Result<CommandOutput, CommandError> + Send + Sync>;

struct Rule {
    prefix: Vec<String>,
    once: bool,
    respond: Responder,
}

impl Rule {
    fn matches(&self, spec: &CommandSpec) -> bool {
        let line = std::iter::once(&spec.program).chain(spec.args.iter());
        self.prefix.len() <= spec.args.len() + 1
            && line.zip(self.prefix.iter()).all(|(a, b)| a == b)
    }
}

#[derive(Default)]
pub struct RecordingRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl std::fmt::Debug for RecordingRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingRunner")
            .field("calls", &self.command_lines())
            .finish()
    }
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every command starting with `prefix`. Later registrations win.
    pub fn on(&self, prefix: &[&str], output: CommandOutput) -> &Self {
        self.push(prefix, false, Box::new(move |_| Ok(output.clone())))
    }

    /// Answer the next matching command only. One-shot answers are consumed
    /// in registration order and take precedence over [`on`](Self::on).
    pub fn once(&self, prefix: &[&str], output: CommandOutput) -> &Self {
        self.push(prefix, true, Box::new(move |_| Ok(output.clone())))
    }

    /// Every matching command times out.
    pub fn time_out(&self, prefix: &[&str]) -> &Self {
        self.push(
            prefix,
            false,
            Box::new(|spec| {
                Err(CommandError::TimedOut {
                    command: spec.display(),
                    timeout: spec.timeout,
                })
            }),
        )
    }

    /// Answer with a closure, e.g. to touch the filesystem the way the real
    /// program would.
    pub fn on_with<F>(&self, prefix: &[&str], respond: F) -> &Self
    where
        F: Fn(&CommandSpec) -> Result<CommandOutput, CommandError> + Send + Sync + 'static,
    {
        self.push(prefix, false, Box::new(respond))
    }

    /// Make `cp ... <src> <dst>` perform a recursive copy in-process.
    pub fn simulate_copies(&self) -> &Self {
        self.on_with(&["cp"], |spec| {
            let n = spec.args.len();
            if n < 2 {
                return Ok(CommandOutput::failed(1, "cp: missing operand"));
            }
            match copy_tree(Path::new(&spec.args[n - 2]), Path::new(&spec.args[n - 1])) {
                Ok(()) => Ok(CommandOutput::ok("")),
                Err(e) => Ok(CommandOutput::failed(1, format!("cp: {e}"))),
            }
        })
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        lock(&self.calls).clone()
    }

    /// Recorded commands as display strings, in call order.
    pub fn command_lines(&self) -> Vec<String> {
        lock(&self.calls).iter().map(CommandSpec::display).collect()
    }

    /// How many recorded commands start with `prefix`.
    pub fn count(&self, prefix: &[&str]) -> usize {
        let probe = Rule {
            prefix: prefix.iter().map(|s| s.to_string()).collect(),
            once: false,
            respond: Box::new(|_| Ok(CommandOutput::default())),
        };
        lock(&self.calls).iter().filter(|c| probe.matches(c)).count()
    }

    fn push(&self, prefix: &[&str], once: bool, respond: Responder) -> &Self {
        lock(&self.rules).push(Rule {
            prefix: prefix.iter().map(|s| s.to_string()).collect(),
            once,
            respond,
        });
        self
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
        lock(&self.calls).push(spec.clone());

        let mut rules = lock(&self.rules);
        if let Some(idx) = rules.iter().position(|r| r.once && r.matches(spec)) {
            let rule = rules.remove(idx);
            drop(rules);
            return (rule.respond)(spec);
        }
        match rules.iter().rev().find(|r| !r.once && r.matches(spec)) {
            Some(rule) => (rule.respond)(spec),
            None => Ok(CommandOutput::ok("")),
        }
    }
}

/// A timeout suitable for specs built in tests.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Recursive directory copy used to stand in for `cp -a`.
pub fn copy_tree(src: &Path, dst: &Path) -> std::io::Result<()> {
    if src.is_file() {
        if let Some(parent) = dst.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(src, dst)?;
        return Ok(());
    }
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
