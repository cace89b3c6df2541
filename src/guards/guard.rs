//! # Guard declarations: `only_if` / `not_if` preconditions.
//!
//! A [`Guard`] gates whether a resource's action runs. The test is either
//! a **predicate** (evaluated directly) or a **command string** (executed
//! by a [`GuardInterpreter`](crate::guards::GuardInterpreter) strategy).
//!
//! ## Skip semantics
//! - `only_if` blocks the resource when its test **fails**
//! - `not_if` blocks the resource when its test **passes**
//!
//! A blocked resource is skipped for the pass: no provider invocation,
//! `updated` stays false, no notifications fire.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Whether the guard requires its test to pass or to fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GuardKind {
    /// Run the resource only if the test passes.
    OnlyIf,
    /// Do not run the resource if the test passes.
    NotIf,
}

impl GuardKind {
    /// Returns the DSL-facing name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            GuardKind::OnlyIf => "only_if",
            GuardKind::NotIf => "not_if",
        }
    }
}

/// The test a guard evaluates.
#[derive(Clone)]
pub enum GuardTest {
    /// Shell command; zero exit status is a pass.
    Command(String),
    /// In-process predicate; its boolean result is the outcome.
    Predicate(Arc<dyn Fn() -> bool + Send + Sync>),
}

impl std::fmt::Debug for GuardTest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GuardTest::Command(cmd) => f.debug_tuple("Command").field(cmd).finish(),
            GuardTest::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// Execution options for command guards.
///
/// Unset fields fall back to the interpreter's inherited/base options.
#[derive(Clone, Debug, Default)]
pub struct GuardOptions {
    /// Working directory for the guard command.
    pub cwd: Option<PathBuf>,
    /// Extra environment entries (appended over inherited ones).
    pub env: Vec<(String, String)>,
    /// Per-guard timeout override.
    pub timeout: Option<Duration>,
}

impl GuardOptions {
    /// Overlays `self` on top of `base`: set fields win, env entries append
    /// after the base's (later entries take effect for duplicate keys).
    pub fn merged_over(&self, base: &GuardOptions) -> GuardOptions {
        let mut env = base.env.clone();
        env.extend(self.env.iter().cloned());
        GuardOptions {
            cwd: self.cwd.clone().or_else(|| base.cwd.clone()),
            env,
            timeout: self.timeout.or(base.timeout),
        }
    }
}

/// Result of evaluating a guard's test.
///
/// Guards never produce errors: a command that exits non-zero, fails to
/// spawn, or times out is simply a `Fail`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GuardOutcome {
    /// The test passed (predicate true / zero exit status).
    Pass,
    /// The test failed (predicate false, non-zero exit, spawn error, timeout).
    Fail,
}

/// One declared precondition on a resource.
#[derive(Clone, Debug)]
pub struct Guard {
    /// Pass/fail polarity.
    pub kind: GuardKind,
    /// The test to evaluate.
    pub test: GuardTest,
    /// Execution options for command tests.
    pub opts: GuardOptions,
}

impl Guard {
    /// `only_if` command guard.
    pub fn only_if_command(cmd: impl Into<String>) -> Self {
        Self {
            kind: GuardKind::OnlyIf,
            test: GuardTest::Command(cmd.into()),
            opts: GuardOptions::default(),
        }
    }

    /// `not_if` command guard.
    pub fn not_if_command(cmd: impl Into<String>) -> Self {
        Self {
            kind: GuardKind::NotIf,
            test: GuardTest::Command(cmd.into()),
            opts: GuardOptions::default(),
        }
    }

    /// `only_if` predicate guard.
    pub fn only_if<F>(predicate: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        Self {
            kind: GuardKind::OnlyIf,
            test: GuardTest::Predicate(Arc::new(predicate)),
            opts: GuardOptions::default(),
        }
    }

    /// `not_if` predicate guard.
    pub fn not_if<F>(predicate: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        Self {
            kind: GuardKind::NotIf,
            test: GuardTest::Predicate(Arc::new(predicate)),
            opts: GuardOptions::default(),
        }
    }

    /// Replaces the execution options.
    pub fn with_opts(mut self, opts: GuardOptions) -> Self {
        self.opts = opts;
        self
    }

    /// True when `outcome` means this guard blocks the resource.
    pub fn blocks(&self, outcome: GuardOutcome) -> bool {
        match self.kind {
            GuardKind::OnlyIf => outcome == GuardOutcome::Fail,
            GuardKind::NotIf => outcome == GuardOutcome::Pass,
        }
    }

    /// Human-readable description for skip events and logs.
    pub fn description(&self) -> String {
        match &self.test {
            GuardTest::Command(cmd) => format!("{}: `{cmd}`", self.kind.as_str()),
            GuardTest::Predicate(_) => format!("{}: <predicate>", self.kind.as_str()),
        }
    }
}
