//! # Guard interpreters: strategies that evaluate guard tests.
//!
//! A [`GuardInterpreter`] turns a [`Guard`] into a [`GuardOutcome`].
//! The built-in [`ShellGuard`] runs command tests through `sh -c`;
//! [`ResourceGuard`] wraps it with options inherited from the declaring
//! resource's properties (`cwd`, `environment`, `timeout`).
//!
//! ## Rules
//! - Guard failures are **outcomes**, never errors: a command that cannot
//!   spawn, exits non-zero, or exceeds its timeout evaluates to `Fail`.
//! - A timed-out guard process is killed before the outcome is reported.
//! - [`first_blocking`] evaluates guards in declaration order and stops at
//!   the first one that blocks; remaining guards are not evaluated.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time;

use crate::guards::guard::{Guard, GuardOptions, GuardOutcome, GuardTest};

/// Strategy for evaluating guard tests.
#[async_trait]
pub trait GuardInterpreter: Send + Sync {
    /// Evaluates the guard's test, yielding pass or fail.
    async fn evaluate(&self, guard: &Guard) -> GuardOutcome;

    /// Interpreter name for logs.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Default interpreter: predicates run in-process, commands run via `sh -c`.
#[derive(Clone, Debug, Default)]
pub struct ShellGuard {
    default_timeout: Option<Duration>,
}

impl ShellGuard {
    /// Creates an interpreter with a fallback timeout for command guards
    /// that do not carry their own.
    pub fn new(default_timeout: Option<Duration>) -> Self {
        Self { default_timeout }
    }

    async fn run_command(&self, cmd: &str, opts: &GuardOptions) -> GuardOutcome {
        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(cmd)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if let Some(cwd) = &opts.cwd {
            command.current_dir(cwd);
        }
        for (key, value) in &opts.env {
            command.env(key, value);
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                log::warn!("guard command `{cmd}` failed to spawn: {err}");
                return GuardOutcome::Fail;
            }
        };

        let timeout = opts.timeout.or(self.default_timeout);
        let status = match timeout {
            Some(limit) => match time::timeout(limit, child.wait()).await {
                Ok(status) => status,
                Err(_) => {
                    log::warn!("guard command `{cmd}` timed out after {limit:?}");
                    let _ = child.kill().await;
                    return GuardOutcome::Fail;
                }
            },
            None => child.wait().await,
        };

        match status {
            Ok(status) if status.success() => GuardOutcome::Pass,
            Ok(_) => GuardOutcome::Fail,
            Err(err) => {
                log::warn!("guard command `{cmd}` could not be waited on: {err}");
                GuardOutcome::Fail
            }
        }
    }
}

#[async_trait]
impl GuardInterpreter for ShellGuard {
    async fn evaluate(&self, guard: &Guard) -> GuardOutcome {
        match &guard.test {
            GuardTest::Predicate(predicate) => {
                if predicate() {
                    GuardOutcome::Pass
                } else {
                    GuardOutcome::Fail
                }
            }
            GuardTest::Command(cmd) => self.run_command(cmd, &guard.opts).await,
        }
    }

    fn name(&self) -> &'static str {
        "shell"
    }
}

/// Interpreter that layers a resource's inherited execution options under
/// each guard's own options before delegating to [`ShellGuard`].
#[derive(Clone, Debug)]
pub struct ResourceGuard {
    inner: ShellGuard,
    base: GuardOptions,
}

impl ResourceGuard {
    /// Wraps `inner` with inherited base options.
    pub fn new(inner: ShellGuard, base: GuardOptions) -> Self {
        Self { inner, base }
    }
}

#[async_trait]
impl GuardInterpreter for ResourceGuard {
    async fn evaluate(&self, guard: &Guard) -> GuardOutcome {
        let merged = Guard {
            kind: guard.kind,
            test: guard.test.clone(),
            opts: guard.opts.merged_over(&self.base),
        };
        self.inner.evaluate(&merged).await
    }

    fn name(&self) -> &'static str {
        "resource"
    }
}

/// Evaluates `guards` in order and returns the first one that blocks, or
/// `None` when every guard permits the resource to run.
pub async fn first_blocking<'a>(
    guards: &'a [Guard],
    interpreter: &dyn GuardInterpreter,
) -> Option<&'a Guard> {
    for guard in guards {
        let outcome = interpreter.evaluate(guard).await;
        if guard.blocks(outcome) {
            return Some(guard);
        }
    }
    None
}
