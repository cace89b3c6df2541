//! # Global run configuration.
//!
//! Provides [`RunConfig`], the plain configuration object the CLI (or any
//! embedding caller) hands to the runner.
//!
//! The config is used in two ways:
//! 1. **Run behavior**: why-run mode, guard command timeout.
//! 2. **Resource defaults**: `Resource::with_defaults(&config)` inherits
//!    the retry policy.
//!
//! ## Sentinel values
//! - `guard_timeout = 0s` → guards run without a timeout
//! - `default_retries = 0` → failed actions are not retried

use std::time::Duration;

/// Global configuration for a convergence run.
///
/// ## Field semantics
/// - `why_run`: when true, providers report would-be changes without
///   mutating the system; `updated` flags still reflect the would-be state.
/// - `default_retries`: retry count inherited by resources built with
///   [`Resource::with_defaults`](crate::Resource::with_defaults).
/// - `default_retry_delay`: sleep between retry attempts.
/// - `guard_timeout`: bound on guard command execution (`0s` = unbounded).
#[derive(Clone, Debug)]
pub struct RunConfig {
    /// Compute and report would-be changes without performing them.
    pub why_run: bool,

    /// Default number of retries after a failed action (`0` = fail fast).
    pub default_retries: u32,

    /// Default delay between retry attempts.
    pub default_retry_delay: Duration,

    /// Timeout applied to guard command execution.
    ///
    /// A guard that exceeds this is treated as failed, never as a run error.
    pub guard_timeout: Duration,
}

impl RunConfig {
    /// Returns the guard timeout as an `Option`.
    ///
    /// - `None` → no timeout
    /// - `Some(d)` → guard commands are killed after `d`
    #[inline]
    pub fn guard_timeout(&self) -> Option<Duration> {
        if self.guard_timeout == Duration::ZERO {
            None
        } else {
            Some(self.guard_timeout)
        }
    }
}

impl Default for RunConfig {
    /// Default configuration:
    ///
    /// - `why_run = false`
    /// - `default_retries = 0` (fail fast)
    /// - `default_retry_delay = 2s`
    /// - `guard_timeout = 30s`
    fn default() -> Self {
        Self {
            why_run: false,
            default_retries: 0,
            default_retry_delay: Duration::from_secs(2),
            guard_timeout: Duration::from_secs(30),
        }
    }
}
