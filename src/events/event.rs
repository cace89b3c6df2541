//! # Lifecycle events emitted by the convergence runner.
//!
//! The [`EventKind`] enum classifies event types across three categories:
//! - **Run events**: overall run flow (started, completed, failed)
//! - **Pass events**: the converge pass boundaries (started, completed)
//! - **Resource events**: per-resource outcomes (started, skipped,
//!   updated, failed, retrying) and notification queueing
//!
//! The [`Event`] struct carries optional metadata such as the resource
//! identity, action, attempt number, retry delay, and a human-readable
//! reason.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically, so dispatchers that buffer events can restore the exact
//! emission order.
//!
//! ## Example
//! ```rust
//! use nodevisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::ResourceFailed)
//!     .with_resource("service[nginx]")
//!     .with_action("restart")
//!     .with_attempt(3)
//!     .with_reason("exit 1");
//!
//! assert_eq!(ev.kind, EventKind::ResourceFailed);
//! assert_eq!(ev.resource.as_deref(), Some("service[nginx]"));
//! assert_eq!(ev.attempt, Some(3));
//! ```

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runner lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Run events ===
    /// A run began (node loaded, collection populated).
    ///
    /// Sets:
    /// - `reason`: node name
    /// - `at`, `seq`
    RunStarted,

    /// The run finished successfully, delayed notifications included.
    ///
    /// Sets:
    /// - `at`, `seq`
    RunCompleted,

    /// The run stopped at an unrecovered fatal error.
    ///
    /// Sets:
    /// - `reason`: failure label/message
    /// - `at`, `seq`
    RunFailed,

    // === Pass events ===
    /// The main converge pass is starting.
    ///
    /// Sets:
    /// - `at`, `seq`
    ConvergeStarted,

    /// Main pass and delayed notifications are done.
    ///
    /// Sets:
    /// - `at`, `seq`
    ConvergeCompleted,

    // === Resource events ===
    /// A resource action is about to be processed.
    ///
    /// Sets:
    /// - `resource`: `type[name]`
    /// - `action`: requested action
    /// - `at`, `seq`
    ResourceStarted,

    /// A guard held the resource back; no provider was invoked.
    ///
    /// Sets:
    /// - `resource`, `action`
    /// - `reason`: description of the blocking guard
    /// - `at`, `seq`
    ResourceSkipped,

    /// The provider reported a real (or would-be, in why-run) change.
    ///
    /// Sets:
    /// - `resource`, `action`
    /// - `attempt`: attempts used for this convergence
    /// - `at`, `seq`
    ResourceUpdated,

    /// An attempt failed and a retry is scheduled.
    ///
    /// Sets:
    /// - `resource`, `action`
    /// - `attempt`: the failed attempt number
    /// - `delay_ms`: sleep before the next attempt
    /// - `reason`: failure message
    /// - `at`, `seq`
    ResourceRetrying,

    /// The action failed with retries exhausted (fatal for the run unless
    /// the resource ignores failures).
    ///
    /// Sets:
    /// - `resource`, `action`
    /// - `attempt`: total attempts performed
    /// - `reason`: failure message
    /// - `at`, `seq`
    ResourceFailed,

    /// A delayed notification edge was queued (first registration only;
    /// duplicates are dropped silently).
    ///
    /// Sets:
    /// - `resource`: target `type[name]`
    /// - `action`: notified action
    /// - `reason`: notifying resource
    /// - `at`, `seq`
    NotificationQueued,
}

/// Lifecycle event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Resource identity (`type[name]`), if applicable.
    pub resource: Option<Arc<str>>,
    /// Action being converged, if applicable.
    pub action: Option<Arc<str>>,
    /// Attempt count (starting from 1).
    pub attempt: Option<u32>,
    /// Retry delay before the next attempt in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Human-readable reason (guard description, error message, etc.).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and
    /// next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            resource: None,
            action: None,
            attempt: None,
            delay_ms: None,
            reason: None,
        }
    }

    /// Attaches a resource identity.
    #[inline]
    pub fn with_resource(mut self, resource: impl Into<Arc<str>>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    /// Attaches an action name.
    #[inline]
    pub fn with_action(mut self, action: impl Into<Arc<str>>) -> Self {
        self.action = Some(action.into());
        self
    }

    /// Attaches an attempt count.
    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches a retry delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.delay_ms = Some(ms);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// True for the per-resource event kinds.
    #[inline]
    pub fn is_resource_event(&self) -> bool {
        matches!(
            self.kind,
            EventKind::ResourceStarted
                | EventKind::ResourceSkipped
                | EventKind::ResourceUpdated
                | EventKind::ResourceRetrying
                | EventKind::ResourceFailed
                | EventKind::NotificationQueued
        )
    }
}
