//! # Resource: a declared unit of desired state.
//!
//! A [`Resource`] pairs an identity (`type[name]`) with a property bag,
//! a requested [`Action`], guards, notifications, and failure policy.
//! Resources declare *what* should be true; a
//! [`Provider`](crate::providers::Provider) decides *how* to make it so.
//!
//! ## Rules
//! - `updated` starts false and flips to true only when a provider
//!   reports a real change; it never resets within a run.
//! - `action: nothing` resources run no provider work on the main pass
//!   and only act when notified.
//! - Retry/ignore-failure policy lives on the resource, not the provider.

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::config::RunConfig;
use crate::guards::{Guard, GuardInterpreter};
use crate::resources::notification::Notification;

/// Named action a resource can be converged with (`create`, `delete`, ...).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Action(Arc<str>);

impl Action {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    /// The no-op action: the resource does nothing unless notified.
    pub fn nothing() -> Self {
        Self::new("nothing")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for the no-op action.
    pub fn is_nothing(&self) -> bool {
        &*self.0 == "nothing"
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Action {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Identity of a resource within a run: resource type plus instance name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ResourceId {
    rtype: Arc<str>,
    name: Arc<str>,
}

impl ResourceId {
    pub fn new(rtype: impl AsRef<str>, name: impl AsRef<str>) -> Self {
        Self {
            rtype: Arc::from(rtype.as_ref()),
            name: Arc::from(name.as_ref()),
        }
    }

    pub fn rtype(&self) -> &str {
        &self.rtype
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.rtype, self.name)
    }
}

/// A declared unit of desired state.
#[derive(Clone)]
pub struct Resource {
    id: ResourceId,
    /// Requested action for the main convergence pass.
    action: Action,
    /// Action used when a notification names no explicit one.
    default_action: Action,
    /// Free-form typed properties the provider reads.
    properties: Map<String, Value>,
    /// Preconditions evaluated before the provider runs.
    guards: Vec<Guard>,
    /// Per-resource interpreter override for guard evaluation.
    interpreter: Option<Arc<dyn GuardInterpreter>>,
    /// Notifications emitted when this resource reports an update.
    notifications: Vec<Notification>,
    /// Extra attempts after the first failure.
    retries: u32,
    /// Pause between attempts.
    retry_delay: std::time::Duration,
    /// When true, action failure is logged and the run continues.
    ignore_failure: bool,
    /// Set once a provider reports a real change during this run.
    updated: bool,
    /// Attempts consumed by the most recent action.
    attempts: u32,
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("id", &self.id)
            .field("action", &self.action)
            .field("guards", &self.guards.len())
            .field("notifications", &self.notifications)
            .field("retries", &self.retries)
            .field("ignore_failure", &self.ignore_failure)
            .field("updated", &self.updated)
            .finish()
    }
}

impl Resource {
    /// Creates a resource with the given identity and requested action,
    /// using failure-policy defaults from `RunConfig::default()`.
    pub fn new(rtype: impl AsRef<str>, name: impl AsRef<str>, action: Action) -> Self {
        let defaults = RunConfig::default();
        Self {
            id: ResourceId::new(rtype, name),
            default_action: action.clone(),
            action,
            properties: Map::new(),
            guards: Vec::new(),
            interpreter: None,
            notifications: Vec::new(),
            retries: defaults.default_retries,
            retry_delay: defaults.default_retry_delay,
            ignore_failure: false,
            updated: false,
            attempts: 0,
        }
    }

    /// Sets one property.
    pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    /// Appends a guard. Declaration order is evaluation order.
    pub fn with_guard(mut self, guard: Guard) -> Self {
        self.guards.push(guard);
        self
    }

    /// Overrides the guard interpreter for this resource.
    pub fn with_interpreter(mut self, interpreter: Arc<dyn GuardInterpreter>) -> Self {
        self.interpreter = Some(interpreter);
        self
    }

    /// Sets the action used when a notification names no explicit one.
    pub fn with_default_action(mut self, action: Action) -> Self {
        self.default_action = action;
        self
    }

    /// Appends a notification.
    pub fn with_notification(mut self, notification: Notification) -> Self {
        self.notifications.push(notification);
        self
    }

    /// Adds a notification edge unless an equivalent `(target, action)`
    /// edge is already declared. Returns whether the edge was added.
    pub fn add_notification(&mut self, notification: Notification) -> bool {
        if self.notifications.iter().any(|n| n.duplicates(&notification)) {
            return false;
        }
        self.notifications.push(notification);
        true
    }

    /// Sets extra attempts after the first failure.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Sets the pause between attempts.
    pub fn with_retry_delay(mut self, delay: std::time::Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Marks action failures as non-fatal for the run.
    pub fn with_ignore_failure(mut self, ignore: bool) -> Self {
        self.ignore_failure = ignore;
        self
    }

    /// Re-seeds the failure policy from a run configuration. Only values
    /// still at their construction defaults are replaced.
    pub fn with_defaults(mut self, config: &RunConfig) -> Self {
        let built_in = RunConfig::default();
        if self.retries == built_in.default_retries {
            self.retries = config.default_retries;
        }
        if self.retry_delay == built_in.default_retry_delay {
            self.retry_delay = config.default_retry_delay;
        }
        self
    }

    pub fn id(&self) -> &ResourceId {
        &self.id
    }

    pub fn action(&self) -> &Action {
        &self.action
    }

    pub fn default_action(&self) -> &Action {
        &self.default_action
    }

    pub fn properties(&self) -> &Map<String, Value> {
        &self.properties
    }

    /// Typed property read.
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    pub fn guards(&self) -> &[Guard] {
        &self.guards
    }

    pub fn interpreter(&self) -> Option<&Arc<dyn GuardInterpreter>> {
        self.interpreter.as_ref()
    }

    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn retry_delay(&self) -> std::time::Duration {
        self.retry_delay
    }

    pub fn ignore_failure(&self) -> bool {
        self.ignore_failure
    }

    pub fn updated(&self) -> bool {
        self.updated
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Records an update. Monotonic within a run: once true, stays true.
    pub fn mark_updated(&mut self) {
        self.updated = true;
    }

    /// Records how many attempts the last action consumed.
    pub(crate) fn record_attempts(&mut self, attempts: u32) {
        self.attempts = attempts;
    }
}
