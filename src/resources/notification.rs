//! # Notifications: update-triggered actions on other resources.
//!
//! When a resource reports an update, each of its [`Notification`]s asks
//! another resource to run an action, either immediately (depth-first,
//! right after the notifying resource) or delayed (once, at the end of
//! the main pass).

use crate::resources::resource::{Action, ResourceId};

/// When a notification fires relative to the main pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Timing {
    /// Runs right after the notifying resource updates.
    Immediate,
    /// Queued and run once after the main pass completes.
    Delayed,
}

impl Timing {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timing::Immediate => "immediate",
            Timing::Delayed => "delayed",
        }
    }
}

/// A request that `target` run `action` when the declaring resource updates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    pub action: Action,
    pub target: ResourceId,
    pub timing: Timing,
}

impl Notification {
    pub fn new(action: Action, target: ResourceId, timing: Timing) -> Self {
        Self {
            action,
            target,
            timing,
        }
    }

    /// True when `other` would re-run the same action on the same target.
    /// Timing is ignored: a delayed duplicate of an immediate notification
    /// is still a duplicate.
    pub fn duplicates(&self, other: &Notification) -> bool {
        self.target == other.target && self.action == other.action
    }
}
