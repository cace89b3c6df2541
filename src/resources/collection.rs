//! # ResourceCollection: ordered resources with identity lookup.
//!
//! Keeps resources in declaration order (the order the main pass runs
//! them) while indexing them by [`ResourceId`] for notification lookup.
//!
//! ## Rules
//! - Declaring a resource with an id already present replaces the
//!   earlier declaration in place, keeping its original position.
//! - Mutation during the run goes through the collection (by index), so
//!   update/attempt bookkeeping lands on the canonical resource.

use std::collections::HashMap;

use crate::error::ConvergeError;
use crate::resources::notification::{Notification, Timing};
use crate::resources::resource::{Action, Resource, ResourceId};

/// Ordered, id-indexed set of declared resources.
#[derive(Debug, Default)]
pub struct ResourceCollection {
    resources: Vec<Resource>,
    by_id: HashMap<ResourceId, usize>,
}

impl ResourceCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a resource, replacing any earlier declaration with the same id.
    /// Returns the resource's position in run order.
    pub fn insert(&mut self, resource: Resource) -> usize {
        match self.by_id.get(resource.id()) {
            Some(&idx) => {
                self.resources[idx] = resource;
                idx
            }
            None => {
                let idx = self.resources.len();
                self.by_id.insert(resource.id().clone(), idx);
                self.resources.push(resource);
                idx
            }
        }
    }

    /// Position of `id` in run order, if declared.
    pub fn position(&self, id: &ResourceId) -> Option<usize> {
        self.by_id.get(id).copied()
    }

    pub fn lookup(&self, id: &ResourceId) -> Option<&Resource> {
        self.position(id).map(|idx| &self.resources[idx])
    }

    pub fn get(&self, idx: usize) -> Option<&Resource> {
        self.resources.get(idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.resources.iter()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Registers the inverse notification edge: `listener` asks `source`
    /// to notify it with `action` when `source` updates.
    ///
    /// Returns whether a new edge was added (duplicates are dropped).
    /// An unknown `source` is an error; the listener is not checked here
    /// since it may be declared later.
    pub fn subscribe(
        &mut self,
        listener: &ResourceId,
        source: &ResourceId,
        action: Action,
        timing: Timing,
    ) -> Result<bool, ConvergeError> {
        let idx = self
            .position(source)
            .ok_or_else(|| ConvergeError::UnknownNotificationTarget {
                target: source.to_string(),
            })?;
        Ok(self.resources[idx].add_notification(Notification::new(
            action,
            listener.clone(),
            timing,
        )))
    }

    /// Marks the resource at `idx` as updated.
    pub fn mark_updated(&mut self, idx: usize) {
        if let Some(resource) = self.resources.get_mut(idx) {
            resource.mark_updated();
        }
    }

    /// Records attempt bookkeeping on the resource at `idx`.
    pub(crate) fn record_attempts(&mut self, idx: usize, attempts: u32) {
        if let Some(resource) = self.resources.get_mut(idx) {
            resource.record_attempts(attempts);
        }
    }
}
