//! # RunContext: shared state for one convergence run.
//!
//! The context bundles everything a run needs: the node, the resource
//! collection, the provider registry, platform descriptor, run
//! configuration, event dispatchers, optional data-source and
//! persistence collaborators, and the cancellation token.
//!
//! It also carries the delayed-notification queue. Queueing dedupes on
//! the `(target, action)` pair so a target is notified at most once per
//! pair regardless of how many resources requested it, and the first
//! registration decides the order.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::RunConfig;
use crate::error::SourceError;
use crate::events::{Dispatch, DispatcherSet, Event, EventKind};
use crate::node::{Node, Persist};
use crate::providers::{Platform, ProviderRegistry};
use crate::resources::{Action, Notification, Resource, ResourceCollection, ResourceId};

/// Read-only access to an external data source (search index, data bags).
#[async_trait]
pub trait DataFetch: Send + Sync {
    /// Runs `query` against the data source.
    async fn fetch(&self, query: &str) -> Result<Value, SourceError>;
}

/// Shared state for a single convergence run.
pub struct RunContext {
    pub node: Node,
    pub collection: ResourceCollection,
    pub registry: Arc<ProviderRegistry>,
    pub platform: Platform,
    pub config: RunConfig,
    dispatcher: DispatcherSet,
    data_fetch: Option<Arc<dyn DataFetch>>,
    persist: Option<Arc<dyn Persist>>,
    cancel: CancellationToken,
    delayed: Vec<Notification>,
    seen_delayed: HashSet<(ResourceId, Action)>,
    ignored_failures: Vec<ResourceId>,
}

impl RunContext {
    /// Starts building a run context for `node`.
    pub fn builder(node: Node) -> RunContextBuilder {
        RunContextBuilder {
            node,
            resources: Vec::new(),
            registry: None,
            platform: Platform::new("unknown", "unknown", "0"),
            config: RunConfig::default(),
            sinks: Vec::new(),
            data_fetch: None,
            persist: None,
            cancel: None,
        }
    }

    /// Fan-outs an event to every registered dispatcher.
    pub fn publish(&self, event: Event) {
        self.dispatcher.notify(&event);
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn persist_hook(&self) -> Option<Arc<dyn Persist>> {
        self.persist.clone()
    }

    /// Runs `query` against the configured data source.
    pub async fn fetch_data(&self, query: &str) -> Result<Value, SourceError> {
        match &self.data_fetch {
            Some(source) => source.fetch(query).await,
            None => Err(SourceError::Remote {
                message: "no data source configured for this run".to_string(),
            }),
        }
    }

    /// Queues a delayed notification from `notifier`.
    ///
    /// Duplicate `(target, action)` pairs are dropped silently; only the
    /// first registration emits a `NotificationQueued` event.
    pub fn queue_delayed(&mut self, notifier: &ResourceId, notification: &Notification) {
        let key = (notification.target.clone(), notification.action.clone());
        if !self.seen_delayed.insert(key) {
            log::debug!(
                "dropping duplicate delayed notification {} -> {}",
                notification.action,
                notification.target
            );
            return;
        }
        self.publish(
            Event::new(EventKind::NotificationQueued)
                .with_resource(notification.target.to_string())
                .with_action(notification.action.as_str())
                .with_reason(notifier.to_string()),
        );
        self.delayed.push(notification.clone());
    }

    /// Drains the delayed queue in first-registration order.
    pub fn take_delayed(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.delayed)
    }

    /// Delayed notifications currently queued.
    pub fn delayed_len(&self) -> usize {
        self.delayed.len()
    }

    /// Records a resource whose failure was swallowed by `ignore_failure`.
    pub(crate) fn record_ignored_failure(&mut self, id: ResourceId) {
        self.ignored_failures.push(id);
    }

    /// Drains the ignore_failure casualties, in failure order.
    pub(crate) fn take_ignored_failures(&mut self) -> Vec<ResourceId> {
        std::mem::take(&mut self.ignored_failures)
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("node", &self.node.name())
            .field("resources", &self.collection.len())
            .field("platform", &self.platform)
            .field("delayed", &self.delayed.len())
            .finish()
    }
}

/// Builder for [`RunContext`].
pub struct RunContextBuilder {
    node: Node,
    resources: Vec<Resource>,
    registry: Option<Arc<ProviderRegistry>>,
    platform: Platform,
    config: RunConfig,
    sinks: Vec<Arc<dyn Dispatch>>,
    data_fetch: Option<Arc<dyn DataFetch>>,
    persist: Option<Arc<dyn Persist>>,
    cancel: Option<CancellationToken>,
}

impl RunContextBuilder {
    /// Declares a resource. Declaration order is run order.
    pub fn with_resource(mut self, resource: Resource) -> Self {
        self.resources.push(resource);
        self
    }

    pub fn with_registry(mut self, registry: Arc<ProviderRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }

    /// Adds an event dispatcher.
    pub fn with_sink(mut self, sink: Arc<dyn Dispatch>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn with_data_fetch(mut self, source: Arc<dyn DataFetch>) -> Self {
        self.data_fetch = Some(source);
        self
    }

    pub fn with_persist(mut self, persist: Arc<dyn Persist>) -> Self {
        self.persist = Some(persist);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Finalizes the context. Run-config defaults are folded into every
    /// resource that did not set its own failure policy.
    pub fn build(self) -> RunContext {
        let mut collection = ResourceCollection::new();
        for resource in self.resources {
            collection.insert(resource.with_defaults(&self.config));
        }
        RunContext {
            node: self.node,
            collection,
            registry: self.registry.unwrap_or_default(),
            platform: self.platform,
            config: self.config,
            dispatcher: DispatcherSet::from_sinks(self.sinks),
            data_fetch: self.data_fetch,
            persist: self.persist,
            cancel: self.cancel.unwrap_or_default(),
            delayed: Vec::new(),
            seen_delayed: HashSet::new(),
            ignored_failures: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::Timing;

    fn ctx() -> RunContext {
        RunContext::builder(Node::new("web-1")).build()
    }

    #[test]
    fn test_delayed_queue_dedupes_on_target_and_action() {
        let mut ctx = ctx();
        let notifier_a = ResourceId::new("file", "/a");
        let notifier_b = ResourceId::new("file", "/b");
        let restart = Notification::new(
            Action::new("restart"),
            ResourceId::new("service", "nginx"),
            Timing::Delayed,
        );
        ctx.queue_delayed(&notifier_a, &restart);
        ctx.queue_delayed(&notifier_b, &restart);
        assert_eq!(ctx.delayed_len(), 1, "same (target, action) queues once");

        let reload = Notification::new(
            Action::new("reload"),
            ResourceId::new("service", "nginx"),
            Timing::Delayed,
        );
        ctx.queue_delayed(&notifier_a, &reload);
        assert_eq!(ctx.delayed_len(), 2, "different action is a distinct edge");
    }

    #[test]
    fn test_take_delayed_preserves_first_registration_order() {
        let mut ctx = ctx();
        let notifier = ResourceId::new("file", "/a");
        for name in ["one", "two", "three"] {
            ctx.queue_delayed(
                &notifier,
                &Notification::new(
                    Action::new("restart"),
                    ResourceId::new("service", name),
                    Timing::Delayed,
                ),
            );
        }
        let drained = ctx.take_delayed();
        let order: Vec<_> = drained.iter().map(|n| n.target.name().to_string()).collect();
        assert_eq!(order, vec!["one", "two", "three"]);
        assert_eq!(ctx.delayed_len(), 0);
    }

    #[tokio::test]
    async fn test_fetch_without_source_is_an_error() {
        let ctx = ctx();
        assert!(ctx.fetch_data("nodes:*").await.is_err());
    }

    #[test]
    fn test_build_folds_run_defaults_into_resources() {
        let config = RunConfig {
            default_retries: 4,
            ..RunConfig::default()
        };
        let ctx = RunContext::builder(Node::new("web-1"))
            .with_config(config)
            .with_resource(Resource::new("file", "/a", Action::new("create")))
            .build();
        let resource = ctx.collection.lookup(&ResourceId::new("file", "/a")).unwrap();
        assert_eq!(resource.retries(), 4);
    }
}
