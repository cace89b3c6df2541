//! # Runner: the convergence loop.
//!
//! Walks the resource collection in declaration order, evaluates guards,
//! resolves a provider per resource, and converges each requested action
//! with per-resource retry policy. Immediate notifications run
//! depth-first as soon as the notifying resource updates; delayed
//! notifications run once each after the main pass.
//!
//! ```text
//!   RunStarted
//!     └─ ConvergeStarted
//!          ├─ resource #0 ─ guards ─ provider ─ [immediate notifications]
//!          ├─ resource #1 ─ ...
//!          ├─ delayed notifications (deduped, first-registration order)
//!          └─ ConvergeCompleted ─ persist node
//!   RunCompleted | RunFailed
//! ```
//!
//! ## Rules
//! - A provider failure retries up to the resource's `retries` extra
//!   attempts, then fails the run unless `ignore_failure` is set.
//! - Notified (forced) runs bypass guards: the notifying resource
//!   already decided the work is needed.
//! - Cancellation is honored at resource boundaries and retry sleeps;
//!   a provider action in flight is never interrupted midway.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use tokio::time;

use crate::error::ConvergeError;
use crate::events::{Event, EventKind};
use crate::guards::{first_blocking, GuardInterpreter, GuardOptions, ResourceGuard, ShellGuard};
use crate::resources::{Action, Resource, ResourceId, Timing};
use crate::run::context::RunContext;

/// Outcome summary of a finished run.
#[derive(Clone, Debug)]
pub struct RunSummary {
    /// Resources in the collection.
    pub resources: usize,
    /// Resources that reported an update, in declaration order.
    pub updated: Vec<ResourceId>,
    /// Resources that ran no provider on the main pass (guard-blocked
    /// or `action: nothing`).
    pub skipped: u32,
    /// Resources that failed but carried `ignore_failure`, in failure
    /// order.
    pub failed: Vec<ResourceId>,
    /// Wall-clock duration of the converge pass.
    pub elapsed: Duration,
    /// Whether this was a why-run (no system changes were made).
    pub why_run: bool,
}

/// Drives one convergence run over a [`RunContext`].
#[derive(Debug)]
pub struct Runner {
    ctx: RunContext,
}

impl Runner {
    pub fn new(ctx: RunContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut RunContext {
        &mut self.ctx
    }

    /// Gives the context back, for inspecting the node and collection
    /// after the run.
    pub fn into_context(self) -> RunContext {
        self.ctx
    }

    /// Runs the full convergence: main pass, delayed notifications,
    /// node persistence.
    pub async fn converge(&mut self) -> Result<RunSummary, ConvergeError> {
        self.ctx.publish(
            Event::new(EventKind::RunStarted).with_reason(self.ctx.node.name().to_string()),
        );
        log::info!(
            "run started: node {} with {} resource(s)",
            self.ctx.node.name(),
            self.ctx.collection.len()
        );

        match converge_inner(&mut self.ctx).await {
            Ok(summary) => {
                self.ctx.publish(Event::new(EventKind::RunCompleted));
                log::info!(
                    "run completed: {}/{} resource(s) updated in {:?}",
                    summary.updated.len(),
                    summary.resources,
                    summary.elapsed
                );
                Ok(summary)
            }
            Err(err) => {
                self.ctx
                    .publish(Event::new(EventKind::RunFailed).with_reason(err.as_message()));
                match err.to_report() {
                    Some(report) => log::error!(
                        "run failed [{}]: {} action `{}` after {} attempt(s): {}",
                        err.as_label(),
                        report.resource,
                        report.action,
                        report.attempts,
                        report.message
                    ),
                    None => log::error!("run failed [{}]: {}", err.as_label(), err.as_message()),
                }
                Err(err)
            }
        }
    }
}

async fn converge_inner(ctx: &mut RunContext) -> Result<RunSummary, ConvergeError> {
    let started = Instant::now();
    ctx.publish(Event::new(EventKind::ConvergeStarted));

    let mut skipped = 0u32;
    for idx in 0..ctx.collection.len() {
        if ctx.cancel_token().is_cancelled() {
            return Err(ConvergeError::Canceled);
        }
        let Some(action) = ctx.collection.get(idx).map(|r| r.action().clone()) else {
            continue;
        };
        if !run_resource(ctx, idx, action, false).await? {
            skipped += 1;
        }
    }

    // Delayed notifications: already deduped at queue time, forced runs.
    // A forced run may queue further delayed edges, so drain until the
    // queue stays empty; dedup on (target, action) bounds the rounds.
    loop {
        let delayed = ctx.take_delayed();
        if delayed.is_empty() {
            break;
        }
        for notification in delayed {
            if ctx.cancel_token().is_cancelled() {
                return Err(ConvergeError::Canceled);
            }
            let idx = ctx.collection.position(&notification.target).ok_or_else(|| {
                ConvergeError::UnknownNotificationTarget {
                    target: notification.target.to_string(),
                }
            })?;
            run_resource(ctx, idx, notification.action, true).await?;
        }
    }

    ctx.publish(Event::new(EventKind::ConvergeCompleted));

    if let Some(persist) = ctx.persist_hook() {
        persist
            .persist(&ctx.node)
            .await
            .map_err(|source| ConvergeError::PersistFailed { source })?;
    }

    let updated: Vec<ResourceId> = ctx
        .collection
        .iter()
        .filter(|r| r.updated())
        .map(|r| r.id().clone())
        .collect();
    Ok(RunSummary {
        resources: ctx.collection.len(),
        updated,
        skipped,
        failed: ctx.take_ignored_failures(),
        elapsed: started.elapsed(),
        why_run: ctx.config.why_run,
    })
}

/// Converges one resource for `action`.
///
/// Returns `Ok(true)` when a provider ran (successfully or with failure
/// ignored), `Ok(false)` when the resource was skipped. `forced` marks
/// notified runs, which bypass guards and the `nothing` check.
fn run_resource(
    ctx: &mut RunContext,
    idx: usize,
    action: Action,
    forced: bool,
) -> BoxFuture<'_, Result<bool, ConvergeError>> {
    Box::pin(async move {
        let Some(snapshot) = ctx.collection.get(idx).cloned() else {
            return Ok(false);
        };
        let id = snapshot.id().clone();

        if !forced {
            if action.is_nothing() {
                log::debug!("{id} requests `nothing`; waiting for notifications");
                return Ok(false);
            }
            if let Some(reason) = blocking_guard(ctx, &snapshot).await {
                ctx.publish(
                    Event::new(EventKind::ResourceSkipped)
                        .with_resource(id.to_string())
                        .with_action(action.as_str())
                        .with_reason(reason.clone()),
                );
                log::info!("{id} skipped ({reason})");
                return Ok(false);
            }
        }

        let registry = ctx.registry.clone();
        let provider = registry.resolve(id.rtype(), &ctx.platform)?;

        ctx.publish(
            Event::new(EventKind::ResourceStarted)
                .with_resource(id.to_string())
                .with_action(action.as_str()),
        );

        let max_attempts = snapshot.retries().saturating_add(1);
        let cancel = ctx.cancel_token().clone();
        let mut attempt = 1u32;
        loop {
            match provider.run_action(&snapshot, &action, ctx).await {
                Ok(outcome) => {
                    ctx.collection.record_attempts(idx, attempt);
                    if outcome.updated() {
                        ctx.collection.mark_updated(idx);
                        ctx.publish(
                            Event::new(EventKind::ResourceUpdated)
                                .with_resource(id.to_string())
                                .with_action(action.as_str())
                                .with_attempt(attempt),
                        );
                        log::info!("{id} action `{action}` updated");
                        fire_notifications(ctx, &snapshot).await?;
                    } else {
                        log::debug!("{id} action `{action}` already converged");
                    }
                    return Ok(true);
                }
                Err(err) if attempt < max_attempts => {
                    ctx.publish(
                        Event::new(EventKind::ResourceRetrying)
                            .with_resource(id.to_string())
                            .with_action(action.as_str())
                            .with_attempt(attempt)
                            .with_delay(snapshot.retry_delay())
                            .with_reason(err.to_string()),
                    );
                    log::warn!(
                        "{id} action `{action}` attempt {attempt}/{max_attempts} failed: {err}; retrying in {:?}",
                        snapshot.retry_delay()
                    );
                    tokio::select! {
                        _ = time::sleep(snapshot.retry_delay()) => {}
                        _ = cancel.cancelled() => return Err(ConvergeError::Canceled),
                    }
                    attempt += 1;
                }
                Err(err) => {
                    ctx.collection.record_attempts(idx, attempt);
                    ctx.publish(
                        Event::new(EventKind::ResourceFailed)
                            .with_resource(id.to_string())
                            .with_action(action.as_str())
                            .with_attempt(attempt)
                            .with_reason(err.to_string()),
                    );
                    if snapshot.ignore_failure() {
                        log::warn!(
                            "{id} action `{action}` failed after {attempt} attempt(s), ignored: {err}"
                        );
                        ctx.record_ignored_failure(id);
                        return Ok(true);
                    }
                    return Err(ConvergeError::ActionFailed {
                        resource: id.to_string(),
                        action: action.to_string(),
                        attempts: attempt,
                        source: err,
                    });
                }
            }
        }
    })
}

/// Evaluates the resource's guards in declaration order; returns the
/// description of the first blocking guard, if any.
async fn blocking_guard(ctx: &RunContext, resource: &Resource) -> Option<String> {
    if resource.guards().is_empty() {
        return None;
    }
    let interpreter: Arc<dyn GuardInterpreter> = match resource.interpreter() {
        Some(custom) => custom.clone(),
        None => Arc::new(ResourceGuard::new(
            ShellGuard::new(ctx.config.guard_timeout()),
            inherited_guard_options(resource),
        )),
    };
    first_blocking(resource.guards(), interpreter.as_ref())
        .await
        .map(|guard| guard.description())
}

/// Maps resource properties (`cwd`, `environment`, `timeout`) to the guard
/// options command guards inherit.
fn inherited_guard_options(resource: &Resource) -> GuardOptions {
    let cwd = resource
        .property("cwd")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let env = resource
        .property("environment")
        .and_then(|v| v.as_object())
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default();
    let timeout = resource
        .property("timeout")
        .and_then(|v| v.as_u64())
        .map(Duration::from_secs);
    GuardOptions { cwd, env, timeout }
}

async fn fire_notifications(ctx: &mut RunContext, snapshot: &Resource) -> Result<(), ConvergeError> {
    for notification in snapshot.notifications() {
        match notification.timing {
            Timing::Immediate => {
                let target_idx =
                    ctx.collection.position(&notification.target).ok_or_else(|| {
                        ConvergeError::UnknownNotificationTarget {
                            target: notification.target.to_string(),
                        }
                    })?;
                log::debug!(
                    "{} immediately notifies {} `{}`",
                    snapshot.id(),
                    notification.target,
                    notification.action
                );
                run_resource(ctx, target_idx, notification.action.clone(), true).await?;
            }
            Timing::Delayed => ctx.queue_delayed(snapshot.id(), notification),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::attributes::Layer;
    use crate::config::RunConfig;
    use crate::error::{ProviderError, SourceError};
    use crate::events::Dispatch;
    use crate::guards::Guard;
    use crate::node::{Node, Persist};
    use crate::providers::{ConvergeActions, ConvergeOutcome, Platform, Provider, ProviderRegistry};
    use crate::resources::Notification;

    /// Records every `type[name]:action` a provider converged.
    struct Recording {
        log: Arc<Mutex<Vec<String>>>,
        update: bool,
    }

    #[async_trait]
    impl Provider for Recording {
        async fn run_action(
            &self,
            resource: &Resource,
            action: &Action,
            _ctx: &mut RunContext,
        ) -> Result<ConvergeOutcome, ProviderError> {
            self.log.lock().unwrap().push(format!("{}:{action}", resource.id()));
            Ok(if self.update {
                ConvergeOutcome::Updated
            } else {
                ConvergeOutcome::Unchanged
            })
        }
    }

    /// Fails the first `failures` attempts, then updates.
    struct Flaky {
        failures: AtomicU32,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Provider for Flaky {
        async fn run_action(
            &self,
            resource: &Resource,
            action: &Action,
            _ctx: &mut RunContext,
        ) -> Result<ConvergeOutcome, ProviderError> {
            self.log.lock().unwrap().push(format!("{}:{action}", resource.id()));
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                return Err(ProviderError::Command {
                    message: "transient".into(),
                });
            }
            Ok(ConvergeOutcome::Updated)
        }
    }

    /// Event sink collecting kinds with resource ids.
    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<(EventKind, Option<String>)>>,
    }

    impl Dispatch for Recorder {
        fn notify(&self, event: &Event) {
            self.events
                .lock()
                .unwrap()
                .push((event.kind, event.resource.as_deref().map(str::to_string)));
        }
    }

    impl Recorder {
        fn kinds(&self) -> Vec<EventKind> {
            self.events.lock().unwrap().iter().map(|(k, _)| *k).collect()
        }
    }

    fn platform() -> Platform {
        Platform::new("debian", "ubuntu", "24.04")
    }

    fn registry_with(log: &Arc<Mutex<Vec<String>>>, update: bool) -> Arc<ProviderRegistry> {
        let mut registry = ProviderRegistry::new();
        for rtype in ["file", "service"] {
            let log = log.clone();
            registry.register(rtype, "recording", move || {
                Arc::new(Recording {
                    log: log.clone(),
                    update,
                }) as Arc<dyn Provider>
            });
        }
        Arc::new(registry)
    }

    fn quick(resource: Resource) -> Resource {
        resource.with_retry_delay(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_main_pass_runs_in_declaration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let ctx = RunContext::builder(Node::new("web-1"))
            .with_registry(registry_with(&log, true))
            .with_platform(platform())
            .with_resource(Resource::new("file", "/a", Action::new("create")))
            .with_resource(Resource::new("file", "/b", Action::new("create")))
            .build();
        let summary = Runner::new(ctx).converge().await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["file[/a]:create", "file[/b]:create"]);
        assert_eq!(summary.updated.len(), 2);
        assert_eq!(summary.skipped, 0);
    }

    #[tokio::test]
    async fn test_guard_blocked_resource_is_skipped() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::new(Recorder::default());
        let ctx = RunContext::builder(Node::new("web-1"))
            .with_registry(registry_with(&log, true))
            .with_platform(platform())
            .with_sink(recorder.clone())
            .with_resource(
                Resource::new("file", "/a", Action::new("create"))
                    .with_guard(Guard::only_if(|| false)),
            )
            .build();
        let mut runner = Runner::new(ctx);
        let summary = runner.converge().await.unwrap();

        assert!(log.lock().unwrap().is_empty(), "provider must not run");
        assert_eq!(summary.skipped, 1);
        assert!(summary.updated.is_empty());
        assert!(recorder.kinds().contains(&EventKind::ResourceSkipped));
        let res = runner
            .context()
            .collection
            .lookup(&ResourceId::new("file", "/a"))
            .unwrap();
        assert!(!res.updated());
    }

    #[tokio::test]
    async fn test_not_if_blocks_on_pass() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let ctx = RunContext::builder(Node::new("web-1"))
            .with_registry(registry_with(&log, true))
            .with_platform(platform())
            .with_resource(
                Resource::new("file", "/a", Action::new("create"))
                    .with_guard(Guard::not_if(|| true)),
            )
            .build();
        let summary = Runner::new(ctx).converge().await.unwrap();
        assert_eq!(summary.skipped, 1);
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_immediate_notification_runs_depth_first() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let ctx = RunContext::builder(Node::new("web-1"))
            .with_registry(registry_with(&log, true))
            .with_platform(platform())
            .with_resource(
                Resource::new("file", "/a", Action::new("create")).with_notification(
                    Notification::new(
                        Action::new("restart"),
                        ResourceId::new("service", "nginx"),
                        Timing::Immediate,
                    ),
                ),
            )
            .with_resource(Resource::new("file", "/b", Action::new("create")))
            .with_resource(Resource::new("service", "nginx", Action::nothing()))
            .build();
        Runner::new(ctx).converge().await.unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "file[/a]:create",
                "service[nginx]:restart",
                "file[/b]:create"
            ],
            "immediate notification must run before the next resource"
        );
    }

    #[tokio::test]
    async fn test_delayed_notifications_dedupe_and_run_after_main_pass() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let restart = Notification::new(
            Action::new("restart"),
            ResourceId::new("service", "nginx"),
            Timing::Delayed,
        );
        let ctx = RunContext::builder(Node::new("web-1"))
            .with_registry(registry_with(&log, true))
            .with_platform(platform())
            .with_resource(
                Resource::new("file", "/a", Action::new("create"))
                    .with_notification(restart.clone()),
            )
            .with_resource(
                Resource::new("file", "/b", Action::new("create")).with_notification(restart),
            )
            .with_resource(Resource::new("service", "nginx", Action::nothing()))
            .build();
        Runner::new(ctx).converge().await.unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "file[/a]:create",
                "file[/b]:create",
                "service[nginx]:restart"
            ],
            "two delayed edges to the same (target, action) run once"
        );
    }

    #[tokio::test]
    async fn test_delayed_notification_cascade_runs_to_completion() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let ctx = RunContext::builder(Node::new("web-1"))
            .with_registry(registry_with(&log, true))
            .with_platform(platform())
            .with_resource(
                Resource::new("file", "/a", Action::new("create")).with_notification(
                    Notification::new(
                        Action::new("restart"),
                        ResourceId::new("service", "b"),
                        Timing::Delayed,
                    ),
                ),
            )
            .with_resource(
                Resource::new("service", "b", Action::nothing()).with_notification(
                    Notification::new(
                        Action::new("restart"),
                        ResourceId::new("service", "c"),
                        Timing::Delayed,
                    ),
                ),
            )
            .with_resource(Resource::new("service", "c", Action::nothing()))
            .build();
        Runner::new(ctx).converge().await.unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "file[/a]:create",
                "service[b]:restart",
                "service[c]:restart"
            ],
            "a delayed edge queued during the delayed pass must still fire"
        );
    }

    #[tokio::test]
    async fn test_subscribed_edge_fires_like_a_declared_notification() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut ctx = RunContext::builder(Node::new("web-1"))
            .with_registry(registry_with(&log, true))
            .with_platform(platform())
            .with_resource(Resource::new("file", "/a", Action::new("create")))
            .with_resource(Resource::new("service", "nginx", Action::nothing()))
            .build();
        ctx.collection
            .subscribe(
                &ResourceId::new("service", "nginx"),
                &ResourceId::new("file", "/a"),
                Action::new("restart"),
                Timing::Delayed,
            )
            .unwrap();
        Runner::new(ctx).converge().await.unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            vec!["file[/a]:create", "service[nginx]:restart"]
        );
    }

    #[tokio::test]
    async fn test_forced_notification_bypasses_guards() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let ctx = RunContext::builder(Node::new("web-1"))
            .with_registry(registry_with(&log, true))
            .with_platform(platform())
            .with_resource(
                Resource::new("file", "/a", Action::new("create")).with_notification(
                    Notification::new(
                        Action::new("restart"),
                        ResourceId::new("service", "nginx"),
                        Timing::Delayed,
                    ),
                ),
            )
            .with_resource(
                Resource::new("service", "nginx", Action::nothing())
                    .with_guard(Guard::only_if(|| false)),
            )
            .build();
        Runner::new(ctx).converge().await.unwrap();
        assert!(
            log.lock().unwrap().contains(&"service[nginx]:restart".to_string()),
            "notified runs must not evaluate guards"
        );
    }

    #[tokio::test]
    async fn test_unchanged_resources_do_not_notify() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let ctx = RunContext::builder(Node::new("web-1"))
            .with_registry(registry_with(&log, false))
            .with_platform(platform())
            .with_resource(
                Resource::new("file", "/a", Action::new("create")).with_notification(
                    Notification::new(
                        Action::new("restart"),
                        ResourceId::new("service", "nginx"),
                        Timing::Delayed,
                    ),
                ),
            )
            .with_resource(Resource::new("service", "nginx", Action::nothing()))
            .build();
        let summary = Runner::new(ctx).converge().await.unwrap();
        assert!(summary.updated.is_empty());
        assert_eq!(*log.lock().unwrap(), vec!["file[/a]:create"]);
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::new(Recorder::default());
        let mut registry = ProviderRegistry::new();
        {
            let log = log.clone();
            registry.register("file", "flaky", move || {
                Arc::new(Flaky {
                    failures: AtomicU32::new(2),
                    log: log.clone(),
                }) as Arc<dyn Provider>
            });
        }
        let ctx = RunContext::builder(Node::new("web-1"))
            .with_registry(Arc::new(registry))
            .with_platform(platform())
            .with_sink(recorder.clone())
            .with_resource(quick(
                Resource::new("file", "/a", Action::new("create")).with_retries(3),
            ))
            .build();
        let mut runner = Runner::new(ctx);
        let summary = runner.converge().await.unwrap();

        assert_eq!(summary.updated, vec![ResourceId::new("file", "/a")]);
        assert_eq!(log.lock().unwrap().len(), 3, "two failures then one success");
        let res = runner
            .context()
            .collection
            .lookup(&ResourceId::new("file", "/a"))
            .unwrap();
        assert_eq!(res.attempts(), 3);
        let retrying = recorder
            .kinds()
            .iter()
            .filter(|k| **k == EventKind::ResourceRetrying)
            .count();
        assert_eq!(retrying, 2);
    }

    #[tokio::test]
    async fn test_retries_exhausted_fails_run() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::new(Recorder::default());
        let mut registry = ProviderRegistry::new();
        {
            let log = log.clone();
            registry.register("file", "flaky", move || {
                Arc::new(Flaky {
                    failures: AtomicU32::new(10),
                    log: log.clone(),
                }) as Arc<dyn Provider>
            });
        }
        let ctx = RunContext::builder(Node::new("web-1"))
            .with_registry(Arc::new(registry))
            .with_platform(platform())
            .with_sink(recorder.clone())
            .with_resource(quick(
                Resource::new("file", "/a", Action::new("create")).with_retries(1),
            ))
            .build();
        let err = Runner::new(ctx).converge().await.unwrap_err();

        match err {
            ConvergeError::ActionFailed {
                resource, attempts, ..
            } => {
                assert_eq!(resource, "file[/a]");
                assert_eq!(attempts, 2, "one retry means two attempts total");
            }
            other => panic!("expected ActionFailed, got {other:?}"),
        }
        let kinds = recorder.kinds();
        assert!(kinds.contains(&EventKind::ResourceFailed));
        assert!(kinds.contains(&EventKind::RunFailed));
        assert!(!kinds.contains(&EventKind::RunCompleted));
    }

    #[tokio::test]
    async fn test_ignore_failure_continues_the_run() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ProviderRegistry::new();
        {
            let log = log.clone();
            registry.register("file", "flaky", move || {
                Arc::new(Flaky {
                    failures: AtomicU32::new(10),
                    log: log.clone(),
                }) as Arc<dyn Provider>
            });
        }
        {
            let log = log.clone();
            registry.register("service", "recording", move || {
                Arc::new(Recording {
                    log: log.clone(),
                    update: true,
                }) as Arc<dyn Provider>
            });
        }
        let ctx = RunContext::builder(Node::new("web-1"))
            .with_registry(Arc::new(registry))
            .with_platform(platform())
            .with_resource(quick(
                Resource::new("file", "/a", Action::new("create")).with_ignore_failure(true),
            ))
            .with_resource(Resource::new("service", "nginx", Action::new("start")))
            .build();
        let summary = Runner::new(ctx).converge().await.unwrap();
        assert_eq!(summary.updated, vec![ResourceId::new("service", "nginx")]);
        assert_eq!(summary.failed, vec![ResourceId::new("file", "/a")]);
        assert!(log.lock().unwrap().contains(&"service[nginx]:start".to_string()));
    }

    #[tokio::test]
    async fn test_unknown_delayed_target_is_fatal() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let ctx = RunContext::builder(Node::new("web-1"))
            .with_registry(registry_with(&log, true))
            .with_platform(platform())
            .with_resource(
                Resource::new("file", "/a", Action::new("create")).with_notification(
                    Notification::new(
                        Action::new("restart"),
                        ResourceId::new("service", "ghost"),
                        Timing::Delayed,
                    ),
                ),
            )
            .build();
        let err = Runner::new(ctx).converge().await.unwrap_err();
        assert_eq!(err.as_label(), "converge_unknown_target");
    }

    #[tokio::test]
    async fn test_no_provider_for_type_is_fatal() {
        let ctx = RunContext::builder(Node::new("web-1"))
            .with_platform(platform())
            .with_resource(Resource::new("package", "curl", Action::new("install")))
            .build();
        let err = Runner::new(ctx).converge().await.unwrap_err();
        assert_eq!(err.as_label(), "converge_no_provider");
    }

    /// Provider that stages real steps through [`ConvergeActions`], so
    /// why-run narrates instead of executing.
    struct Staged {
        executed: Arc<AtomicU32>,
    }

    #[async_trait]
    impl Provider for Staged {
        async fn run_action(
            &self,
            resource: &Resource,
            action: &Action,
            ctx: &mut RunContext,
        ) -> Result<ConvergeOutcome, ProviderError> {
            let mut steps = ConvergeActions::new(ctx.config.why_run);
            let executed = self.executed.clone();
            steps.stage(format!("{action} {}", resource.id()), move || {
                executed.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
            steps.converge()
        }
    }

    #[tokio::test]
    async fn test_why_run_narrates_without_executing() {
        let executed = Arc::new(AtomicU32::new(0));
        let mut registry = ProviderRegistry::new();
        {
            let executed = executed.clone();
            registry.register("file", "staged", move || {
                Arc::new(Staged {
                    executed: executed.clone(),
                }) as Arc<dyn Provider>
            });
        }
        let ctx = RunContext::builder(Node::new("web-1"))
            .with_registry(Arc::new(registry))
            .with_platform(platform())
            .with_config(RunConfig {
                why_run: true,
                ..RunConfig::default()
            })
            .with_resource(Resource::new("file", "/a", Action::new("create")))
            .build();
        let summary = Runner::new(ctx).converge().await.unwrap();

        assert!(summary.why_run);
        assert_eq!(executed.load(Ordering::SeqCst), 0, "why-run must not execute steps");
        assert_eq!(
            summary.updated,
            vec![ResourceId::new("file", "/a")],
            "why-run still reports what would update"
        );
    }

    /// Persistence hook recording the node names it saw.
    #[derive(Default)]
    struct Saved {
        names: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl Persist for Saved {
        async fn persist(&self, node: &Node) -> Result<(), SourceError> {
            if self.fail {
                return Err(SourceError::Remote {
                    message: "server unavailable".into(),
                });
            }
            self.names.lock().unwrap().push(node.name().to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_node_persisted_after_successful_converge() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let saved = Arc::new(Saved::default());
        let ctx = RunContext::builder(Node::new("web-1"))
            .with_registry(registry_with(&log, true))
            .with_platform(platform())
            .with_persist(saved.clone())
            .with_resource(Resource::new("file", "/a", Action::new("create")))
            .build();
        Runner::new(ctx).converge().await.unwrap();
        assert_eq!(*saved.names.lock().unwrap(), vec!["web-1"]);
    }

    #[tokio::test]
    async fn test_persist_failure_fails_the_run() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let saved = Arc::new(Saved {
            fail: true,
            ..Saved::default()
        });
        let ctx = RunContext::builder(Node::new("web-1"))
            .with_registry(registry_with(&log, true))
            .with_platform(platform())
            .with_persist(saved)
            .build();
        let err = Runner::new(ctx).converge().await.unwrap_err();
        assert_eq!(err.as_label(), "converge_persist_failed");
    }

    #[tokio::test]
    async fn test_cancelled_token_stops_the_run() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let cancel = tokio_util::sync::CancellationToken::new();
        cancel.cancel();
        let ctx = RunContext::builder(Node::new("web-1"))
            .with_registry(registry_with(&log, true))
            .with_platform(platform())
            .with_cancel(cancel)
            .with_resource(Resource::new("file", "/a", Action::new("create")))
            .build();
        let err = Runner::new(ctx).converge().await.unwrap_err();
        assert_eq!(err.as_label(), "converge_canceled");
        assert!(log.lock().unwrap().is_empty());
    }

    /// Provider that records discovered state into node attributes.
    struct Discovering;

    #[async_trait]
    impl Provider for Discovering {
        async fn run_action(
            &self,
            resource: &Resource,
            _action: &Action,
            ctx: &mut RunContext,
        ) -> Result<ConvergeOutcome, ProviderError> {
            ctx.node
                .attributes_mut()
                .write(
                    Layer::Normal,
                    &["converged", resource.id().name()],
                    json!(true),
                )
                .map_err(|err| ProviderError::Other(err.to_string()))?;
            Ok(ConvergeOutcome::Updated)
        }
    }

    #[tokio::test]
    async fn test_provider_can_write_node_attributes() {
        let mut registry = ProviderRegistry::new();
        registry.register("file", "discovering", || {
            Arc::new(Discovering) as Arc<dyn Provider>
        });
        let ctx = RunContext::builder(Node::new("web-1"))
            .with_registry(Arc::new(registry))
            .with_platform(platform())
            .with_resource(Resource::new("file", "a", Action::new("create")))
            .build();
        let mut runner = Runner::new(ctx);
        runner.converge().await.unwrap();
        let value = runner
            .context()
            .node
            .attributes()
            .read(&["converged", "a"]);
        assert_eq!(value, Some(json!(true)));
    }
}
