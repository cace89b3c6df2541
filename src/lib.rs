//! # nodevisor
//!
//! **Nodevisor** is a node-convergence library for Rust.
//!
//! It provides primitives to describe a node's desired state as declared
//! resources and to converge the real system toward that state: a layered
//! attribute store with precedence-aware merging, guarded idempotent
//! resources, platform-resolved providers, and an update-driven
//! notification graph. The crate is designed as a building block for
//! higher-level configuration agents.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │   Resource   │   │   Resource   │   │   Resource   │
//!     │ file[/etc/x] │   │package[curl] │   │service[nginx]│
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  RunContext (per-run state)                                       │
//! │  - Node (layered AttributeStore, serial-numbered cache)           │
//! │  - ResourceCollection (declaration order + id index)              │
//! │  - ProviderRegistry (type + platform → provider)                  │
//! │  - DispatcherSet (fans out lifecycle events)                      │
//! │  - delayed-notification queue (deduped per target/action)         │
//! └──────────────────────────────┬────────────────────────────────────┘
//!                                ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Runner (convergence loop)                                        │
//! │  - guards (only_if / not_if via GuardInterpreter)                 │
//! │  - provider action with per-resource retry policy                 │
//! │  - immediate notifications, depth-first                           │
//! │  - delayed notifications after the main pass                      │
//! │  - node persistence via Persist                                   │
//! └──────────────────────────────┬────────────────────────────────────┘
//!                                ▼
//!        Events: RunStarted, ResourceUpdated, ResourceRetrying, ...
//! ```
//!
//! ## Feature flags
//! - `logging` — bundles [`LogWriter`], a ready-made event sink that
//!   prints lifecycle events to stdout.
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use nodevisor::{
//!     Action, Guard, Node, Platform, ProviderRegistry, Resource, RunConfig,
//!     RunContext, Runner,
//! };
//!
//! # async fn demo(registry: Arc<ProviderRegistry>) -> Result<(), nodevisor::ConvergeError> {
//! let ctx = RunContext::builder(Node::new("web-1"))
//!     .with_registry(registry)
//!     .with_platform(Platform::new("debian", "ubuntu", "24.04"))
//!     .with_config(RunConfig::default())
//!     .with_resource(
//!         Resource::new("package", "curl", Action::new("install"))
//!             .with_guard(Guard::not_if_command("command -v curl")),
//!     )
//!     .build();
//!
//! let summary = Runner::new(ctx).converge().await?;
//! println!("updated {} resource(s)", summary.updated.len());
//! # Ok(())
//! # }
//! ```

pub mod attributes;
pub mod config;
pub mod error;
pub mod events;
pub mod guards;
pub mod node;
pub mod providers;
pub mod resources;
pub mod run;

pub use attributes::{deep_merge, AttributeStore, Layer, ResolvedAttributes, ResolvedView};
pub use config::RunConfig;
pub use error::{AttributeError, ConvergeError, FailureReport, ProviderError, SourceError};
pub use events::{Dispatch, DispatcherSet, Event, EventKind};
pub use guards::{Guard, GuardInterpreter, GuardKind, GuardOptions, GuardOutcome, ShellGuard};
pub use node::{Node, Persist, SeedWrite};
pub use providers::{ConvergeActions, ConvergeOutcome, Platform, Provider, ProviderRegistry};
pub use resources::{Action, Notification, Resource, ResourceCollection, ResourceId, Timing};
pub use run::{DataFetch, RunContext, RunContextBuilder, RunSummary, Runner};

#[cfg(feature = "logging")]
pub use events::LogWriter;
