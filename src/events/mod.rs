//! Lifecycle events: data model and synchronous dispatch.
//!
//! This module groups the event **data model** and the **dispatcher**
//! used to hand lifecycle events to out-of-core observers (logging,
//! telemetry, reporting).
//!
//! ## Contents
//! - [`EventKind`], [`Event`] — event classification and payload metadata
//! - [`Dispatch`], [`DispatcherSet`] — synchronous fire-and-forget fan-out
//! - `LogWriter` — stdout sink behind the `logging` feature
//!
//! ## Quick reference
//! - **Publisher**: the convergence runner, at every state transition.
//! - **Consumers**: whatever the embedding caller registers; zero sinks
//!   is valid and events are then dropped.

mod dispatch;
mod event;

pub use dispatch::{Dispatch, DispatcherSet};
pub use event::{Event, EventKind};

#[cfg(feature = "logging")]
pub use dispatch::LogWriter;
