//! # Event dispatcher: synchronous fan-out to lifecycle sinks.
//!
//! [`Dispatch`] is the extension point for logging, telemetry, and
//! reporting collaborators; [`DispatcherSet`] fans each event out to every
//! registered sink, in registration order, synchronously.
//!
//! ## Architecture
//! ```text
//! Runner ──► DispatcherSet::notify(&event) ──► sink1.notify()
//!                                          ──► sink2.notify()
//!                                          ──► sinkN.notify()
//! ```
//!
//! ## Rules
//! - **Fire-and-forget**: the runner never inspects sink behavior and
//!   carries no delivery guarantees.
//! - **Synchronous**: sinks run inline on the run thread; keep them cheap
//!   and hand heavy work to your own channels.
//! - The core makes no assumption about sink count; zero sinks is fine.

use crate::events::Event;

/// Lifecycle event sink.
///
/// Implementations decide what an event means: log line, metric, report
/// row. Handle errors internally; the runner ignores sink outcomes.
pub trait Dispatch: Send + Sync {
    /// Processes a single event, called inline at each lifecycle point.
    fn notify(&self, event: &Event);

    /// Returns the sink name used in diagnostics.
    ///
    /// Prefer short, descriptive names (e.g. "audit", "metrics"). The
    /// default uses `type_name`, which can be verbose.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Ordered fan-out over registered [`Dispatch`] sinks.
#[derive(Default)]
pub struct DispatcherSet {
    sinks: Vec<std::sync::Arc<dyn Dispatch>>,
}

impl DispatcherSet {
    /// Creates an empty set (events are dropped).
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    /// Creates a set from existing sinks.
    pub fn from_sinks(sinks: Vec<std::sync::Arc<dyn Dispatch>>) -> Self {
        Self { sinks }
    }

    /// Registers another sink at the end of the fan-out order.
    pub fn push(&mut self, sink: std::sync::Arc<dyn Dispatch>) {
        self.sinks.push(sink);
    }

    /// Number of registered sinks.
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// True when no sinks are registered.
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Fans the event out to every sink, in registration order.
    pub fn notify(&self, event: &Event) {
        for sink in &self.sinks {
            sink.notify(event);
        }
    }
}

/// Simple stdout logging sink for debugging and demos.
///
/// Enabled via the `logging` feature. Prints human-readable event
/// descriptions; implement your own [`Dispatch`] for structured logging
/// or metrics collection.
///
/// ## Output format
/// ```text
/// [run-started] node=web01
/// [started] resource=package[curl] action=install
/// [skipped] resource=file[motd] reason="not_if: test -f /etc/motd"
/// [retrying] resource=service[nginx] attempt=1 delay_ms=2000 err="exit 1"
/// [updated] resource=service[nginx] action=restart
/// [run-completed]
/// ```
#[cfg(feature = "logging")]
pub struct LogWriter;

#[cfg(feature = "logging")]
impl Dispatch for LogWriter {
    fn notify(&self, e: &Event) {
        use crate::events::EventKind;
        match e.kind {
            EventKind::RunStarted => {
                println!("[run-started] node={:?}", e.reason);
            }
            EventKind::RunCompleted => println!("[run-completed]"),
            EventKind::RunFailed => println!("[run-failed] err={:?}", e.reason),
            EventKind::ConvergeStarted => println!("[converge-started]"),
            EventKind::ConvergeCompleted => println!("[converge-completed]"),
            EventKind::ResourceStarted => {
                println!("[started] resource={:?} action={:?}", e.resource, e.action);
            }
            EventKind::ResourceSkipped => {
                println!("[skipped] resource={:?} reason={:?}", e.resource, e.reason);
            }
            EventKind::ResourceUpdated => {
                println!("[updated] resource={:?} action={:?}", e.resource, e.action);
            }
            EventKind::ResourceRetrying => {
                println!(
                    "[retrying] resource={:?} attempt={:?} delay_ms={:?} err={:?}",
                    e.resource, e.attempt, e.delay_ms, e.reason
                );
            }
            EventKind::ResourceFailed => {
                println!(
                    "[failed] resource={:?} action={:?} attempts={:?} err={:?}",
                    e.resource, e.action, e.attempt, e.reason
                );
            }
            EventKind::NotificationQueued => {
                println!(
                    "[notify-queued] target={:?} action={:?} from={:?}",
                    e.resource, e.action, e.reason
                );
            }
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}
