//! Error types used by the convergence runtime and its collaborators.
//!
//! This module defines the error enums for each subsystem:
//!
//! - [`AttributeError`] — misuse of the attribute store or its resolved views.
//! - [`ProviderError`] — failures raised by provider action bodies.
//! - [`SourceError`] — transport failures from out-of-core collaborators
//!   (remote data sources, node persistence).
//! - [`ConvergeError`] — run-fatal failures raised by the runner itself.
//!
//! All enums provide `as_label`/`as_message` helpers for logging and
//! reporting. Guard command failures are deliberately **not** errors: they
//! are ordinary [`GuardOutcome`](crate::guards::GuardOutcome) values, since
//! a failing guard is expected control flow, not an exceptional condition.

use serde::Serialize;
use thiserror::Error;

/// # Errors produced by the attribute store.
///
/// These represent caller mistakes against the precedence store or a
/// resolved view. They are local to the offending access and never abort
/// a run on their own.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum AttributeError {
    /// A write was attempted against the immutable merged view.
    #[error(
        "node attributes are read-only when you do not specify a precedence layer; \
         write through the store instead, e.g. `store.write(Layer::Default, ..)`"
    )]
    ImmutableAttributeModification,

    /// A resolved subtree was read after the store changed underneath it.
    #[error(
        "node attributes were modified since this view was resolved \
         (read serial {read}, current {current}); re-resolve to get fresh values"
    )]
    StaleAttributeRead {
        /// Serial number captured when the view was built.
        read: u64,
        /// Serial number of the store at read time.
        current: u64,
    },

    /// Attribute-style access of a key that exists in no layer.
    #[error("undefined attribute `{path}` on node")]
    UndefinedAttribute {
        /// Dotted path of the missing attribute.
        path: String,
    },

    /// Auto-vivification hit an existing non-mapping value on the path.
    #[error("cannot descend into `{path}`: existing value is not a mapping")]
    TypeConflict {
        /// Dotted path of the conflicting element.
        path: String,
    },
}

impl AttributeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            AttributeError::ImmutableAttributeModification => "attr_immutable_modification",
            AttributeError::StaleAttributeRead { .. } => "attr_stale_read",
            AttributeError::UndefinedAttribute { .. } => "attr_undefined",
            AttributeError::TypeConflict { .. } => "attr_type_conflict",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        self.to_string()
    }
}

/// # Transport errors from out-of-core collaborators.
///
/// The remote data source and node persistence collaborators surface their
/// failures through this type. Retries/backoff for these transports are the
/// collaborator's responsibility, not the runner's.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SourceError {
    /// Local I/O failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The remote side rejected or failed the request.
    #[error("remote source failed: {message}")]
    Remote {
        /// Collaborator-supplied failure description.
        message: String,
    },
}

/// # Errors produced by provider action bodies.
///
/// A provider reports what went wrong while loading current state or
/// performing a converge action. The runner decides whether to retry based
/// on the resource's retry policy, not on the error variant.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Local I/O failure while examining or mutating system state.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// An external command run by the provider failed.
    #[error("command failed: {message}")]
    Command {
        /// Exit status or failure description.
        message: String,
    },

    /// A collaborator data fetch failed.
    #[error("data source error: {0}")]
    Source(#[from] SourceError),

    /// Provider-specific failure.
    #[error("{0}")]
    Other(String),
}

impl ProviderError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ProviderError::Io(_) => "provider_io",
            ProviderError::Command { .. } => "provider_command",
            ProviderError::Source(_) => "provider_source",
            ProviderError::Other(_) => "provider_other",
        }
    }
}

/// # Run-fatal errors raised by the convergence runner.
///
/// The run stops at the first unrecovered `ConvergeError`; everything
/// already converged stays converged (no rollback).
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConvergeError {
    /// No registered provider accepted the (resource type, platform) pair.
    #[error("no provider available for resource type `{rtype}` on platform {platform}")]
    NoProviderAvailable {
        /// Resource type that needed a provider.
        rtype: String,
        /// Display form of the platform descriptor.
        platform: String,
    },

    /// A resource action failed after exhausting its retries.
    #[error("{resource} action `{action}` failed after {attempts} attempt(s): {source}")]
    ActionFailed {
        /// Display form of the failing resource (`type[name]`).
        resource: String,
        /// Action that was being converged.
        action: String,
        /// Total attempts performed, including the first.
        attempts: u32,
        /// The original provider failure, re-raised after retries.
        #[source]
        source: ProviderError,
    },

    /// A notification edge pointed at a resource the collection does not hold.
    #[error("notification target {target} not found in the resource collection")]
    UnknownNotificationTarget {
        /// Display form of the missing target.
        target: String,
    },

    /// Handing the node to the persistence collaborator failed.
    #[error("node persistence failed: {source}")]
    PersistFailed {
        #[source]
        source: SourceError,
    },

    /// The run token was cancelled at a safe point.
    #[error("run cancelled")]
    Canceled,
}

impl ConvergeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConvergeError::NoProviderAvailable { .. } => "converge_no_provider",
            ConvergeError::ActionFailed { .. } => "converge_action_failed",
            ConvergeError::UnknownNotificationTarget { .. } => "converge_unknown_target",
            ConvergeError::PersistFailed { .. } => "converge_persist_failed",
            ConvergeError::Canceled => "converge_canceled",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        self.to_string()
    }

    /// Builds the structured failure report handed to the error-report
    /// collaborator, if this error concerns a single resource.
    pub fn to_report(&self) -> Option<FailureReport> {
        match self {
            ConvergeError::ActionFailed {
                resource,
                action,
                attempts,
                source,
            } => Some(FailureReport {
                resource: resource.clone(),
                action: action.clone(),
                attempts: *attempts,
                message: source.to_string(),
            }),
            ConvergeError::NoProviderAvailable { rtype, platform } => Some(FailureReport {
                resource: rtype.clone(),
                action: String::new(),
                attempts: 0,
                message: format!("no provider available on platform {platform}"),
            }),
            _ => None,
        }
    }
}

/// Structured failure report: the contract handed to the error-report
/// collaborator when a run stops.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct FailureReport {
    /// Display form of the failing resource (`type[name]`).
    pub resource: String,
    /// Action that was being converged.
    pub action: String,
    /// Total attempts performed.
    pub attempts: u32,
    /// Underlying failure message.
    pub message: String,
}
