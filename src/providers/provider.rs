//! # Provider: how a resource's desired state becomes real.
//!
//! A [`Provider`] inspects the current system state, decides what must
//! change, and stages the change as named steps in a [`ConvergeActions`]
//! set. Converging the set either executes the steps or, in why-run
//! mode, narrates them without touching the system.
//!
//! ## Rules
//! - A provider reports [`ConvergeOutcome::Updated`] only when it staged
//!   at least one step; "already converged" is `Unchanged`.
//! - Why-run is decided by the set, not the provider: providers stage the
//!   same steps either way.

use std::fmt;

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::resources::{Action, Resource};
use crate::run::RunContext;

/// What a provider's action did to the system.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConvergeOutcome {
    /// The system already matched the desired state.
    Unchanged,
    /// At least one change was made (or, in why-run, would have been).
    Updated,
}

impl ConvergeOutcome {
    pub fn updated(&self) -> bool {
        matches!(self, ConvergeOutcome::Updated)
    }
}

/// The platform a run executes against, used for provider selection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Platform {
    pub family: String,
    pub name: String,
    pub version: String,
}

impl Platform {
    pub fn new(
        family: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            family: family.into(),
            name: name.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({})", self.name, self.version, self.family)
    }
}

type Step = Box<dyn FnOnce() -> Result<(), ProviderError> + Send>;

/// Staged change steps for one provider action.
///
/// Each step carries a human-readable description. [`converge`](Self::converge)
/// runs the steps in order, or in why-run mode logs the descriptions and
/// runs nothing.
pub struct ConvergeActions {
    why_run: bool,
    steps: Vec<(String, Step)>,
}

impl ConvergeActions {
    pub fn new(why_run: bool) -> Self {
        Self {
            why_run,
            steps: Vec::new(),
        }
    }

    /// Stages one change step.
    pub fn stage<F>(&mut self, description: impl Into<String>, step: F)
    where
        F: FnOnce() -> Result<(), ProviderError> + Send + 'static,
    {
        self.steps.push((description.into(), Box::new(step)));
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Executes (or narrates) the staged steps in order.
    ///
    /// `Updated` when any step was staged, even in why-run mode, so
    /// notification behavior matches what a real run would do.
    pub fn converge(self) -> Result<ConvergeOutcome, ProviderError> {
        if self.steps.is_empty() {
            return Ok(ConvergeOutcome::Unchanged);
        }
        for (description, step) in self.steps {
            if self.why_run {
                log::info!("would {description}");
            } else {
                log::debug!("{description}");
                step()?;
            }
        }
        Ok(ConvergeOutcome::Updated)
    }
}

impl fmt::Debug for ConvergeActions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConvergeActions")
            .field("why_run", &self.why_run)
            .field("steps", &self.steps.len())
            .finish()
    }
}

/// Implements a resource type's actions against the real system.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Runs `action` for `resource`, reporting whether anything changed.
    ///
    /// The resource is a snapshot of its declaration; run-wide state
    /// (node attributes, configuration) is read through `ctx`.
    async fn run_action(
        &self,
        resource: &Resource,
        action: &Action,
        ctx: &mut RunContext,
    ) -> Result<ConvergeOutcome, ProviderError>;

    /// Provider name for logs and events.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}
