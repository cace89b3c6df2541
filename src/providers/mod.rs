//! # Providers: platform-specific implementations of resource actions.
//!
//! ```text
//!   Resource "package[curl]" ── action: install
//!        │
//!        ▼
//!   ProviderRegistry.resolve("package", platform)
//!        │  registration order, first accepting predicate wins
//!        ▼
//!   Provider.run_action(resource, action, ctx)
//!        │  stages steps into ConvergeActions
//!        ▼
//!   converge() → Unchanged | Updated   (why-run narrates instead)
//! ```

mod provider;
mod registry;

pub use provider::{ConvergeActions, ConvergeOutcome, Platform, Provider};
pub use registry::ProviderRegistry;
