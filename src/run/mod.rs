//! # Run: context, runner, and collaborators for one convergence run.
//!
//! ```text
//!   RunContext ── node, collection, registry, config, dispatchers
//!        │
//!        ▼
//!   Runner.converge()
//!        ├── main pass (declaration order, guards, retries)
//!        ├── delayed notifications (deduped)
//!        └── persist node → RunSummary
//! ```

mod context;
mod runner;

pub use context::{DataFetch, RunContext, RunContextBuilder};
pub use runner::{RunSummary, Runner};
