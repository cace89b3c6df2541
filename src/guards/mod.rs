//! # Guards: conditional execution for resources.
//!
//! ```text
//!            ┌─────────────────────────────┐
//!            │          Resource           │
//!            │  only_if / not_if guards    │
//!            └──────────────┬──────────────┘
//!                           │ declaration order
//!                           ▼
//!            ┌─────────────────────────────┐
//!            │      GuardInterpreter       │
//!            │  ShellGuard / ResourceGuard │
//!            └──────────────┬──────────────┘
//!                           ▼
//!                 Pass / Fail  →  run or skip
//! ```

mod guard;
mod interpreter;

pub use guard::{Guard, GuardKind, GuardOptions, GuardOutcome, GuardTest};
pub use interpreter::{first_blocking, GuardInterpreter, ResourceGuard, ShellGuard};
