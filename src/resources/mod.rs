//! # Resources: declared units of desired state.
//!
//! ```text
//!   ResourceCollection (declaration order + id index)
//!        │
//!        ├── Resource  ──  properties, guards, failure policy
//!        │       │
//!        │       └── Notification { action, target, timing }
//!        │
//!        └── Action ("create", "restart", "nothing", ...)
//! ```

mod collection;
mod notification;
mod resource;

pub use collection::ResourceCollection;
pub use notification::{Notification, Timing};
pub use resource::{Action, Resource, ResourceId};
