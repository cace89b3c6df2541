//! Layered attribute storage: precedence, deep merge, immutable views.
//!
//! ## Contents
//! - [`Layer`], [`AttributeStore`] — four precedence-ordered mutable
//!   components with a serial-numbered, memoized merged view
//! - [`deep_merge`] — the layer fold rule (maps union, sequences replace)
//! - [`ResolvedAttributes`], [`ResolvedView`] — immutable,
//!   staleness-checked read API over the merged result
//!
//! ## Quick wiring
//! ```text
//! store.write(layer, path, value)  ─► serial += 1, cache dropped
//! store.resolve()                  ─► fold layers low→high, memoize
//! resolved.get/fetch/at(..)        ─► stale-checked reads
//! resolved.insert(..)              ─► ImmutableAttributeModification
//! ```

mod deep_merge;
mod resolved;
mod store;

pub use deep_merge::deep_merge;
pub use resolved::{ResolvedAttributes, ResolvedView};
pub use store::{AttributeStore, Layer};
