//! # ProviderRegistry: resource type → provider resolution.
//!
//! Providers register per resource type, optionally with a platform
//! predicate. Resolution walks a type's entries in registration order
//! and takes the first entry whose predicate accepts the run's platform
//! (entries without a predicate accept everything).
//!
//! ## Rules
//! - Registration order is precedence: register platform-specific
//!   providers before generic fallbacks.
//! - Resolution never guesses across types; an unknown type fails with
//!   `NoProviderAvailable`.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::ConvergeError;
use crate::providers::provider::{Platform, Provider};

type PlatformPredicate = Box<dyn Fn(&Platform) -> bool + Send + Sync>;
type ProviderFactory = Box<dyn Fn() -> Arc<dyn Provider> + Send + Sync>;

struct Entry {
    name: String,
    predicate: Option<PlatformPredicate>,
    factory: ProviderFactory,
}

impl Entry {
    fn accepts(&self, platform: &Platform) -> bool {
        self.predicate.as_ref().map_or(true, |pred| pred(platform))
    }
}

/// Maps resource types to ordered provider entries.
#[derive(Default)]
pub struct ProviderRegistry {
    entries: HashMap<String, Vec<Entry>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a provider for `rtype` on every platform.
    pub fn register<F>(&mut self, rtype: impl Into<String>, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn Provider> + Send + Sync + 'static,
    {
        self.entries.entry(rtype.into()).or_default().push(Entry {
            name: name.into(),
            predicate: None,
            factory: Box::new(factory),
        });
    }

    /// Registers a provider for `rtype` on platforms the predicate accepts.
    pub fn register_for<P, F>(
        &mut self,
        rtype: impl Into<String>,
        name: impl Into<String>,
        predicate: P,
        factory: F,
    ) where
        P: Fn(&Platform) -> bool + Send + Sync + 'static,
        F: Fn() -> Arc<dyn Provider> + Send + Sync + 'static,
    {
        self.entries.entry(rtype.into()).or_default().push(Entry {
            name: name.into(),
            predicate: Some(Box::new(predicate)),
            factory: Box::new(factory),
        });
    }

    /// Resolves the provider for `rtype` on `platform`.
    pub fn resolve(
        &self,
        rtype: &str,
        platform: &Platform,
    ) -> Result<Arc<dyn Provider>, ConvergeError> {
        let entries = self
            .entries
            .get(rtype)
            .ok_or_else(|| ConvergeError::NoProviderAvailable {
                rtype: rtype.to_string(),
                platform: platform.to_string(),
            })?;
        for entry in entries {
            if entry.accepts(platform) {
                log::debug!("resolved {rtype} on {platform} to provider {}", entry.name);
                return Ok((entry.factory)());
            }
        }
        Err(ConvergeError::NoProviderAvailable {
            rtype: rtype.to_string(),
            platform: platform.to_string(),
        })
    }

    /// Registered resource types.
    pub fn types(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("types", &self.entries.len())
            .field("entries", &self.len())
            .finish()
    }
}
