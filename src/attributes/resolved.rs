//! # Immutable, staleness-checked views over the merged attributes.
//!
//! [`ResolvedAttributes`] is the read-only wrapper returned by
//! [`AttributeStore::resolve`](crate::attributes::AttributeStore::resolve);
//! [`ResolvedView`] addresses a subtree of it by path. Both capture the
//! store serial they were built from and check it on **every** read, so a
//! view held across a store mutation fails loudly instead of answering
//! with outdated data.
//!
//! ## Rules
//! - Write-shaped methods always return
//!   [`AttributeError::ImmutableAttributeModification`].
//! - Reads after a store mutation return
//!   [`AttributeError::StaleAttributeRead`]; re-resolve to recover.
//! - [`ResolvedAttributes::fetch`] of an absent key is an
//!   [`AttributeError::UndefinedAttribute`]; [`ResolvedAttributes::get`]
//!   returns `Option` for membership-style reads.
//! - Subtrees are addressed by path relative to the root view, not by
//!   pointers into the store, so views carry no back-references.

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use serde_json::Value;

use crate::error::AttributeError;

/// Walks `path` down a nested value, `None` when any element is absent.
fn descend<'a, S: AsRef<str>>(mut node: &'a Value, path: &[S]) -> Option<&'a Value> {
    for seg in path {
        node = node.as_object()?.get(seg.as_ref())?;
    }
    Some(node)
}

/// Immutable merged view over all four precedence layers.
///
/// Cheap to clone; the merged tree is shared behind an `Arc`.
#[derive(Clone, Debug)]
pub struct ResolvedAttributes {
    root: Arc<Value>,
    serial: u64,
    current: Arc<AtomicU64>,
}

impl ResolvedAttributes {
    pub(crate) fn new(root: Arc<Value>, serial: u64, current: Arc<AtomicU64>) -> Self {
        Self {
            root,
            serial,
            current,
        }
    }

    /// Serial number the view was resolved at.
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// True once the store has been mutated since this view was resolved.
    pub fn is_stale(&self) -> bool {
        self.current.load(AtomicOrdering::Relaxed) != self.serial
    }

    fn check(&self) -> Result<(), AttributeError> {
        let current = self.current.load(AtomicOrdering::Relaxed);
        if current != self.serial {
            return Err(AttributeError::StaleAttributeRead {
                read: self.serial,
                current,
            });
        }
        Ok(())
    }

    /// The whole merged tree.
    pub fn as_value(&self) -> Result<&Value, AttributeError> {
        self.check()?;
        Ok(&self.root)
    }

    /// Membership-style read: `Ok(None)` when the path is absent.
    pub fn get(&self, path: &[&str]) -> Result<Option<&Value>, AttributeError> {
        self.check()?;
        Ok(descend(&self.root, path))
    }

    /// Attribute-style read: absent paths are an error.
    pub fn fetch(&self, path: &[&str]) -> Result<&Value, AttributeError> {
        self.check()?;
        descend(&self.root, path).ok_or_else(|| AttributeError::UndefinedAttribute {
            path: path.join("."),
        })
    }

    /// Top-level membership test against the merged view.
    pub fn has_key(&self, key: &str) -> Result<bool, AttributeError> {
        self.check()?;
        Ok(self
            .root
            .as_object()
            .is_some_and(|map| map.contains_key(key)))
    }

    /// Iterates the top-level entries of the merged view.
    pub fn iter(&self) -> Result<impl Iterator<Item = (&String, &Value)>, AttributeError> {
        self.check()?;
        Ok(self.root.as_object().into_iter().flat_map(|map| map.iter()))
    }

    /// Builds a subtree view addressed by `path`.
    pub fn at(&self, path: &[&str]) -> Result<ResolvedView, AttributeError> {
        self.check()?;
        if descend(&self.root, path).is_none() {
            return Err(AttributeError::UndefinedAttribute {
                path: path.join("."),
            });
        }
        Ok(ResolvedView {
            root: Arc::clone(&self.root),
            path: path.iter().map(|seg| (*seg).to_string()).collect(),
            serial: self.serial,
            current: Arc::clone(&self.current),
        })
    }

    /// Always fails: the merged view is read-only.
    pub fn insert(&self, _key: &str, _value: Value) -> Result<(), AttributeError> {
        Err(AttributeError::ImmutableAttributeModification)
    }

    /// Always fails: the merged view is read-only.
    pub fn remove(&self, _key: &str) -> Result<(), AttributeError> {
        Err(AttributeError::ImmutableAttributeModification)
    }
}

/// Read-only subtree of a [`ResolvedAttributes`], addressed by path.
///
/// Carries the same captured serial as its root view; reads on a stale
/// subtree fail the same way.
#[derive(Clone, Debug)]
pub struct ResolvedView {
    root: Arc<Value>,
    path: Vec<String>,
    serial: u64,
    current: Arc<AtomicU64>,
}

impl ResolvedView {
    /// Serial number the underlying view was resolved at.
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// True once the store has been mutated since resolution.
    pub fn is_stale(&self) -> bool {
        self.current.load(AtomicOrdering::Relaxed) != self.serial
    }

    fn check(&self) -> Result<(), AttributeError> {
        let current = self.current.load(AtomicOrdering::Relaxed);
        if current != self.serial {
            return Err(AttributeError::StaleAttributeRead {
                read: self.serial,
                current,
            });
        }
        Ok(())
    }

    fn node(&self) -> Result<&Value, AttributeError> {
        // The path was validated at creation; absence now would mean the
        // shared tree changed, which Arc immutability rules out.
        descend(&self.root, &self.path).ok_or_else(|| AttributeError::UndefinedAttribute {
            path: self.path.join("."),
        })
    }

    /// The subtree value itself.
    pub fn as_value(&self) -> Result<&Value, AttributeError> {
        self.check()?;
        self.node()
    }

    /// Membership-style read of a direct child.
    pub fn get(&self, key: &str) -> Result<Option<&Value>, AttributeError> {
        self.check()?;
        Ok(self.node()?.as_object().and_then(|map| map.get(key)))
    }

    /// Attribute-style read of a direct child; absence is an error.
    pub fn fetch(&self, key: &str) -> Result<&Value, AttributeError> {
        self.check()?;
        self.node()?
            .as_object()
            .and_then(|map| map.get(key))
            .ok_or_else(|| AttributeError::UndefinedAttribute {
                path: format!("{}.{key}", self.path.join(".")),
            })
    }

    /// Child subtree view.
    pub fn at(&self, key: &str) -> Result<ResolvedView, AttributeError> {
        self.check()?;
        // Validate the child exists before extending the address.
        self.fetch(key)?;
        let mut path = self.path.clone();
        path.push(key.to_string());
        Ok(ResolvedView {
            root: Arc::clone(&self.root),
            path,
            serial: self.serial,
            current: Arc::clone(&self.current),
        })
    }

    /// Always fails: resolved subtrees are read-only.
    pub fn insert(&self, _key: &str, _value: Value) -> Result<(), AttributeError> {
        Err(AttributeError::ImmutableAttributeModification)
    }

    /// Always fails: resolved subtrees are read-only.
    pub fn remove(&self, _key: &str) -> Result<(), AttributeError> {
        Err(AttributeError::ImmutableAttributeModification)
    }
}

#[cfg(test)]
mod tests {
    use crate::attributes::{AttributeStore, Layer};
    use serde_json::json;

    fn seeded() -> AttributeStore {
        let mut store = AttributeStore::new();
        store
            .write(Layer::Default, &["db"], json!({"host": "a", "port": 5432}))
            .unwrap();
        store.write(Layer::Override, &["tag"], json!("prod")).unwrap();
        store
    }

    #[test]
    fn test_writes_against_resolved_view_fail() {
        let store = seeded();
        let resolved = store.resolve();
        let err = resolved
            .insert("k", json!(1))
            .expect_err("merged view must be immutable");
        assert_eq!(err.as_label(), "attr_immutable_modification");
        let err = resolved.remove("db").expect_err("remove must fail too");
        assert_eq!(err.as_label(), "attr_immutable_modification");
    }

    #[test]
    fn test_stale_read_after_mutation() {
        let mut store = seeded();
        let resolved = store.resolve();
        assert!(!resolved.is_stale());

        store.write(Layer::Normal, &["db", "port"], json!(6000)).unwrap();
        assert!(resolved.is_stale());
        let err = resolved
            .get(&["db"])
            .expect_err("reading a stale view must fail");
        assert_eq!(err.as_label(), "attr_stale_read");

        // Re-resolving recovers and sees the mutation.
        let fresh = store.resolve();
        assert_eq!(fresh.fetch(&["db", "port"]).unwrap(), &json!(6000));
    }

    #[test]
    fn test_subview_carries_serial_and_goes_stale() {
        let mut store = seeded();
        let view = store.resolve().at(&["db"]).unwrap();
        assert_eq!(view.fetch("host").unwrap(), &json!("a"));

        store.write(Layer::Automatic, &["fact"], json!(true)).unwrap();
        assert!(view.is_stale());
        let err = view.get("host").expect_err("stale subview must refuse reads");
        assert_eq!(err.as_label(), "attr_stale_read");
    }

    #[test]
    fn test_fetch_of_undefined_key_errors_get_does_not() {
        let store = seeded();
        let resolved = store.resolve();
        assert!(resolved.get(&["missing"]).unwrap().is_none());
        let err = resolved
            .fetch(&["missing", "deeper"])
            .expect_err("attribute-style access of an undefined key must fail");
        assert_eq!(err.as_label(), "attr_undefined");
        assert!(err.as_message().contains("missing.deeper"));
    }

    #[test]
    fn test_iter_and_has_key() {
        let store = seeded();
        let resolved = store.resolve();
        assert!(resolved.has_key("db").unwrap());
        assert!(!resolved.has_key("absent").unwrap());
        let keys: Vec<&String> = resolved.iter().unwrap().map(|(k, _)| k).collect();
        assert!(keys.contains(&&"db".to_string()));
        assert!(keys.contains(&&"tag".to_string()));
    }

    #[test]
    fn test_nested_subview_child() {
        let store = seeded();
        let db = store.resolve().at(&["db"]).unwrap();
        let err = db.at("nope").expect_err("child view of absent key must fail");
        assert_eq!(err.as_label(), "attr_undefined");
        assert_eq!(db.as_value().unwrap(), &json!({"host": "a", "port": 5432}));
    }
}
