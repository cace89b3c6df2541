//! # Precedence-ordered attribute store.
//!
//! [`AttributeStore`] holds four independently mutable components, one per
//! [`Layer`], and resolves them into a single immutable merged view.
//!
//! ## Architecture
//! ```text
//! Layer::Default ──┐
//! Layer::Normal  ──┼── deep_merge (ascending) ──► ResolvedAttributes
//! Layer::Override──┤                               (immutable, cached)
//! Layer::Automatic─┘
//! ```
//!
//! ## Rules
//! - Every mutation bumps a monotonically increasing `serial_number` and
//!   drops the cached merged view; resolution is recomputed lazily.
//! - Resolved views capture the serial they were built from and refuse
//!   reads once the store has moved on (`StaleAttributeRead`).
//! - Writing a deep path auto-vivifies intermediate mappings; hitting an
//!   existing non-mapping on the way is a `TypeConflict`.
//! - The store is mutated only by the single run thread; the cache mutex
//!   exists so shared resolved handles stay `Send + Sync`.

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::{Map, Value};

use crate::attributes::deep_merge::deep_merge;
use crate::attributes::resolved::ResolvedAttributes;
use crate::error::AttributeError;

/// One of the named precedence layers, in ascending precedence order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Layer {
    /// Lowest precedence: cookbook/recipe defaults.
    Default = 0,
    /// Normal attributes, set during the run or seeded by the loader.
    Normal = 1,
    /// Override attributes.
    Override = 2,
    /// Highest precedence: discovered system facts.
    Automatic = 3,
}

impl Layer {
    /// All layers in ascending precedence order (the merge fold order).
    pub const ASCENDING: [Layer; 4] = [
        Layer::Default,
        Layer::Normal,
        Layer::Override,
        Layer::Automatic,
    ];

    /// Returns the layer name as used in logs and seed data.
    pub fn as_str(&self) -> &'static str {
        match self {
            Layer::Default => "default",
            Layer::Normal => "normal",
            Layer::Override => "override",
            Layer::Automatic => "automatic",
        }
    }

    #[inline]
    fn index(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Four-layer precedence store with a cached immutable merged view.
#[derive(Debug)]
pub struct AttributeStore {
    /// Layer components, indexed by `Layer`; each is always a JSON object.
    components: [Value; 4],
    /// Serial cell shared with resolved views for staleness checks.
    serial: Arc<AtomicU64>,
    /// Memoized merged view, dropped on every mutation.
    cache: Mutex<Option<ResolvedAttributes>>,
}

impl AttributeStore {
    /// Creates an empty store (all four layers empty, serial 0).
    pub fn new() -> Self {
        Self {
            components: [
                Value::Object(Map::new()),
                Value::Object(Map::new()),
                Value::Object(Map::new()),
                Value::Object(Map::new()),
            ],
            serial: Arc::new(AtomicU64::new(0)),
            cache: Mutex::new(None),
        }
    }

    /// Returns the current serial number.
    ///
    /// Strictly increases on every mutation to any layer.
    pub fn serial_number(&self) -> u64 {
        self.serial.load(AtomicOrdering::Relaxed)
    }

    /// Shared serial cell handed to resolved views.
    pub(crate) fn serial_cell(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.serial)
    }

    /// Returns the raw component of one layer.
    pub fn component(&self, layer: Layer) -> &Value {
        &self.components[layer.index()]
    }

    /// Replaces a whole layer component.
    ///
    /// `data` must be a mapping; anything else is a [`AttributeError::TypeConflict`].
    pub fn set_component(&mut self, layer: Layer, data: Value) -> Result<(), AttributeError> {
        if !data.is_object() {
            return Err(AttributeError::TypeConflict {
                path: layer.as_str().to_string(),
            });
        }
        self.components[layer.index()] = data;
        self.touch();
        Ok(())
    }

    /// Empties one layer component.
    pub fn clear_layer(&mut self, layer: Layer) {
        self.components[layer.index()] = Value::Object(Map::new());
        self.touch();
    }

    /// Writes `value` at `path` in one layer, auto-vivifying intermediate
    /// mappings.
    ///
    /// An empty `path` replaces the whole component (see [`Self::set_component`]).
    /// An existing non-mapping value on an intermediate path element is a
    /// [`AttributeError::TypeConflict`]; the store is left untouched.
    pub fn write(
        &mut self,
        layer: Layer,
        path: &[&str],
        value: Value,
    ) -> Result<(), AttributeError> {
        let (last, mids) = match path.split_last() {
            Some(split) => split,
            None => return self.set_component(layer, value),
        };

        // Validate before mutating so a conflict leaves no half-vivified path.
        let mut cursor: Option<&Value> = Some(&self.components[layer.index()]);
        let mut crumbs: Vec<&str> = Vec::new();
        for seg in mids {
            let next = match cursor {
                Some(Value::Object(map)) => map.get(*seg),
                Some(_) => {
                    return Err(AttributeError::TypeConflict {
                        path: crumbs.join("."),
                    })
                }
                None => None,
            };
            crumbs.push(seg);
            cursor = next;
        }
        if let Some(found) = cursor {
            if !found.is_object() {
                return Err(AttributeError::TypeConflict {
                    path: crumbs.join("."),
                });
            }
        }

        let mut node = &mut self.components[layer.index()];
        for seg in mids {
            let map = match node.as_object_mut() {
                Some(map) => map,
                // Unreachable after validation; kept total rather than panicking.
                None => {
                    return Err(AttributeError::TypeConflict {
                        path: mids.join("."),
                    })
                }
            };
            node = map
                .entry((*seg).to_string())
                .or_insert_with(|| Value::Object(Map::new()));
        }
        match node.as_object_mut() {
            Some(map) => {
                map.insert((*last).to_string(), value);
            }
            None => {
                return Err(AttributeError::TypeConflict {
                    path: mids.join("."),
                })
            }
        }

        self.touch();
        Ok(())
    }

    /// Membership test across all layers (union), at the top level.
    pub fn has_key(&self, key: &str) -> bool {
        Layer::ASCENDING.iter().any(|layer| {
            self.components[layer.index()]
                .as_object()
                .is_some_and(|map| map.contains_key(key))
        })
    }

    /// Reads a value from the merged view, cloning it out.
    ///
    /// Returns `None` when the path is absent in every layer.
    pub fn read(&self, path: &[&str]) -> Option<Value> {
        let resolved = self.resolve();
        match resolved.get(path) {
            Ok(Some(value)) => Some(value.clone()),
            _ => None,
        }
    }

    /// Resolves the merged view, memoized until the next mutation.
    ///
    /// Layers fold in ascending precedence order through
    /// [`deep_merge`](crate::attributes::deep_merge::deep_merge); the result
    /// is wrapped in an immutable [`ResolvedAttributes`] carrying the serial
    /// it was built from.
    pub fn resolve(&self) -> ResolvedAttributes {
        let serial = self.serial_number();
        let mut cache = self.cache_lock();
        if let Some(resolved) = cache.as_ref() {
            if resolved.serial() == serial {
                return resolved.clone();
            }
        }

        log::debug!("resolving merged attributes at serial {serial}");
        let mut merged = Value::Object(Map::new());
        for layer in Layer::ASCENDING {
            deep_merge(&mut merged, self.component(layer));
        }
        let resolved = ResolvedAttributes::new(Arc::new(merged), serial, self.serial_cell());
        *cache = Some(resolved.clone());
        resolved
    }

    /// Bumps the serial and drops the memoized merged view.
    fn touch(&mut self) {
        self.serial.fetch_add(1, AtomicOrdering::Relaxed);
        *self.cache_lock() = None;
    }

    fn cache_lock(&self) -> MutexGuard<'_, Option<ResolvedAttributes>> {
        match self.cache.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for AttributeStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_order_highest_layer_wins() {
        let mut store = AttributeStore::new();
        store.write(Layer::Default, &["v"], json!(1)).unwrap();
        store.write(Layer::Normal, &["v"], json!(2)).unwrap();
        store.write(Layer::Override, &["v"], json!(3)).unwrap();
        store.write(Layer::Automatic, &["v"], json!(4)).unwrap();
        assert_eq!(store.read(&["v"]), Some(json!(4)));

        let mut store = AttributeStore::new();
        store.write(Layer::Default, &["v"], json!(1)).unwrap();
        store.write(Layer::Override, &["v"], json!(3)).unwrap();
        assert_eq!(store.read(&["v"]), Some(json!(3)), "override beats default");
    }

    #[test]
    fn test_sequence_replacement_across_layers() {
        let mut store = AttributeStore::new();
        store.write(Layer::Default, &["list"], json!([1, 2])).unwrap();
        store.write(Layer::Override, &["list"], json!([3])).unwrap();
        assert_eq!(
            store.read(&["list"]),
            Some(json!([3])),
            "sequences must be replaced, not concatenated"
        );
    }

    #[test]
    fn test_deep_merge_union_across_layers() {
        let mut store = AttributeStore::new();
        store
            .write(Layer::Default, &["db"], json!({"host": "a"}))
            .unwrap();
        store
            .write(Layer::Override, &["db"], json!({"port": 5432}))
            .unwrap();
        assert_eq!(
            store.read(&["db"]),
            Some(json!({"host": "a", "port": 5432}))
        );
    }

    #[test]
    fn test_auto_vivification_on_empty_store() {
        let mut store = AttributeStore::new();
        store.write(Layer::Default, &["a", "b"], json!(1)).unwrap();
        assert_eq!(store.read(&["a", "b"]), Some(json!(1)));
        assert_eq!(store.read(&["a"]), Some(json!({"b": 1})));
    }

    #[test]
    fn test_type_conflict_leaves_store_untouched() {
        let mut store = AttributeStore::new();
        store.write(Layer::Default, &["a"], json!(1)).unwrap();
        let serial = store.serial_number();

        let err = store
            .write(Layer::Default, &["a", "b", "c"], json!(2))
            .expect_err("descending through a scalar must fail");
        assert_eq!(err.as_label(), "attr_type_conflict");
        assert_eq!(store.serial_number(), serial, "failed write must not bump serial");
        assert_eq!(store.read(&["a"]), Some(json!(1)));
    }

    #[test]
    fn test_serial_strictly_increases_and_cache_invalidates() {
        let mut store = AttributeStore::new();
        store.write(Layer::Default, &["v"], json!(1)).unwrap();
        let first = store.serial_number();
        assert_eq!(store.read(&["v"]), Some(json!(1)));

        store.write(Layer::Normal, &["v"], json!(2)).unwrap();
        assert!(store.serial_number() > first, "serial must strictly increase");
        assert_eq!(store.read(&["v"]), Some(json!(2)), "second read sees the mutation");
    }

    #[test]
    fn test_resolve_is_memoized_until_mutation() {
        let mut store = AttributeStore::new();
        store.write(Layer::Default, &["v"], json!(1)).unwrap();
        let a = store.resolve();
        let b = store.resolve();
        assert_eq!(a.serial(), b.serial());

        store.write(Layer::Default, &["v"], json!(2)).unwrap();
        let c = store.resolve();
        assert!(c.serial() > a.serial());
    }

    #[test]
    fn test_has_key_is_layer_union() {
        let mut store = AttributeStore::new();
        store.write(Layer::Default, &["only_default"], json!(1)).unwrap();
        store.write(Layer::Automatic, &["only_auto"], json!(2)).unwrap();
        assert!(store.has_key("only_default"));
        assert!(store.has_key("only_auto"));
        assert!(!store.has_key("absent"));
    }

    #[test]
    fn test_set_component_rejects_non_mapping() {
        let mut store = AttributeStore::new();
        let err = store
            .set_component(Layer::Normal, json!([1, 2]))
            .expect_err("a layer component must be a mapping");
        assert_eq!(err.as_label(), "attr_type_conflict");
    }

    #[test]
    fn test_empty_path_replaces_component() {
        let mut store = AttributeStore::new();
        store.write(Layer::Normal, &[], json!({"k": "v"})).unwrap();
        assert_eq!(store.read(&["k"]), Some(json!("v")));
    }
}
