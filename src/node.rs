//! # Node: the target machine's identity and configuration.
//!
//! A [`Node`] pairs a stable name with one [`AttributeStore`]. It is
//! created once per run, mutated throughout (providers write discovered
//! facts into the `automatic` layer), and handed to the [`Persist`]
//! collaborator when the run completes. Storage format is the
//! collaborator's business, not ours.

use async_trait::async_trait;
use serde_json::Value;

use crate::attributes::{AttributeStore, Layer};
use crate::error::{AttributeError, SourceError};

/// One `(layer, path, value)` write produced by the recipe/DSL loader
/// before the runner starts.
#[derive(Clone, Debug)]
pub struct SeedWrite {
    /// Target precedence layer.
    pub layer: Layer,
    /// Nested path, outermost key first.
    pub path: Vec<String>,
    /// Value to write at the path.
    pub value: Value,
}

impl SeedWrite {
    /// Convenience constructor for loader code and tests.
    pub fn new(layer: Layer, path: &[&str], value: Value) -> Self {
        Self {
            layer,
            path: path.iter().map(|seg| (*seg).to_string()).collect(),
            value,
        }
    }
}

/// Identity plus attribute store for the machine being converged.
#[derive(Debug)]
pub struct Node {
    name: String,
    attributes: AttributeStore,
}

impl Node {
    /// Creates a node with an empty attribute store.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: AttributeStore::new(),
        }
    }

    /// The node's stable name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Read access to the attribute store.
    pub fn attributes(&self) -> &AttributeStore {
        &self.attributes
    }

    /// Write access to the attribute store.
    pub fn attributes_mut(&mut self) -> &mut AttributeStore {
        &mut self.attributes
    }

    /// Applies loader seed writes in order.
    ///
    /// Stops at the first failing write; earlier writes stay applied, the
    /// same way a partially evaluated attribute file would leave the node.
    pub fn apply_seed(
        &mut self,
        writes: impl IntoIterator<Item = SeedWrite>,
    ) -> Result<(), AttributeError> {
        for seed in writes {
            let path: Vec<&str> = seed.path.iter().map(String::as_str).collect();
            self.attributes.write(seed.layer, &path, seed.value)?;
        }
        Ok(())
    }
}

/// # Node persistence collaborator.
///
/// The runner hands the node over once a run completes successfully, so
/// the post-run `automatic` facts survive. Implementations own retries,
/// serialization, and storage format.
#[async_trait]
pub trait Persist: Send + Sync {
    /// Persists the node. Failures surface as
    /// [`ConvergeError::PersistFailed`](crate::error::ConvergeError::PersistFailed).
    async fn persist(&self, node: &Node) -> Result<(), SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_apply_seed_in_order() {
        let mut node = Node::new("web01");
        node.apply_seed(vec![
            SeedWrite::new(Layer::Default, &["app", "port"], json!(80)),
            SeedWrite::new(Layer::Normal, &["app", "port"], json!(8080)),
        ])
        .unwrap();
        assert_eq!(node.attributes().read(&["app", "port"]), Some(json!(8080)));
        assert_eq!(node.name(), "web01");
    }

    #[test]
    fn test_apply_seed_stops_on_conflict() {
        let mut node = Node::new("web01");
        let err = node
            .apply_seed(vec![
                SeedWrite::new(Layer::Default, &["flag"], json!(true)),
                SeedWrite::new(Layer::Default, &["flag", "deeper"], json!(1)),
            ])
            .expect_err("seed through a scalar must fail");
        assert_eq!(err.as_label(), "attr_type_conflict");
        // The earlier write remains applied.
        assert_eq!(node.attributes().read(&["flag"]), Some(json!(true)));
    }
}
