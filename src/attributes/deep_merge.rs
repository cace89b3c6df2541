//! # Deep merge of nested attribute components.
//!
//! Folding the precedence layers into the resolved view uses one rule:
//! mapping keys present on both sides merge recursively, everything else
//! (scalars **and** sequences) is replaced wholesale by the higher layer.
//!
//! ## Rules
//! - `{a: {x: 1}}` + `{a: {y: 2}}` → `{a: {x: 1, y: 2}}` (recursive union)
//! - `{list: [1, 2]}` + `{list: [3]}` → `{list: [3]}` (sequences never merge)
//! - `{v: 1}` + `{v: "s"}` → `{v: "s"}` (higher layer wins on scalars)

use serde_json::Value;

/// Merges `overlay` into `base` in place.
///
/// `base` is the lower-precedence accumulator; `overlay` is the higher
/// layer. Only object/object pairs merge recursively; any other pairing
/// replaces the base value outright.
pub fn deep_merge(base: &mut Value, overlay: &Value) {
    if let (Value::Object(base_map), Value::Object(overlay_map)) = (&mut *base, overlay) {
        for (key, overlay_value) in overlay_map {
            match base_map.get_mut(key) {
                Some(base_value) if base_value.is_object() && overlay_value.is_object() => {
                    deep_merge(base_value, overlay_value);
                }
                _ => {
                    base_map.insert(key.clone(), overlay_value.clone());
                }
            }
        }
    } else {
        *base = overlay.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_mapping_keys_merge_recursively() {
        let mut base = json!({"db": {"host": "a"}});
        deep_merge(&mut base, &json!({"db": {"port": 5432}}));
        assert_eq!(base, json!({"db": {"host": "a", "port": 5432}}));
    }

    #[test]
    fn test_sequences_replace_never_merge() {
        let mut base = json!({"list": [1, 2]});
        deep_merge(&mut base, &json!({"list": [3]}));
        assert_eq!(base, json!({"list": [3]}), "higher layer sequence must replace");
    }

    #[test]
    fn test_scalar_replaced_by_higher_layer() {
        let mut base = json!({"v": 1, "keep": true});
        deep_merge(&mut base, &json!({"v": "s"}));
        assert_eq!(base, json!({"v": "s", "keep": true}));
    }

    #[test]
    fn test_mapping_replaces_scalar_and_vice_versa() {
        let mut base = json!({"a": 1});
        deep_merge(&mut base, &json!({"a": {"nested": true}}));
        assert_eq!(base, json!({"a": {"nested": true}}));

        let mut base = json!({"a": {"nested": true}});
        deep_merge(&mut base, &json!({"a": 1}));
        assert_eq!(base, json!({"a": 1}));
    }

    #[test]
    fn test_deeply_nested_union() {
        let mut base = json!({"a": {"b": {"c": 1}}});
        deep_merge(&mut base, &json!({"a": {"b": {"d": 2}, "e": 3}}));
        assert_eq!(base, json!({"a": {"b": {"c": 1, "d": 2}, "e": 3}}));
    }
}
