//! Values handling with Helm-style coalescing

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::Result;

/// Values container with deep merge capability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Values(pub JsonValue);

impl Default for Values {
    fn default() -> Self {
        Self::new()
    }
}

impl Values {
    /// Create empty values
    pub fn new() -> Self {
        Self(JsonValue::Object(serde_json::Map::new()))
    }

    /// Parse values from YAML string; an empty document yields empty values
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let value: JsonValue = serde_yaml::from_str(yaml)?;
        Ok(Self::from(value))
    }

    /// Deep merge another Values into this one
    ///
    /// Rules:
    /// - Scalars: overlay replaces base
    /// - Objects: recursive merge
    /// - Arrays: overlay replaces base (not appended)
    pub fn merge(&mut self, overlay: &Values) {
        deep_merge(&mut self.0, &overlay.0);
    }

    /// Coalesce user supplied values over chart defaults
    ///
    /// Same as `merge` except that a `null` in `overrides` removes the key
    /// from the result instead of being stored.
    pub fn coalesce(defaults: &Values, overrides: &Values) -> Values {
        let mut result = defaults.0.clone();
        coalesce_into(&mut result, &overrides.0);
        Values::from(result)
    }

    /// Get a value by dotted path
    pub fn get(&self, path: &str) -> Option<&JsonValue> {
        let parts: Vec<&str> = path.split('.').collect();
        get_nested(&self.0, &parts)
    }

    /// Get the inner JSON value
    pub fn inner(&self) -> &JsonValue {
        &self.0
    }

    /// Convert to JSON value
    pub fn into_inner(self) -> JsonValue {
        self.0
    }

    /// Check if values are empty
    pub fn is_empty(&self) -> bool {
        match &self.0 {
            JsonValue::Object(map) => map.is_empty(),
            JsonValue::Null => true,
            _ => false,
        }
    }

    /// Values visible to a subchart rendered under `scope_name`
    ///
    /// The subchart sees `<scope_name>.*` from the parent as its root values,
    /// coalesced over its own defaults. Parent globals are merged over the
    /// subchart's globals.
    pub fn for_subchart(subchart_defaults: &Values, parent: &Values, scope_name: &str) -> Values {
        let scoped = parent.scope_for_subchart(scope_name);
        let mut result = Values::coalesce(subchart_defaults, &scoped);

        if let Some(JsonValue::Object(parent_global)) = parent.0.get("global") {
            if let JsonValue::Object(map) = &mut result.0 {
                let global = map
                    .entry("global".to_string())
                    .or_insert_with(|| JsonValue::Object(serde_json::Map::new()));
                deep_merge(global, &JsonValue::Object(parent_global.clone()));
            }
        }
        result
    }

    /// Extract the values under `subchart_name` as a root object
    pub fn scope_for_subchart(&self, subchart_name: &str) -> Values {
        let mut scoped = serde_json::Map::new();

        if let JsonValue::Object(parent_obj) = &self.0 {
            if let Some(JsonValue::Object(subchart_obj)) = parent_obj.get(subchart_name) {
                for (k, v) in subchart_obj {
                    scoped.insert(k.clone(), v.clone());
                }
            }
        }

        Values(JsonValue::Object(scoped))
    }
}

impl From<JsonValue> for Values {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => Values::new(),
            other => Values(other),
        }
    }
}

/// Deep merge two JSON values
fn deep_merge(base: &mut JsonValue, overlay: &JsonValue) {
    match (base, overlay) {
        (JsonValue::Object(base_map), JsonValue::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => {
                        base_map.insert(key.clone(), overlay_value.clone());
                    }
                }
            }
        }
        (base, overlay) => {
            *base = overlay.clone();
        }
    }
}

fn coalesce_into(base: &mut JsonValue, overlay: &JsonValue) {
    match (base, overlay) {
        (JsonValue::Object(base_map), JsonValue::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                if overlay_value.is_null() {
                    base_map.remove(key);
                    continue;
                }
                match base_map.get_mut(key) {
                    Some(base_value) => coalesce_into(base_value, overlay_value),
                    None => {
                        base_map.insert(key.clone(), strip_nulls(overlay_value));
                    }
                }
            }
        }
        (base, overlay) => {
            *base = strip_nulls(overlay);
        }
    }
}

fn strip_nulls(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(map) => JsonValue::Object(
            map.iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), strip_nulls(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Get a nested value by path
fn get_nested<'a>(value: &'a JsonValue, path: &[&str]) -> Option<&'a JsonValue> {
    if path.is_empty() {
        return Some(value);
    }

    match value {
        JsonValue::Object(map) => map.get(path[0]).and_then(|v| get_nested(v, &path[1..])),
        _ => None,
    }
}
