//! Kubernetes resource documents
//!
//! A [`ResourceNode`] is one parsed YAML document. Only a handful of fields
//! are interpreted (apiVersion, kind, metadata.namespace, metadata.name);
//! everything else is carried through untouched, in its original key order.

use serde_yaml::{Mapping, Value as YamlValue};
use std::io::Write;

use crate::error::{CoreError, Result};

/// One resource document with an optional head comment
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceNode {
    value: YamlValue,
    head_comment: Option<String>,
}

impl ResourceNode {
    pub fn new(value: YamlValue) -> Self {
        Self {
            value,
            head_comment: None,
        }
    }

    /// Parse a single YAML document
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(Self::new(serde_yaml::from_str(yaml)?))
    }

    pub fn value(&self) -> &YamlValue {
        &self.value
    }

    pub fn head_comment(&self) -> Option<&str> {
        self.head_comment.as_deref()
    }

    pub fn set_head_comment(&mut self, comment: impl Into<String>) {
        self.head_comment = Some(comment.into());
    }

    pub fn api_version(&self) -> &str {
        self.get_str("apiVersion").unwrap_or_default()
    }

    pub fn kind(&self) -> &str {
        self.get_str("kind").unwrap_or_default()
    }

    pub fn name(&self) -> &str {
        self.get_str("metadata.name").unwrap_or_default()
    }

    pub fn namespace(&self) -> &str {
        self.get_str("metadata.namespace").unwrap_or_default()
    }

    /// API group from apiVersion ("apps/v1" -> "apps", "v1" -> "")
    pub fn group(&self) -> &str {
        match self.api_version().rsplit_once('/') {
            Some((group, _)) => group,
            None => "",
        }
    }

    /// Look up a value by dotted path
    pub fn get(&self, path: &str) -> Option<&YamlValue> {
        path.split('.')
            .try_fold(&self.value, |current, key| current.get(key))
    }

    /// Look up a string by dotted path
    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(YamlValue::as_str)
    }

    /// Look up a string by dotted path, treating a missing or empty field as `default`
    pub fn get_str_or<'a>(&'a self, path: &str, default: &'a str) -> &'a str {
        match self.get_str(path) {
            Some(s) if !s.is_empty() => s,
            _ => default,
        }
    }

    /// Look up a boolean by dotted path
    pub fn get_bool(&self, path: &str) -> Option<bool> {
        self.get(path).and_then(YamlValue::as_bool)
    }

    /// Set `metadata.namespace`, appending it as the last metadata key
    pub fn set_namespace(&mut self, namespace: &str) {
        let Some(root) = self.value.as_mapping_mut() else {
            return;
        };
        let metadata = root
            .entry(YamlValue::from("metadata"))
            .or_insert_with(|| YamlValue::Mapping(Mapping::new()));
        if !metadata.is_mapping() {
            *metadata = YamlValue::Mapping(Mapping::new());
        }
        if let Some(map) = metadata.as_mapping_mut() {
            map.insert(YamlValue::from("namespace"), YamlValue::from(namespace));
        }
    }

    /// Identity used to recognise the same resource twice
    pub fn identity(&self) -> (String, String, String, String) {
        (
            self.api_version().to_string(),
            self.kind().to_string(),
            self.namespace().to_string(),
            self.name().to_string(),
        )
    }

    /// Serialize to YAML, prefixed with the head comment if one is set
    pub fn to_yaml(&self) -> Result<String> {
        let body = serde_yaml::to_string(&self.value)?;
        let mut out = String::with_capacity(body.len() + 32);
        if let Some(comment) = &self.head_comment {
            for line in comment.lines() {
                out.push_str("# ");
                out.push_str(line);
                out.push('\n');
            }
        }
        out.push_str(&body);
        Ok(out)
    }
}

/// Parse a stream of concatenated YAML documents
///
/// Empty documents (including comment-only ones) are skipped.
pub fn read_documents(input: &str) -> Result<Vec<ResourceNode>> {
    use serde::Deserialize;

    let mut nodes = Vec::new();
    for (index, document) in serde_yaml::Deserializer::from_str(input).enumerate() {
        let value = YamlValue::deserialize(document).map_err(|e| CoreError::InvalidDocument {
            message: format!("document {}: {}", index, e),
        })?;
        match value {
            YamlValue::Null => continue,
            YamlValue::Mapping(_) => nodes.push(ResourceNode::new(value)),
            other => {
                return Err(CoreError::InvalidDocument {
                    message: format!(
                        "document {} is not a mapping: {}",
                        index,
                        serde_yaml::to_string(&other)?.trim()
                    ),
                });
            }
        }
    }
    Ok(nodes)
}

/// Write documents separated by `---`
pub fn write_documents<W: Write>(nodes: &[ResourceNode], mut writer: W) -> Result<()> {
    for (index, node) in nodes.iter().enumerate() {
        if index > 0 {
            writer.write_all(b"---\n")?;
        }
        writer.write_all(node.to_yaml()?.as_bytes())?;
    }
    writer.flush()?;
    Ok(())
}
