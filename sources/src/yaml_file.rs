//! Pull secrets from layered YAML files. Files merge with the same rules as
//! config documents; values run through the templating engine with lookup
//! paths anchored at the file that contains the value.

use crate::error::{SourceError, SourceResult};
use crate::Source;
use async_trait::async_trait;
use config::template::{render_value, TemplateContext};
use config::{deep_merge, YamlOptions};
use serde_yaml::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use sync_core::SecretItem;
use tracing::warn;

pub struct YamlSource {
    name: String,
    files: Vec<PathBuf>,
    key: Option<String>,
    vars: Arc<HashMap<String, String>>
}

impl YamlSource {
    pub fn new(name: String, options: YamlOptions, vars: Arc<HashMap<String, String>>) -> Self {
        Self {
            name,
            files: options.files,
            key: options.key,
            vars
        }
    }

    async fn load_merged(&self) -> SourceResult<Value> {
        let mut merged = Value::Null;
        for path in &self.files {
            let text = tokio::fs::read_to_string(path)
                .await
                .map_err(|source| SourceError::Io {
                    path: path.display().to_string(),
                    source
                })?;
            let doc: Value = serde_yaml::from_str(&text).map_err(|e| SourceError::Yaml {
                path: path.display().to_string(),
                message: e.to_string()
            })?;

            // Template before merging so each value's lookups resolve
            // against the YAML file it came from.
            let ctx = TemplateContext {
                vars: &self.vars,
                base_dir: path.parent()
            };
            let doc = render_value(doc, &ctx).map_err(|source| SourceError::Template {
                path: path.display().to_string(),
                source
            })?;
            merged = deep_merge(merged, doc);
        }
        Ok(merged)
    }

    fn descend<'a>(&self, doc: &'a Value) -> SourceResult<&'a Value> {
        let Some(key) = &self.key else {
            return Ok(doc);
        };
        let mut current = doc;
        for part in key.split('.') {
            current = current.get(part).ok_or_else(|| SourceError::MissingKey {
                key: key.clone()
            })?;
        }
        Ok(current)
    }
}

#[async_trait]
impl Source for YamlSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn pull(&self) -> SourceResult<Vec<SecretItem>> {
        let merged = self.load_merged().await?;
        let scoped = self.descend(&merged)?;
        Ok(items_from_value(scoped, &self.name))
    }
}

/// Normalize the three accepted shapes to a flat item list:
/// `{values: [...]}`, a bare entry list, or a `name: scalar` mapping.
fn items_from_value(value: &Value, source: &str) -> Vec<SecretItem> {
    if let Some(values) = value.get("values") {
        return entries_from_list(values, source);
    }
    match value {
        Value::Sequence(_) => entries_from_list(value, source),
        Value::Mapping(map) => {
            let mut items = Vec::with_capacity(map.len());
            for (key, val) in map {
                let name = scalar(key);
                let Some(name) = name else { continue };
                match scalar(val) {
                    Some(value) => items.push(SecretItem::new(name, value)),
                    None => {
                        warn!(source, name, "skipping entry without a scalar value");
                    }
                }
            }
            items
        }
        _ => Vec::new()
    }
}

fn entries_from_list(value: &Value, source: &str) -> Vec<SecretItem> {
    let Some(entries) = value.as_sequence() else {
        return Vec::new();
    };
    let mut items = Vec::with_capacity(entries.len());
    for entry in entries {
        let name = entry.get("name").and_then(scalar);
        let value = entry.get("value").and_then(scalar);
        let (Some(name), Some(value)) = (name, value) else {
            warn!(source, "skipping entry missing 'name' or 'value'");
            continue;
        };
        let mut item = SecretItem::new(name, value);
        item.description = entry.get("description").and_then(scalar);
        items.push(item);
    }
    items
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None
    }
}
