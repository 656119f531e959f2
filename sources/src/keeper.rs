//! Pull secrets from a Keeper folder through the `keeper` CLI.
//!
//! `keeper list` discovers record uids and titles; surviving records are
//! fetched with `keeper get` under a bounded semaphore. Tags live in a
//! custom field literally named `tags`, comma-separated.

use crate::error::{SourceError, SourceResult};
use crate::subprocess::run_json;
use crate::tags::resolve_tag_overrides;
use crate::Source;
use async_trait::async_trait;
use config::KeeperOptions;
use futures::future::join_all;
use regex::Regex;
use serde::Deserialize;
use std::sync::Arc;
use sync_core::{SecretItem, TaggedRecord};
use tokio::sync::Semaphore;
use tracing::debug;

const KEEPER_BIN: &str = "keeper";

#[derive(Debug, Clone, Deserialize)]
struct KeeperListEntry {
    #[serde(default, alias = "uid", alias = "id", alias = "recordUid")]
    record_uid: Option<String>,
    #[serde(default)]
    title: String
}

#[derive(Debug, Default, Deserialize)]
struct KeeperRecord {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    password: FieldValue,
    #[serde(default)]
    fields: Vec<KeeperField>,
    #[serde(default, alias = "custom_fields")]
    custom: Vec<KeeperField>,
    #[serde(default)]
    notes: Option<String>
}

#[derive(Debug, Default, Deserialize)]
struct KeeperField {
    #[serde(default, alias = "name")]
    label: Option<String>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    value: FieldValue
}

/// Keeper field values arrive as a bare string, a list of scalars, or
/// something else entirely; only the first scalar matters.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum FieldValue {
    Str(String),
    List(Vec<serde_json::Value>),
    Other(serde_json::Value)
}

impl Default for FieldValue {
    fn default() -> Self {
        Self::Other(serde_json::Value::Null)
    }
}

impl FieldValue {
    fn first_scalar(&self) -> Option<String> {
        match self {
            Self::Str(s) if !s.is_empty() => Some(s.clone()),
            Self::List(items) => items.iter().find_map(scalar_of),
            _ => None
        }
    }
}

fn scalar_of(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None
    }
}

pub struct KeeperSource {
    name: String,
    folder: String,
    tag_filters: Vec<String>,
    include_regex: Option<Regex>,
    config_file: Option<String>,
    envs: Vec<(String, String)>,
    concurrency: usize
}

impl KeeperSource {
    pub fn new(name: String, options: KeeperOptions) -> SourceResult<Self> {
        let include_regex = options
            .filter
            .include_regex
            .as_deref()
            .map(|pattern| {
                Regex::new(&format!("^(?:{pattern})$")).map_err(|e| SourceError::InvalidPattern {
                    pattern: pattern.to_string(),
                    message: e.to_string()
                })
            })
            .transpose()?;

        let mut envs = Vec::new();
        for (key, value) in [
            ("KEEPER_SERVER", options.keeper_server),
            ("KEEPER_USER", options.keeper_user),
            ("KEEPER_PASSWORD", options.keeper_password),
        ] {
            let value = value.or_else(|| std::env::var(key).ok());
            if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
                envs.push((key.to_string(), value));
            }
        }

        Ok(Self {
            name,
            folder: options.folder,
            tag_filters: options.tag_filters,
            include_regex,
            config_file: options.config_file.map(|p| p.display().to_string()),
            envs,
            concurrency: options.concurrency
        })
    }

    fn args(&self, tail: &[&str]) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(config) = &self.config_file {
            args.push("--config".to_string());
            args.push(config.clone());
        }
        args.extend(tail.iter().map(|s| s.to_string()));
        args
    }

    async fn list_records(&self) -> SourceResult<Vec<KeeperListEntry>> {
        let raw = run_json(
            KEEPER_BIN,
            &self.args(&["list", "--folder", self.folder.as_str(), "--format", "json"]),
            &self.envs
        )
        .await?;
        // The listing is either a bare array or wrapped as {"records": [...]}.
        let entries = match raw {
            serde_json::Value::Array(_) => raw,
            serde_json::Value::Object(ref map) if map.contains_key("records") => {
                map["records"].clone()
            }
            other => {
                return Err(SourceError::Contract {
                    program: KEEPER_BIN.to_string(),
                    message: format!("expected a record list, got {other}")
                });
            }
        };
        serde_json::from_value(entries).map_err(|e| SourceError::Contract {
            program: KEEPER_BIN.to_string(),
            message: e.to_string()
        })
    }

    async fn get_record(&self, uid: &str) -> SourceResult<KeeperRecord> {
        let raw = run_json(
            KEEPER_BIN,
            &self.args(&["get", uid, "--format", "json"]),
            &self.envs
        )
        .await?;
        serde_json::from_value(raw).map_err(|e| SourceError::Contract {
            program: KEEPER_BIN.to_string(),
            message: e.to_string()
        })
    }

    fn title_survives(&self, title: &str) -> bool {
        match &self.include_regex {
            Some(regex) => regex.is_match(title),
            None => true
        }
    }

    fn tags_survive(&self, tags: &[String]) -> bool {
        self.tag_filters.is_empty() || tags.iter().any(|t| self.tag_filters.contains(t))
    }
}

#[async_trait]
impl Source for KeeperSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn pull(&self) -> SourceResult<Vec<SecretItem>> {
        let listing = self.list_records().await?;
        let survivors: Vec<KeeperListEntry> = listing
            .into_iter()
            .filter(|e| e.record_uid.is_some() && self.title_survives(&e.title))
            .collect();
        debug!(
            source = %self.name,
            folder = %self.folder,
            count = survivors.len(),
            "Fetching Keeper records"
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let fetches = survivors.iter().map(|entry| {
            let semaphore = semaphore.clone();
            async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .map_err(|_| SourceError::Cancelled)?;
                let uid = entry.record_uid.as_deref().unwrap_or_default();
                let record = self.get_record(uid).await?;
                Ok::<_, SourceError>(to_tagged_record(&record, &entry.title))
            }
        });

        let mut records = Vec::with_capacity(survivors.len());
        for fetched in join_all(fetches).await {
            if let Some(record) = fetched? {
                if self.tags_survive(&record.tags) {
                    records.push(record);
                }
            }
        }

        Ok(resolve_tag_overrides(records, &self.tag_filters)
            .into_iter()
            .map(|record| SecretItem {
                name: record.title,
                value: record.value,
                description: record.description,
                source: None
            })
            .collect())
    }
}

fn to_tagged_record(record: &KeeperRecord, listed_title: &str) -> Option<TaggedRecord> {
    let title = record
        .title
        .clone()
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| listed_title.to_string());
    if title.is_empty() {
        return None;
    }
    let value = extract_value(record)?;
    Some(TaggedRecord {
        title,
        value,
        description: None,
        tags: extract_tags(record)
    })
}

/// Value selection priority: record-level password, then any
/// password/login/note field, then other custom fields (excluding `tags`),
/// then the notes body.
fn extract_value(record: &KeeperRecord) -> Option<String> {
    if let Some(password) = record.password.first_scalar() {
        return Some(password);
    }

    let credential_kinds = ["password", "login", "note"];
    for field in &record.fields {
        let label = field_label(field);
        let kind = field.kind.as_deref().unwrap_or_default().to_ascii_lowercase();
        if credential_kinds.contains(&label.as_str()) || credential_kinds.contains(&kind.as_str())
        {
            if let Some(value) = field.value.first_scalar() {
                return Some(value);
            }
        }
    }

    for field in &record.custom {
        if field_label(field) == "tags" {
            continue;
        }
        if let Some(value) = field.value.first_scalar() {
            return Some(value);
        }
    }

    record.notes.clone().filter(|n| !n.is_empty())
}

fn extract_tags(record: &KeeperRecord) -> Vec<String> {
    for field in &record.custom {
        let label = field_label(field);
        if label != "tags" && label != "text:tags" {
            continue;
        }
        let raw = match &field.value {
            FieldValue::Str(s) => vec![s.clone()],
            FieldValue::List(items) => items.iter().filter_map(scalar_of).collect(),
            FieldValue::Other(_) => Vec::new()
        };
        return raw
            .iter()
            .flat_map(|chunk| chunk.split(','))
            .map(|tag| tag.trim().to_string())
            .filter(|tag| !tag.is_empty())
            .collect();
    }
    Vec::new()
}

fn field_label(field: &KeeperField) -> String {
    field
        .label
        .as_deref()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}
