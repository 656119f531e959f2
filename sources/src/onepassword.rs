//! Pull secrets from a 1Password vault through the `op` CLI.
//!
//! `op item list` discovers titles and tags; surviving items are fetched
//! individually with `op item get`, fanned out under a bounded semaphore.

use crate::error::{SourceError, SourceResult};
use crate::subprocess::run_json;
use crate::tags::resolve_tag_overrides;
use crate::Source;
use async_trait::async_trait;
use config::OnePasswordOptions;
use futures::future::join_all;
use regex::Regex;
use serde::Deserialize;
use std::sync::Arc;
use sync_core::{SecretItem, TaggedRecord};
use tokio::sync::Semaphore;
use tracing::debug;

const OP_BIN: &str = "op";
const TOKEN_ENV: &str = "OP_SERVICE_ACCOUNT_TOKEN";

#[derive(Debug, Clone, Deserialize)]
struct OpListEntry {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    tags: Vec<String>
}

#[derive(Debug, Deserialize)]
struct OpItemDetail {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    fields: Vec<OpField>
}

#[derive(Debug, Deserialize)]
struct OpField {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    value: Option<String>
}

pub struct OnePasswordSource {
    name: String,
    vault: String,
    tag_filters: Vec<String>,
    include_regex: Option<Regex>,
    token: Option<String>,
    concurrency: usize
}

impl OnePasswordSource {
    pub fn new(name: String, options: OnePasswordOptions) -> SourceResult<Self> {
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

        Ok(Self {
            name,
            vault: options.vault,
            tag_filters: options.tag_filters,
            include_regex,
            token: options
                .service_account_token
                .or_else(|| std::env::var(TOKEN_ENV).ok()),
            concurrency: options.concurrency
        })
    }

    fn envs(&self) -> Vec<(String, String)> {
        match &self.token {
            Some(token) => vec![(TOKEN_ENV.to_string(), token.clone())],
            None => Vec::new()
        }
    }

    fn survives(&self, entry: &OpListEntry) -> bool {
        if !self.tag_filters.is_empty()
            && !entry.tags.iter().any(|t| self.tag_filters.contains(t))
        {
            return false;
        }
        match &self.include_regex {
            Some(regex) => regex.is_match(&entry.title),
            None => true
        }
    }

    async fn list_items(&self) -> SourceResult<Vec<OpListEntry>> {
        let args: Vec<String> = [
            "item", "list", "--vault", self.vault.as_str(), "--format", "json",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let raw = run_json(OP_BIN, &args, &self.envs()).await?;
        serde_json::from_value(raw).map_err(|e| SourceError::Contract {
            program: OP_BIN.to_string(),
            message: e.to_string()
        })
    }

    async fn get_item(&self, id: &str) -> SourceResult<OpItemDetail> {
        let args: Vec<String> = [
            "item", "get", id, "--vault", self.vault.as_str(), "--format", "json",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let raw = run_json(OP_BIN, &args, &self.envs()).await?;
        serde_json::from_value(raw).map_err(|e| SourceError::Contract {
            program: OP_BIN.to_string(),
            message: e.to_string()
        })
    }
}

#[async_trait]
impl Source for OnePasswordSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn pull(&self) -> SourceResult<Vec<SecretItem>> {
        let listing = self.list_items().await?;
        let survivors: Vec<OpListEntry> =
            listing.into_iter().filter(|e| self.survives(e)).collect();
        debug!(
            source = %self.name,
            vault = %self.vault,
            count = survivors.len(),
            "Fetching 1Password items"
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let fetches = survivors.iter().map(|entry| {
            let semaphore = semaphore.clone();
            async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .map_err(|_| SourceError::Cancelled)?;
                let detail = self.get_item(&entry.id).await?;
                let title = detail
                    .title
                    .clone()
                    .filter(|t| !t.is_empty())
                    .unwrap_or_else(|| entry.title.clone());
                Ok::<_, SourceError>(extract_value(&detail.fields).map(|value| TaggedRecord {
                    title,
                    value,
                    description: None,
                    tags: entry.tags.clone()
                }))
            }
        });

        let mut records = Vec::with_capacity(survivors.len());
        for fetched in join_all(fetches).await {
            if let Some(record) = fetched? {
                records.push(record);
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

/// Field selection priority: the named `password` field, then any concealed
/// field, then the first field with a non-empty value.
fn extract_value(fields: &[OpField]) -> Option<String> {
    let non_empty = |f: &&OpField| f.value.as_deref().is_some_and(|v| !v.is_empty());

    fields
        .iter()
        .filter(non_empty)
        .find(|f| f.id.as_deref() == Some("password"))
        .or_else(|| {
            fields
                .iter()
                .filter(non_empty)
                .find(|f| f.kind.as_deref() == Some("CONCEALED"))
        })
        .or_else(|| fields.iter().find(non_empty))
        .and_then(|f| f.value.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FilterOptions;

    fn options(tag_filters: &[&str], include_regex: Option<&str>) -> OnePasswordOptions {
        OnePasswordOptions {
            vault: "Dev".to_string(),
            tag_filters: tag_filters.iter().map(|t| t.to_string()).collect(),
            service_account_token: Some("svc-token".to_string()),
            concurrency: 4,
            filter: FilterOptions {
                include_regex: include_regex.map(str::to_string),
                ..Default::default()
            }
        }
    }

    fn fields(json: &str) -> Vec<OpField> {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_extract_prefers_password_field() {
        // Shape captured from `op item get <uid> --format json`.
        let fields = fields(
            r#"[
                {"id": "username", "type": "STRING", "value": "svc"},
                {"id": "password", "type": "CONCEALED", "value": "p4ss"},
                {"id": "other", "type": "CONCEALED", "value": "nope"}
            ]"#
        );
        assert_eq!(extract_value(&fields).as_deref(), Some("p4ss"));
    }

    #[test]
    fn test_extract_falls_back_to_concealed() {
        let fields = fields(
            r#"[
                {"id": "username", "type": "STRING", "value": "svc"},
                {"id": "pin", "type": "CONCEALED", "value": "1234"}
            ]"#
        );
        assert_eq!(extract_value(&fields).as_deref(), Some("1234"));
    }

    #[test]
    fn test_extract_falls_back_to_first_non_empty() {
        let fields = fields(
            r#"[
                {"id": "notes", "type": "STRING", "value": ""},
                {"id": "username", "type": "STRING", "value": "svc"}
            ]"#
        );
        assert_eq!(extract_value(&fields).as_deref(), Some("svc"));
    }

    #[test]
    fn test_extract_empty_password_is_skipped() {
        let fields = fields(
            r#"[
                {"id": "password", "type": "CONCEALED", "value": ""},
                {"id": "token", "type": "STRING", "value": "t"}
            ]"#
        );
        assert_eq!(extract_value(&fields).as_deref(), Some("t"));
    }

    #[test]
    fn test_survives_applies_tags_and_title_regex() {
        let source =
            OnePasswordSource::new("op".to_string(), options(&["prod"], Some("^APP_.*"))).unwrap();

        let entry = |title: &str, tags: &[&str]| OpListEntry {
            id: "x".to_string(),
            title: title.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect()
        };

        assert!(source.survives(&entry("APP_DB", &["prod"])));
        assert!(!source.survives(&entry("APP_DB", &["staging"])));
        assert!(!source.survives(&entry("OTHER", &["prod"])));
    }

    #[test]
    fn test_listing_contract_shape() {
        // Shape captured from `op item list --vault Dev --format json`.
        let listing: Vec<OpListEntry> = serde_json::from_str(
            r#"[
                {"id": "abc123", "title": "APP_DB_PASSWORD", "tags": ["prod"], "category": "PASSWORD"},
                {"id": "def456", "title": "APP_API_KEY"}
            ]"#
        )
        .unwrap();
        assert_eq!(listing.len(), 2);
        assert_eq!(listing[0].tags, vec!["prod"]);
        assert!(listing[1].tags.is_empty());
    }
}
