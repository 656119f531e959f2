use serde::{Deserialize, Serialize};

/// A single name/value secret produced by a source.
///
/// Two items are considered equal when their `name` and `value` match;
/// descriptions and origin metadata do not participate in equality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretItem {
    pub name: String,
    pub value: String,
    pub description: Option<String>,
    /// Name of the source that produced this item.
    pub source: Option<String>
}

impl SecretItem {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            description: None,
            source: None
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl PartialEq for SecretItem {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.value == other.value
    }
}

impl Eq for SecretItem {}

/// Intermediate record fetched from a tagged store (1Password, Keeper)
/// before override resolution collapses duplicates by title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedRecord {
    pub title: String,
    pub value: String,
    pub description: Option<String>,
    pub tags: Vec<String>
}

/// One routed item addressed to a single sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchItem {
    /// Sink prefix joined with the item name.
    pub full_name: String,
    pub value: String,
    pub description: Option<String>,
    /// Source the item was collected from.
    pub source_name: String
}

/// Result of dispatching one item to one sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Created,
    Unchanged,
    Changed,
    Failed
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Unchanged => "unchanged",
            Self::Changed => "changed",
            Self::Failed => "failed"
        }
    }
}

/// Why a dispatch failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureReason {
    /// Entry exists and the sink is configured with `overwrite: false`.
    Exists,
    /// Value exceeds the sink's hard size limit; no write was attempted.
    TooLarge,
    /// AWS error after retries were exhausted.
    Aws
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exists => "exists",
            Self::TooLarge => "too-large",
            Self::Aws => "aws"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_equality_ignores_description_and_source() {
        let a = SecretItem::new("DB_URL", "x").with_description("primary");
        let mut b = SecretItem::new("DB_URL", "x");
        b.source = Some("env".to_string());
        assert_eq!(a, b);
    }

    #[test]
    fn test_item_equality_requires_same_value() {
        let a = SecretItem::new("DB_URL", "x");
        let b = SecretItem::new("DB_URL", "y");
        assert_ne!(a, b);
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(Outcome::Created.as_str(), "created");
        assert_eq!(Outcome::Failed.as_str(), "failed");
        assert_eq!(FailureReason::TooLarge.as_str(), "too-large");
    }
}
