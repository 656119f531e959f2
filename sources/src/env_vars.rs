//! Pull secrets from the process environment. Names are sorted so two runs
//! over the same environment discover items in the same order.

use crate::error::SourceResult;
use crate::Source;
use async_trait::async_trait;
use std::collections::BTreeMap;
use sync_core::SecretItem;

pub struct EnvSource {
    name: String
}

impl EnvSource {
    pub fn new(name: String) -> Self {
        Self { name }
    }
}

#[async_trait]
impl Source for EnvSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn pull(&self) -> SourceResult<Vec<SecretItem>> {
        let snapshot: BTreeMap<String, String> = std::env::vars().collect();
        Ok(snapshot
            .into_iter()
            .map(|(name, value)| SecretItem::new(name, value))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[tokio::test]
    #[serial]
    async fn test_pull_reads_environment() {
        std::env::set_var("ENV_SOURCE_TEST_VAR", "value-1");
        let source = EnvSource::new("app-env".to_string());
        let items = source.pull().await.unwrap();
        std::env::remove_var("ENV_SOURCE_TEST_VAR");

        let item = items
            .iter()
            .find(|i| i.name == "ENV_SOURCE_TEST_VAR")
            .expect("environment variable should be discovered");
        assert_eq!(item.value, "value-1");
        assert!(item.description.is_none());
    }

    #[tokio::test]
    #[serial]
    async fn test_pull_is_sorted() {
        let source = EnvSource::new("app-env".to_string());
        let items = source.pull().await.unwrap();
        let names: Vec<_> = items.iter().map(|i| i.name.clone()).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }
}
