//! Secrets Manager sink. Creation and value updates go through different
//! SDK operations, so the pre-read drives both classification and the
//! choice of write path.

use crate::aws::{CreateSecretRequest, SecretsApi};
use crate::rate_limiter::TokenBucket;
use crate::retry::{retry_throttled, RetryPolicy};
use crate::worker::{run_pool, ItemResult, ItemWriter};
use crate::Sink;
use async_trait::async_trait;
use config::SecretsManagerOptions;
use std::sync::Arc;
use sync_core::{CancelFlag, DispatchItem, FailureReason, ItemReport, Outcome};
use tokio::sync::mpsc::UnboundedSender;

pub struct SecretsManagerSink {
    name: String,
    options: SecretsManagerOptions,
    api: Arc<dyn SecretsApi>,
    limiter: TokenBucket,
    retry: RetryPolicy
}

impl SecretsManagerSink {
    pub fn new(name: String, options: SecretsManagerOptions, api: Arc<dyn SecretsApi>) -> Self {
        let limiter = TokenBucket::new(options.rate_limit_rps);
        Self {
            name,
            options,
            api,
            limiter,
            retry: RetryPolicy::default()
        }
    }

    async fn create(&self, item: &DispatchItem) -> ItemResult {
        let request = CreateSecretRequest {
            name: item.full_name.clone(),
            value: item.value.clone(),
            description: item.description.clone(),
            kms_key_id: self.options.kms_key_id.clone()
        };
        match retry_throttled(&self.retry, &self.limiter, || self.api.create_secret(&request))
            .await
        {
            Ok(()) => ItemResult::ok(Outcome::Created, None),
            Err(err) => ItemResult::failed(FailureReason::Aws, Some(err.to_string()), None)
        }
    }

    async fn put_value(&self, item: &DispatchItem, old_value: Option<String>) -> ItemResult {
        match retry_throttled(&self.retry, &self.limiter, || {
            self.api.put_secret_value(&item.full_name, &item.value)
        })
        .await
        {
            Ok(()) => ItemResult::ok(Outcome::Changed, old_value),
            Err(err) => ItemResult::failed(FailureReason::Aws, Some(err.to_string()), old_value)
        }
    }
}

#[async_trait]
impl ItemWriter for SecretsManagerSink {
    async fn sync_item(&self, item: &DispatchItem) -> ItemResult {
        let meta = match retry_throttled(&self.retry, &self.limiter, || {
            self.api.describe_secret(&item.full_name)
        })
        .await
        {
            Ok(meta) => meta,
            Err(err) if err.is_access_denied() => {
                // Pre-state unknown: write anyway, bootstrapping the secret
                // if the value update reveals it does not exist.
                let result = self.put_value(item, None).await;
                if result.outcome == Outcome::Failed {
                    return self.create(item).await;
                }
                return result;
            }
            Err(err) => {
                return ItemResult::failed(FailureReason::Aws, Some(err.to_string()), None);
            }
        };

        let Some(meta) = meta else {
            return self.create(item).await;
        };

        let old_value = match retry_throttled(&self.retry, &self.limiter, || {
            self.api.get_secret_value(&item.full_name)
        })
        .await
        {
            Ok(old_value) => old_value,
            Err(err) if err.is_access_denied() => None,
            Err(err) => {
                return ItemResult::failed(FailureReason::Aws, Some(err.to_string()), None);
            }
        };

        // A description-only difference still counts as a change.
        let description_differs = item
            .description
            .as_ref()
            .is_some_and(|d| meta.description.as_ref() != Some(d));
        let value_matches = old_value.as_deref() == Some(item.value.as_str());

        if value_matches && !description_differs {
            return ItemResult::ok(Outcome::Unchanged, old_value);
        }
        if !self.options.overwrite {
            return ItemResult::failed(
                FailureReason::Exists,
                Some("secret exists and overwrite is disabled".to_string()),
                old_value
            );
        }
        self.put_value(item, old_value).await
    }
}

#[async_trait]
impl Sink for SecretsManagerSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn push_many(
        &self,
        items: Vec<DispatchItem>,
        cancel: &CancelFlag,
        events: &UnboundedSender<ItemReport>
    ) -> usize {
        run_pool(self, &self.name, items, self.options.concurrency, cancel, events).await
    }
}
