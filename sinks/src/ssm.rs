//! SSM Parameter Store sink.

use crate::aws::{PutParameterRequest, SsmApi};
use crate::rate_limiter::TokenBucket;
use crate::retry::{retry_throttled, RetryPolicy};
use crate::worker::{run_pool, ItemResult, ItemWriter};
use crate::Sink;
use async_trait::async_trait;
use config::{SsmOptions, SsmParameterType, SsmTier};
use std::sync::Arc;
use sync_core::{CancelFlag, DispatchItem, FailureReason, ItemReport, Outcome};
use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;

/// Standard-tier ceiling; longer values are promoted to Advanced.
const STANDARD_TIER_MAX_BYTES: usize = 4096;
/// Hard ceiling; longer values fail before any AWS call.
const ADVANCED_TIER_MAX_BYTES: usize = 8192;

pub struct SsmSink {
    name: String,
    options: SsmOptions,
    api: Arc<dyn SsmApi>,
    limiter: TokenBucket,
    retry: RetryPolicy
}

impl SsmSink {
    pub fn new(name: String, options: SsmOptions, api: Arc<dyn SsmApi>) -> Self {
        let limiter = TokenBucket::new(options.rate_limit_rps);
        Self {
            name,
            options,
            api,
            limiter,
            retry: RetryPolicy::default()
        }
    }

    /// Configured tier, promoted to Advanced when the value outgrows the
    /// standard ceiling.
    fn effective_tier(&self, byte_len: usize, full_name: &str) -> Option<SsmTier> {
        if byte_len <= STANDARD_TIER_MAX_BYTES {
            return self.options.tier;
        }
        match self.options.tier {
            Some(SsmTier::Advanced) | Some(SsmTier::IntelligentTiering) => self.options.tier,
            _ => {
                warn!(
                    sink = %self.name,
                    name = full_name,
                    bytes = byte_len,
                    "value exceeds the standard parameter tier; promoting to Advanced"
                );
                Some(SsmTier::Advanced)
            }
        }
    }
}

#[async_trait]
impl ItemWriter for SsmSink {
    async fn sync_item(&self, item: &DispatchItem) -> ItemResult {
        let byte_len = item.value.len();
        if byte_len > ADVANCED_TIER_MAX_BYTES {
            return ItemResult::failed(
                FailureReason::TooLarge,
                Some(format!(
                    "value is {byte_len} bytes, above the {ADVANCED_TIER_MAX_BYTES}-byte parameter limit"
                )),
                None
            );
        }
        let tier = self.effective_tier(byte_len, &item.full_name);

        // Pre-read to classify; a permission failure leaves the pre-state
        // unknown and the write proceeds.
        let existing = match retry_throttled(&self.retry, &self.limiter, || {
            self.api.get_parameter(&item.full_name)
        })
        .await
        {
            Ok(existing) => existing,
            Err(err) if err.is_access_denied() => None,
            Err(err) => {
                return ItemResult::failed(FailureReason::Aws, Some(err.to_string()), None);
            }
        };

        let (outcome, old_value) = match existing {
            None => (Outcome::Created, None),
            Some(old) if old == item.value => (Outcome::Unchanged, Some(old)),
            Some(old) if !self.options.overwrite => {
                return ItemResult::failed(
                    FailureReason::Exists,
                    Some("parameter exists and overwrite is disabled".to_string()),
                    Some(old)
                );
            }
            Some(old) => (Outcome::Changed, Some(old))
        };
        if outcome == Outcome::Unchanged {
            return ItemResult::ok(outcome, old_value);
        }

        let request = PutParameterRequest {
            name: item.full_name.clone(),
            value: item.value.clone(),
            parameter_type: self.options.parameter_type.as_str().to_string(),
            overwrite: self.options.overwrite,
            tier: tier.map(|t| t.as_str().to_string()),
            kms_key_id: match self.options.parameter_type {
                SsmParameterType::SecureString => self.options.kms_key_id.clone(),
                SsmParameterType::String => None
            },
            description: item.description.clone()
        };

        match retry_throttled(&self.retry, &self.limiter, || self.api.put_parameter(&request))
            .await
        {
            Ok(()) => ItemResult::ok(outcome, old_value),
            Err(err) => ItemResult::failed(FailureReason::Aws, Some(err.to_string()), old_value)
        }
    }
}

#[async_trait]
impl Sink for SsmSink {
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
