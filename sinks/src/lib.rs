//! # Sink Adapters
//!
//! The two AWS sinks share one skeleton: a bounded worker pool pulling
//! routed items, a per-sink token bucket gating every AWS operation, and a
//! throttling-aware retry policy. Each write is classified as created,
//! unchanged, changed or failed and reported as a structured event.

pub mod aws;
pub mod rate_limiter;
pub mod retry;
pub mod secrets_manager;
pub mod ssm;
pub mod worker;

use async_trait::async_trait;
use config::{AwsConfig, SinkKind, SinkSpec};
use sync_core::{CancelFlag, DispatchItem, ItemReport};
use tokio::sync::mpsc::UnboundedSender;

/// A consumer of routed items bound to one AWS service.
#[async_trait]
pub trait Sink: Send + Sync {
    fn name(&self) -> &str;

    /// Dispatch the batch through the worker pool. Returns the number of
    /// items skipped because cancellation was requested.
    async fn push_many(
        &self,
        items: Vec<DispatchItem>,
        cancel: &CancelFlag,
        events: &UnboundedSender<ItemReport>
    ) -> usize;
}

/// Registry: instantiate the adapter for a validated sink spec against a
/// shared SDK configuration.
pub fn build_sink(spec: &SinkSpec, sdk: &aws_config::SdkConfig) -> Box<dyn Sink> {
    match &spec.kind {
        SinkKind::Ssm(options) => Box::new(ssm::SsmSink::new(
            spec.name.clone(),
            options.clone(),
            std::sync::Arc::new(aws::SdkSsmClient::new(sdk))
        )),
        SinkKind::SecretsManager(options) => Box::new(secrets_manager::SecretsManagerSink::new(
            spec.name.clone(),
            options.clone(),
            std::sync::Arc::new(aws::SdkSecretsClient::new(sdk))
        ))
    }
}

/// Shared SDK configuration honoring the config file's region/profile with
/// the usual environment fallbacks.
pub async fn load_sdk_config(aws: &AwsConfig) -> aws_config::SdkConfig {
    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
    if let Some(region) = aws.region.clone() {
        loader = loader.region(aws_config::Region::new(region));
    }
    if let Some(profile) = &aws.profile {
        loader = loader.profile_name(profile);
    }
    loader.load().await
}
