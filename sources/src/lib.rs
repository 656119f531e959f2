//! # Source Adapters
//!
//! Uniform adapters that pull [`SecretItem`]s from heterogeneous stores:
//! the process environment, layered YAML files, 1Password vaults and Keeper
//! folders. Adapters fetch in discovery order and leave the common
//! include/exclude/strip filtering to the [`collect`] module.

pub mod collect;
pub mod env_vars;
pub mod error;
pub mod filter;
pub mod keeper;
pub mod onepassword;
pub mod subprocess;
pub mod tags;
pub mod yaml_file;

use async_trait::async_trait;
use config::{SourceKind, SourceSpec};
use std::collections::HashMap;
use std::sync::Arc;
use sync_core::SecretItem;

pub use collect::{collect_all, SourceOutcome};
pub use error::{SourceError, SourceResult};

/// A producer of secret items.
#[async_trait]
pub trait Source: Send + Sync {
    fn name(&self) -> &str;

    /// Fetch all items, in the discovery order of the underlying store.
    async fn pull(&self) -> SourceResult<Vec<SecretItem>>;
}

/// Registry: instantiate the adapter for a validated source spec.
pub fn build_source(
    spec: &SourceSpec,
    vars: Arc<HashMap<String, String>>
) -> SourceResult<Box<dyn Source>> {
    let source: Box<dyn Source> = match &spec.kind {
        SourceKind::Env(_) => Box::new(env_vars::EnvSource::new(spec.name.clone())),
        SourceKind::Yaml(options) => {
            Box::new(yaml_file::YamlSource::new(spec.name.clone(), options.clone(), vars))
        }
        SourceKind::OnePassword(options) => Box::new(onepassword::OnePasswordSource::new(
            spec.name.clone(),
            options.clone()
        )?),
        SourceKind::Keeper(options) => {
            Box::new(keeper::KeeperSource::new(spec.name.clone(), options.clone())?)
        }
    };
    Ok(source)
}
