//! # Configuration
//!
//! Loads an ordered list of YAML config documents, deep-merges them with
//! name-keyed list semantics, interpolates `{{ VAR }}` placeholders, resolves
//! file paths relative to the declaring document, and validates the result
//! into a typed [`AppConfig`].
//!
//! Also home of the minimal templating engine used for YAML-source values.

pub mod error;
pub mod loader;
pub mod merge;
pub mod schema;
pub mod template;

pub use error::{ConfigError, ConfigResult};
pub use loader::load_config_from_files;
pub use merge::deep_merge;
pub use schema::{
    AppConfig, AwsConfig, FilterOptions, KeeperOptions, OnePasswordOptions,
    SecretsManagerOptions, SinkKind, SinkSpec, SourceKind, SourceSelector, SourceSpec,
    SsmOptions, SsmParameterType, SsmTier, YamlOptions,
};
pub use template::{TemplateContext, TemplateError};
