//! # Typed Schema
//!
//! Tagged-variant model of sources and sinks plus the registry that maps
//! `type` strings to constructors. Every option is validated at load time so
//! the engine never sees a half-valid spec.

use crate::error::{ConfigError, ConfigResult};
use serde::Deserialize;
use serde_yaml::Value;
use std::collections::HashMap;
use std::path::PathBuf;

/// Fully validated configuration: the loader's output, the driver's input.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Merged variable map: OS environment overlaid by config `vars`.
    pub vars: HashMap<String, String>,
    pub aws: AwsConfig,
    pub sources: Vec<SourceSpec>,
    pub sinks: Vec<SinkSpec>
}

#[derive(Debug, Clone, Default)]
pub struct AwsConfig {
    pub region: Option<String>,
    pub profile: Option<String>
}

#[derive(Debug, Clone)]
pub struct SourceSpec {
    /// Unique across the configuration; defaults to the type string.
    pub name: String,
    pub kind: SourceKind
}

#[derive(Debug, Clone)]
pub enum SourceKind {
    Env(EnvOptions),
    Yaml(YamlOptions),
    OnePassword(OnePasswordOptions),
    Keeper(KeeperOptions)
}

impl SourceKind {
    /// Registry: map a `type` string onto a typed constructor.
    pub fn parse(type_: &str, name: &str, options: Value) -> ConfigResult<Self> {
        let kind = match type_.to_ascii_lowercase().as_str() {
            "env" => Self::Env(from_options(name, options)?),
            "yaml" => Self::Yaml(from_options(name, options)?),
            "1password" | "onepassword" | "op" => Self::OnePassword(from_options(name, options)?),
            "keeper" => Self::Keeper(from_options(name, options)?),
            _ => {
                return Err(ConfigError::UnknownSourceType {
                    type_: type_.to_string()
                });
            }
        };
        kind.validate(name)?;
        Ok(kind)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Env(_) => "env",
            Self::Yaml(_) => "yaml",
            Self::OnePassword(_) => "1password",
            Self::Keeper(_) => "keeper"
        }
    }

    pub fn filter(&self) -> &FilterOptions {
        match self {
            Self::Env(o) => &o.filter,
            Self::Yaml(o) => &o.filter,
            Self::OnePassword(o) => &o.filter,
            Self::Keeper(o) => &o.filter
        }
    }

    fn validate(&self, name: &str) -> ConfigResult<()> {
        let filter = self.filter();
        if !filter.include.is_empty() && filter.include_regex.is_some() {
            return Err(ConfigError::InvalidOptions {
                owner: name.to_string(),
                message: "'include' and 'include_regex' are mutually exclusive".to_string()
            });
        }
        match self {
            Self::Yaml(o) if o.files.is_empty() => Err(ConfigError::InvalidOptions {
                owner: name.to_string(),
                message: "yaml source requires 'files' (list of paths)".to_string()
            }),
            Self::OnePassword(o) if o.vault.trim().is_empty() => Err(ConfigError::InvalidOptions {
                owner: name.to_string(),
                message: "1password source requires 'vault'".to_string()
            }),
            Self::OnePassword(o) if o.concurrency == 0 => Err(ConfigError::InvalidConcurrency {
                owner: name.to_string()
            }),
            Self::Keeper(o) if o.folder.trim().is_empty() => Err(ConfigError::InvalidOptions {
                owner: name.to_string(),
                message: "keeper source requires 'folder'".to_string()
            }),
            Self::Keeper(o) if o.concurrency == 0 => Err(ConfigError::InvalidConcurrency {
                owner: name.to_string()
            }),
            _ => Ok(())
        }
    }
}

/// Common name filters applied by the collector after an adapter returns.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilterOptions {
    /// Full-match glob patterns.
    #[serde(default)]
    pub include: Vec<String>,
    /// Full-match regex, mutually exclusive with `include`.
    #[serde(default)]
    pub include_regex: Option<String>,
    /// Names matching any of these regexes are removed.
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Explicit names unioned back in after include/exclude.
    #[serde(default)]
    pub keys: Vec<String>,
    /// Literal prefix stripped from names, applied last.
    #[serde(default)]
    pub strip_prefix: Option<String>
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnvOptions {
    #[serde(flatten)]
    pub filter: FilterOptions
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct YamlOptions {
    /// Paths are resolved against the declaring config document before this
    /// struct is built.
    #[serde(default)]
    pub files: Vec<PathBuf>,
    /// Optional dot-path into the merged document.
    #[serde(default)]
    pub key: Option<String>,
    #[serde(flatten)]
    pub filter: FilterOptions
}

#[derive(Debug, Clone, Deserialize)]
pub struct OnePasswordOptions {
    pub vault: String,
    /// Ordered lowest to highest priority.
    #[serde(default)]
    pub tag_filters: Vec<String>,
    #[serde(default)]
    pub service_account_token: Option<String>,
    #[serde(default = "default_fanout")]
    pub concurrency: usize,
    #[serde(flatten)]
    pub filter: FilterOptions
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeeperOptions {
    pub folder: String,
    #[serde(default)]
    pub tag_filters: Vec<String>,
    #[serde(default)]
    pub config_file: Option<PathBuf>,
    #[serde(default)]
    pub keeper_server: Option<String>,
    #[serde(default)]
    pub keeper_user: Option<String>,
    #[serde(default)]
    pub keeper_password: Option<String>,
    #[serde(default = "default_fanout")]
    pub concurrency: usize,
    #[serde(flatten)]
    pub filter: FilterOptions
}

#[derive(Debug, Clone)]
pub struct SinkSpec {
    pub name: String,
    pub kind: SinkKind,
    pub sources: SourceSelector
}

/// Which sources a sink subscribes to. An absent list and an explicit `*`
/// both mean every declared source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSelector {
    All,
    Named(Vec<String>)
}

#[derive(Debug, Clone)]
pub enum SinkKind {
    Ssm(SsmOptions),
    SecretsManager(SecretsManagerOptions)
}

impl SinkKind {
    pub fn parse(type_: &str, name: &str, options: Value) -> ConfigResult<Self> {
        match type_.to_ascii_lowercase().as_str() {
            "ssm" => {
                let raw: RawSsmOptions = from_options(name, options)?;
                Ok(Self::Ssm(raw.validate(name)?))
            }
            "secrets" | "secrets_manager" | "secretsmanager" => {
                let raw: RawSecretsManagerOptions = from_options(name, options)?;
                Ok(Self::SecretsManager(raw.validate(name)?))
            }
            _ => Err(ConfigError::UnknownSinkType {
                type_: type_.to_string()
            })
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Ssm(_) => "ssm",
            Self::SecretsManager(_) => "secrets_manager"
        }
    }

    pub fn prefix(&self) -> &str {
        match self {
            Self::Ssm(o) => &o.prefix,
            Self::SecretsManager(o) => &o.prefix
        }
    }

    pub fn rate_limit_rps(&self) -> f64 {
        match self {
            Self::Ssm(o) => o.rate_limit_rps,
            Self::SecretsManager(o) => o.rate_limit_rps
        }
    }

    pub fn concurrency(&self) -> usize {
        match self {
            Self::Ssm(o) => o.concurrency,
            Self::SecretsManager(o) => o.concurrency
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SsmParameterType {
    SecureString,
    String
}

impl SsmParameterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SecureString => "SecureString",
            Self::String => "String"
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SsmTier {
    Standard,
    Advanced,
    IntelligentTiering
}

impl SsmTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "Standard",
            Self::Advanced => "Advanced",
            Self::IntelligentTiering => "Intelligent-Tiering"
        }
    }
}

#[derive(Debug, Clone)]
pub struct SsmOptions {
    pub prefix: String,
    pub parameter_type: SsmParameterType,
    pub overwrite: bool,
    pub kms_key_id: Option<String>,
    pub tier: Option<SsmTier>,
    pub rate_limit_rps: f64,
    pub concurrency: usize
}

#[derive(Debug, Clone)]
pub struct SecretsManagerOptions {
    pub prefix: String,
    pub overwrite: bool,
    pub kms_key_id: Option<String>,
    pub rate_limit_rps: f64,
    pub concurrency: usize
}

#[derive(Debug, Deserialize)]
struct RawSsmOptions {
    #[serde(default, alias = "path_prefix")]
    prefix: String,
    #[serde(rename = "type", default = "default_parameter_type")]
    parameter_type: String,
    #[serde(default = "default_true")]
    overwrite: bool,
    #[serde(default)]
    kms_key_id: Option<String>,
    #[serde(default)]
    tier: Option<String>,
    #[serde(default = "default_rate_limit")]
    rate_limit_rps: f64,
    #[serde(default = "default_fanout")]
    concurrency: usize
}

impl RawSsmOptions {
    fn validate(self, sink: &str) -> ConfigResult<SsmOptions> {
        let parameter_type = match self.parameter_type.as_str() {
            "SecureString" => SsmParameterType::SecureString,
            "String" => SsmParameterType::String,
            other => {
                return Err(ConfigError::InvalidParameterType {
                    sink: sink.to_string(),
                    value: other.to_string()
                });
            }
        };
        let tier = match self.tier.as_deref() {
            None => None,
            Some("Standard") => Some(SsmTier::Standard),
            Some("Advanced") => Some(SsmTier::Advanced),
            Some("Intelligent-Tiering") => Some(SsmTier::IntelligentTiering),
            Some(other) => {
                return Err(ConfigError::InvalidTier {
                    sink: sink.to_string(),
                    value: other.to_string()
                });
            }
        };
        validate_pool(sink, self.rate_limit_rps, self.concurrency)?;
        Ok(SsmOptions {
            prefix: self.prefix,
            parameter_type,
            overwrite: self.overwrite,
            kms_key_id: self.kms_key_id,
            tier,
            rate_limit_rps: self.rate_limit_rps,
            concurrency: self.concurrency
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawSecretsManagerOptions {
    #[serde(default)]
    prefix: String,
    #[serde(default = "default_true")]
    overwrite: bool,
    #[serde(default)]
    kms_key_id: Option<String>,
    #[serde(default = "default_rate_limit")]
    rate_limit_rps: f64,
    #[serde(default = "default_fanout")]
    concurrency: usize
}

impl RawSecretsManagerOptions {
    fn validate(self, sink: &str) -> ConfigResult<SecretsManagerOptions> {
        validate_pool(sink, self.rate_limit_rps, self.concurrency)?;
        Ok(SecretsManagerOptions {
            prefix: self.prefix,
            overwrite: self.overwrite,
            kms_key_id: self.kms_key_id,
            rate_limit_rps: self.rate_limit_rps,
            concurrency: self.concurrency
        })
    }
}

fn validate_pool(sink: &str, rate_limit_rps: f64, concurrency: usize) -> ConfigResult<()> {
    if rate_limit_rps <= 0.0 {
        return Err(ConfigError::InvalidRateLimit {
            sink: sink.to_string(),
            value: rate_limit_rps
        });
    }
    if concurrency == 0 {
        return Err(ConfigError::InvalidConcurrency {
            owner: sink.to_string()
        });
    }
    Ok(())
}

fn from_options<T: serde::de::DeserializeOwned>(owner: &str, options: Value) -> ConfigResult<T> {
    let options = match options {
        Value::Null => Value::Mapping(serde_yaml::Mapping::new()),
        other => other
    };
    serde_yaml::from_value(options).map_err(|e| ConfigError::InvalidOptions {
        owner: owner.to_string(),
        message: e.to_string()
    })
}

fn default_true() -> bool {
    true
}

fn default_rate_limit() -> f64 {
    10.0
}

fn default_fanout() -> usize {
    8
}

fn default_parameter_type() -> String {
    "SecureString".to_string()
}
