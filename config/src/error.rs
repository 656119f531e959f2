use thiserror::Error;

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Load-time configuration errors. All of these are terminal: the run never
/// starts with a partially valid configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no config files provided; use one or more -f/--file options")]
    NoConfigFiles,

    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error
    },

    #[error("failed to parse '{path}': {message}")]
    Parse { path: String, message: String },

    #[error("invalid config structure: {message}")]
    InvalidShape { message: String },

    #[error("missing variable '{name}' for template interpolation in {location}")]
    UnresolvedVar { name: String, location: String },

    #[error("unresolved template placeholder left after loading: {snippet}")]
    UnresolvedPlaceholder { snippet: String },

    #[error("unknown source type: {type_}")]
    UnknownSourceType { type_: String },

    #[error("unknown sink type: {type_}")]
    UnknownSinkType { type_: String },

    #[error("duplicate source name: {name}")]
    DuplicateSource { name: String },

    #[error("sink '{sink}' references unknown source '{source_name}'")]
    UnknownSourceRef { sink: String, source_name: String },

    #[error("invalid options for '{owner}': {message}")]
    InvalidOptions { owner: String, message: String },

    #[error("SSM 'type' must be 'SecureString' or 'String', got '{value}' for sink '{sink}'")]
    InvalidParameterType { sink: String, value: String },

    #[error(
        "SSM 'tier' must be 'Standard', 'Advanced' or 'Intelligent-Tiering', got '{value}' for sink '{sink}'"
    )]
    InvalidTier { sink: String, value: String },

    #[error("'rate_limit_rps' must be positive, got {value} for sink '{sink}'")]
    InvalidRateLimit { sink: String, value: f64 },

    #[error("'concurrency' must be positive for '{owner}'")]
    InvalidConcurrency { owner: String }
}
