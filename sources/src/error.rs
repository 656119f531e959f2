use thiserror::Error;

pub type SourceResult<T> = Result<T, SourceError>;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error
    },

    #[error("failed to parse YAML in '{path}': {message}")]
    Yaml { path: String, message: String },

    #[error("key '{key}' not found in merged YAML documents")]
    MissingKey { key: String },

    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error
    },

    #[error("'{program}' exited with status {code}: {stderr}")]
    Subprocess {
        program: String,
        code: i32,
        stderr: String
    },

    #[error("'{program}' produced invalid JSON ({message}); stderr: {stderr}")]
    Json {
        program: String,
        message: String,
        stderr: String
    },

    #[error("unexpected JSON shape from '{program}': {message}")]
    Contract { program: String, message: String },

    #[error("invalid filter pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("template evaluation failed in '{path}': {source}")]
    Template {
        path: String,
        #[source]
        source: config::TemplateError
    },

    #[error("source task was cancelled")]
    Cancelled
}
