use sources::SourceError;
use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("source '{name}' failed: {source}")]
    Source {
        name: String,
        #[source]
        source: SourceError
    },

    #[error("reporter task failed: {message}")]
    Reporter { message: String }
}
