use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("JSON parse error: {0}")]
    ConfigParse(#[source] serde_json::Error),

    #[error("JSON marshal error: {0}")]
    ConfigMarshal(#[source] serde_json::Error),

    #[error("config decode error: {0}")]
    ConfigTypedParse(String),

    #[error("engine create error: {0}")]
    EngineConstruct(String),

    #[error("engine start error: {0}")]
    EngineStart(String),

    #[error("no engine factory installed")]
    EngineUnavailable,

    #[error("runtime error: {0}")]
    Runtime(#[from] std::io::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl AppError {
    /// Typed-parse failure after both the context-aware and the plain
    /// decoder rejected the document.
    #[must_use]
    pub fn typed_parse_both(context_err: &str, plain_err: &str) -> Self {
        Self::ConfigTypedParse(format!(
            "context decode: {context_err}; plain decode: {plain_err}"
        ))
    }

    /// Render an engine-side error chain on a single line.
    #[must_use]
    pub fn engine_construct(err: &anyhow::Error) -> Self {
        Self::EngineConstruct(format!("{err:#}"))
    }

    #[must_use]
    pub fn engine_start(err: &anyhow::Error) -> Self {
        Self::EngineStart(format!("{err:#}"))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
