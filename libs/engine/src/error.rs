use recscope_api::{PayloadType, SerdeError};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("config error: {0}")]
    Config(String),

    /// The `__consumer_offsets` contract was violated.
    #[error("consumer offsets: {0}")]
    Offsets(SerdeError),

    #[error("failed to serialize {side}: {source}")]
    Serialize {
        side: PayloadType,
        #[source]
        source: SerdeError,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Add context to the error.
    ///
    /// For codec-backed variants the context goes to the inner `SerdeError`;
    /// for `Config` it is prepended to the message.
    pub fn with_context(self, ctx: impl std::fmt::Display) -> Self {
        match self {
            EngineError::Config(msg) => EngineError::Config(format!("{ctx}: {msg}")),
            EngineError::Offsets(e) => EngineError::Offsets(e.with_context(ctx)),
            EngineError::Serialize { side, source } => EngineError::Serialize {
                side,
                source: source.with_context(ctx),
            },
            other => other,
        }
    }
}

/// Codec errors raised while building the service are configuration errors.
impl From<SerdeError> for EngineError {
    fn from(e: SerdeError) -> Self {
        EngineError::Config(e.message().to_string())
    }
}
