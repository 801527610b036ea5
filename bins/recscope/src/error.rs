#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    Engine(#[from] recscope_engine::EngineError),

    #[error("input ({context}): {detail}")]
    Input { context: &'static str, detail: String },

    #[error("output: {0}")]
    Output(#[from] serde_json::Error),
}

impl CliError {
    pub fn input(context: &'static str, detail: impl std::fmt::Display) -> Self {
        CliError::Input {
            context,
            detail: detail.to_string(),
        }
    }
}
