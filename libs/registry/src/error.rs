use recscope_api::SerdeError;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("config error: {0}")]
    Config(String),

    #[error("request to {url} failed: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("{url} returned status {status}: {body}")]
    Status { url: String, status: u16, body: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("failed to decode registry response: {0}")]
    Decode(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RegistryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RegistryError::NotFound(_))
    }
}

impl From<RegistryError> for SerdeError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::Config(msg) => SerdeError::config(msg),
            other => SerdeError::dependency(other.to_string()),
        }
    }
}
