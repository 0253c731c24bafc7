use thiserror::Error;

pub type Result<T> = std::result::Result<T, EtsyError>;

#[derive(Debug, Error)]
pub enum EtsyError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Key store error: {0}")]
    KeyStore(String),
}

impl From<reqwest::Error> for EtsyError {
    fn from(err: reqwest::Error) -> Self {
        EtsyError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for EtsyError {
    fn from(err: serde_json::Error) -> Self {
        EtsyError::Parse(err.to_string())
    }
}

impl From<std::io::Error> for EtsyError {
    fn from(err: std::io::Error) -> Self {
        EtsyError::KeyStore(err.to_string())
    }
}
