use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemeError {
    /// The request URI is not an absolute URL
    #[error("invalid request url: {0}")]
    InvalidUrl(String),
    #[error("invalid header: {0}")]
    InvalidHeader(String),
    #[error("invalid status code: {0}")]
    InvalidStatus(u16),
}

impl From<url::ParseError> for SchemeError {
    fn from(err: url::ParseError) -> Self {
        SchemeError::InvalidUrl(err.to_string())
    }
}
