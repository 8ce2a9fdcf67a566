//! Error taxonomy shared by the job client, the orchestrators and the HTTP layer.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// A credential the operation needs is missing from the configuration.
    #[error("{0} not configured")]
    NotConfigured(&'static str),
    #[error("provider unreachable: {0}")]
    ProviderUnavailable(String),
    #[error("provider rejected request ({status}): {body}")]
    ProviderRejected { status: u16, body: String },
    #[error("unauthorized webhook request")]
    Unauthorized,
    #[error("{0}")]
    Validation(String),
    #[error("record store error: {0:#}")]
    Store(anyhow::Error),
    #[error("{0:#}")]
    Fatal(anyhow::Error),
}

impl SyncError {
    pub fn validation(msg: impl Into<String>) -> Self {
        SyncError::Validation(msg.into())
    }

    pub fn store(err: anyhow::Error) -> Self {
        SyncError::Store(err)
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return SyncError::ProviderRejected {
                status: err.status().map_or(200, |s| s.as_u16()),
                body: err.to_string(),
            };
        }
        SyncError::ProviderUnavailable(err.to_string())
    }
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;
