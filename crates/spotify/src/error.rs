#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("http transport failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("spotify returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("authorization server rejected the request: {error}")]
    OAuth {
        error: String,
        description: Option<String>,
    },
    #[error("not authorized")]
    NotAuthorized,
    #[error("invalid authorization callback: {0}")]
    InvalidCallback(String),
    #[error("authorization state mismatch")]
    StateMismatch,
    #[error("invalid credential: {0}")]
    Credential(#[from] serde_json::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("not a track uri: {0}")]
    InvalidTrackUri(String),
}

impl ApiError {
    pub fn is_invalid_grant(&self) -> bool {
        matches!(self, ApiError::OAuth { error, .. } if error == "invalid_grant")
    }
}
