use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Host unreachable: {0}")]
    Unreachable(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Unexpected status {status} for {url}")]
    BadStatus { url: String, status: StatusCode },
}

impl FetchError {
    /// Classify a reqwest failure, separating connection failures out so the
    /// logs can tell "offline" apart from protocol trouble.
    pub fn from_transport(error: reqwest::Error) -> Self {
        if error.is_connect() {
            let target = error
                .url()
                .map(|u| u.to_string())
                .unwrap_or_else(|| "unknown host".to_string());
            FetchError::Unreachable(target)
        } else {
            FetchError::NetworkError(error)
        }
    }

    /// Treat a non-2xx response as a failure. Used where a fetch must produce
    /// usable content, such as manifest seeding.
    pub fn require_success(url: &str, status: StatusCode) -> Result<(), Self> {
        if status.is_success() {
            Ok(())
        } else {
            Err(FetchError::BadStatus {
                url: url.to_string(),
                status,
            })
        }
    }
}
