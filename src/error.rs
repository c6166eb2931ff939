use thiserror::Error;

use crate::task::CollectionTask;

/// Recoverable failure of a single match fetch. These feed the retry pass.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("timed out waiting for {0}")]
    PageLoadTimeout(String),
    #[error("element not found: {0}")]
    ElementNotFound(String),
    #[error("browser session error: {0}")]
    SessionError(String),
    #[error("network error: {0}")]
    NetworkError(String),
}

impl FetchError {
    pub fn label(&self) -> &'static str {
        match self {
            FetchError::PageLoadTimeout(_) => "page_load_timeout",
            FetchError::ElementNotFound(_) => "element_not_found",
            FetchError::SessionError(_) => "session_error",
            FetchError::NetworkError(_) => "network_error",
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::PageLoadTimeout(
                err.url()
                    .map(|u| u.to_string())
                    .unwrap_or_else(|| "http response".to_string()),
            )
        } else {
            FetchError::NetworkError(err.to_string())
        }
    }
}

/// A failed fetch together with the task that produced it, kept for the retry pass.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{task}: {error}")]
pub struct FetchFailure {
    pub task: CollectionTask,
    pub error: FetchError,
}

/// Failures that stop or narrow a collection call rather than a single match.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollectError {
    #[error("unsupported league {name:?} (expected one of: {expected})")]
    UnsupportedLeague { name: String, expected: String },
    #[error("no known match count for {league} {year}")]
    UnsupportedSeason { league: String, year: i32 },
    #[error("no years requested")]
    InvalidYears,
    #[error("no leagues requested")]
    NoLeagues,
    #[error("season enumeration failed for {league} {year}: {source}")]
    Enumeration {
        league: String,
        year: i32,
        source: FetchError,
    },
}
