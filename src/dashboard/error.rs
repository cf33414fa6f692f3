//! Dashboard error types

use thiserror::Error;

use crate::backend::BackendError;

/// Errors surfaced by the stats loader and the realtime listener
#[derive(Error, Debug)]
pub enum DashboardError {
    /// Nobody is signed in; stats were not requested
    #[error("Not authenticated")]
    Unauthenticated,

    /// Resolving the user or fetching stats failed
    #[error("Failed to load stats: {0}")]
    Fetch(#[source] BackendError),

    /// The realtime channel could not be opened
    #[error("Realtime subscription failed: {0}")]
    Subscription(#[source] BackendError),
}

/// Result type alias for dashboard operations
pub type DashboardResult<T> = Result<T, DashboardError>;

/// Cloneable summary of the last failed load, kept in the view state
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum LoadFailure {
    Unauthenticated,
    Fetch(String),
}

impl From<&DashboardError> for LoadFailure {
    fn from(err: &DashboardError) -> Self {
        match err {
            DashboardError::Unauthenticated => LoadFailure::Unauthenticated,
            DashboardError::Fetch(e) | DashboardError::Subscription(e) => {
                LoadFailure::Fetch(e.to_string())
            }
        }
    }
}

impl std::fmt::Display for LoadFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadFailure::Unauthenticated => write!(f, "Not authenticated"),
            LoadFailure::Fetch(message) => write!(f, "{}", message),
        }
    }
}
