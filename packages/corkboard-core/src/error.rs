/// Error taxonomy shared by the store, the coordinator and the transports.

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    #[error("Too many requests, the server is rate limiting")]
    RateLimited,

    #[error("Service unavailable (maintenance mode)")]
    ServiceUnavailable,

    #[error("Request rejected with status {status}: {message}")]
    ValidationRejected { status: u16, message: String },

    #[error("Network unavailable: {0}")]
    NetworkUnavailable(String),

    #[error("Push channel disconnected: {0}")]
    ChannelDisconnected(String),

    #[error("Malformed response: {0}")]
    Decode(String),

    #[error("Local patch rejected: {0}")]
    Patch(#[from] PatchError),

    #[error("View was unmounted, open a new session")]
    Unmounted,
}

impl SyncError {
    /// Map a non-2xx HTTP status and its body text onto the taxonomy.
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            429 => SyncError::RateLimited,
            503 => SyncError::ServiceUnavailable,
            _ => SyncError::ValidationRejected {
                status,
                message: if body.trim().is_empty() {
                    format!("HTTP {}", status)
                } else {
                    body.trim().to_string()
                },
            },
        }
    }

    /// Errors the user must see; everything else is logged only.
    pub fn is_user_visible(&self) -> bool {
        matches!(self, SyncError::RateLimited | SyncError::ServiceUnavailable)
    }
}

/// Reasons an optimistic patch cannot be applied to the current snapshot.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatchError {
    #[error("Snapshot not loaded yet")]
    NotLoaded,

    #[error("Board not found: {0}")]
    UnknownBoard(String),

    #[error("Column not found: {0}")]
    UnknownColumn(String),

    #[error("Card not found: {0}")]
    UnknownCard(String),

    #[error("Label not found: {0}")]
    UnknownLabel(String),

    #[error("Invariant violated: {0}")]
    Invariant(String),
}
