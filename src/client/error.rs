use thiserror::Error;

/// Errors surfaced by [`ApiClient`](super::ApiClient).
///
/// Cloneable so one failed CSRF fetch can be handed to every caller awaiting it.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ClientError {
    /// The server answered with a non-success status.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// The request never produced a response.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body did not have the expected shape.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// A 401 triggered a token refresh, and the refresh itself failed.
    #[error("token refresh failed: {0}")]
    RefreshFailed(String),
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }
}
