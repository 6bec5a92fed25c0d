use thiserror::Error;

pub const GENERIC_FAILURE: &str = "An error occurred";

/// Why a user-initiated action did not complete.
///
/// Every variant leaves the document untouched. `Cancelled` is the only one
/// that is never surfaced as a notification.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("request failed: {0:#}")]
    Transport(anyhow::Error),

    #[error("server returned HTTP {0}")]
    Status(u16),

    #[error("{0}")]
    Rejected(String),

    #[error("unexpected response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("{0}")]
    InvalidInput(&'static str),

    #[error("cancelled")]
    Cancelled,
}

impl ActionError {
    /// Text shown to the user for this failure.
    pub fn user_message(&self) -> String {
        self.user_message_or(GENERIC_FAILURE)
    }

    /// Like [`user_message`](Self::user_message), with `failure` standing in
    /// for transport, status and decode errors.
    pub fn user_message_or(&self, failure: &str) -> String {
        match self {
            ActionError::Rejected(message) => message.clone(),
            ActionError::InvalidInput(message) => (*message).to_string(),
            _ => failure.to_string(),
        }
    }
}
