use thiserror::Error;

/// Everything the client side can fail with.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClientError {
    #[error("Find required")]
    FindRequired,
    #[error("ID required")]
    IdRequired,
    #[error("Summary is required.")]
    SummaryRequired,
    #[error("Date is in the future.")]
    FutureDate,
    #[error("Unable to get entry.")]
    EntryUnavailable,
    #[error("Invalid response")]
    InvalidResponse,
    /// Error reported by the service in the response envelope.
    #[error("{message}")]
    Remote { code: Option<i64>, message: String },
    #[error("transport error: {0}")]
    Transport(String),
}

impl ClientError {
    /// Text for the status line. Failures without a message the user can act
    /// on fall back to the action's generic text.
    pub fn status_message(&self, fallback: &str) -> String {
        match self {
            ClientError::Transport(_) => fallback.to_string(),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        ClientError::Transport(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_failures_use_the_fallback() {
        let err = ClientError::Transport("connection refused".to_string());
        assert_eq!(err.status_message("Unable to populate entries."), "Unable to populate entries.");
    }

    #[test]
    fn remote_errors_are_shown_verbatim() {
        let err = ClientError::Remote {
            code: Some(-32099),
            message: "Failed to put entry".to_string(),
        };
        assert_eq!(err.status_message("Unable to put entries."), "Failed to put entry");
        assert_eq!(
            ClientError::FindRequired.status_message("Unable to populate entries."),
            "Find required"
        );
    }
}
