/// Every way a comment retrieval can end without data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("Please enter a valid YouTube URL.")]
    InvalidInput,
    #[error("No internet connection. Please check your network.")]
    Offline,
    #[error("Failed to connect to the server ({0})")]
    Transient(String),
    #[error("server reported: {message}")]
    Server { status: u16, message: String },
    #[error("Invalid response format: {0}")]
    Malformed(String),
}

impl FetchError {
    /// No response was obtained; the request may succeed if repeated.
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient(_))
    }

    pub fn is_connectivity(&self) -> bool {
        matches!(self, FetchError::Offline)
    }

    /// Whether the failure state should offer a manual retry action.
    pub fn retryable_by_user(&self) -> bool {
        !matches!(self, FetchError::InvalidInput)
    }

    /// Message shown in the failure state; server messages pass through verbatim.
    pub fn user_message(&self) -> String {
        match self {
            FetchError::Transient(_) => "Failed to connect to the server".to_string(),
            FetchError::Server { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}
