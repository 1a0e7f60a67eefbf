use thiserror::Error;

/// Errors surfaced by the controller link.
///
/// Cloneable because a pump publishes the same error both to its log line
/// and to the error channel consumed by `recv`.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("invalid controller url: {0}")]
    InvalidUrl(String),

    #[error("failed to connect to controller: {0}")]
    ConnectionFailed(String),

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("not connected to controller")]
    Disconnected,

    #[error("operation timed out")]
    Timeout,

    #[error("failed to send message: {0}")]
    SendFailed(String),

    #[error("failed to receive message: {0}")]
    ReceiveFailed(String),

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("receive cancelled")]
    Cancelled,
}

impl TransportError {
    /// Stable error code, used in error envelopes and logs.
    pub fn code(&self) -> &'static str {
        match self {
            TransportError::InvalidUrl(_) => "INVALID_URL",
            TransportError::ConnectionFailed(_) => "CONNECTION_FAILED",
            TransportError::AuthenticationFailed => "AUTHENTICATION_FAILED",
            TransportError::Disconnected => "DISCONNECTED",
            TransportError::Timeout => "TIMEOUT",
            TransportError::SendFailed(_) => "SEND_FAILED",
            TransportError::ReceiveFailed(_) => "RECEIVE_FAILED",
            TransportError::InvalidMessage(_) => "INVALID_MESSAGE",
            TransportError::Cancelled => "CANCELLED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(TransportError::Disconnected.code(), "DISCONNECTED");
        assert_eq!(
            TransportError::ConnectionFailed("x".into()).code(),
            "CONNECTION_FAILED"
        );
        assert_eq!(TransportError::AuthenticationFailed.code(), "AUTHENTICATION_FAILED");
    }
}
