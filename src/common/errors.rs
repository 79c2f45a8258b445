//! Error types for the application

use thiserror::Error;

/// Result type alias using our ClientError
pub type Result<T> = std::result::Result<T, ClientError>;

/// Main error type for client operations
#[derive(Error, Debug)]
pub enum ClientError {
    /// Transport could not be opened within the connect budget
    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    /// The transport handle a request belonged to was torn down
    #[error("Connection reset before a response arrived")]
    ConnectionReset,

    /// No matching response arrived within the request deadline
    #[error("Request {req_id} timed out after {timeout_ms} ms")]
    RequestTimeout { req_id: u64, timeout_ms: u64 },

    /// The server rejected the authorization credential
    #[error("Authorization rejected: {0}")]
    AuthRejected(String),

    /// A tick subscription attempt failed
    #[error("Subscribe to {symbol} failed: {reason}")]
    SubscribeFailed { symbol: String, reason: String },

    /// An inbound frame could not be decoded
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// Structured error carried in a response payload
    #[error("API error {code}: {message}")]
    Api { code: String, message: String },

    /// No transport handle is open
    #[error("Not connected")]
    NotConnected,

    /// Operation requires an authorized session and no credential is known
    #[error("Not authorized")]
    NotAuthorized,

    /// WebSocket send/receive errors
    #[error("WebSocket communication error: {0}")]
    WebSocketCommunication(String),

    /// JSON serialization/deserialization errors
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Channel send errors
    #[error("Channel send error: {0}")]
    ChannelSend(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ClientError {
    /// Whether the failure is transient and handled by the background retry paths.
    ///
    /// Credential rejection and configuration problems are terminal and must
    /// reach the user.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::ConnectFailed(_)
                | ClientError::ConnectionReset
                | ClientError::RequestTimeout { .. }
                | ClientError::SubscribeFailed { .. }
                | ClientError::NotConnected
                | ClientError::WebSocketCommunication(_)
        )
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ClientError::WebSocketCommunication(err.to_string())
    }
}
