//! Error types for the securesub client.
//!
//! Connection-scoped failures are delivered as events on the connection's
//! queue; call-scoped failures come back from the call that caused them.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    /// Required configuration is missing or malformed
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// A PEM file could not be read
    #[error("Failed to read key file {}: {source}", .path.display())]
    KeyFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The connection handshake did not complete
    #[error("Connection error: {0}")]
    Connection(String),

    /// The operation needs an established connection
    #[error("Not connected")]
    NotConnected,

    /// The service rejected a subscribe call
    #[error("Subscribe failed: {0}")]
    Subscribe(String),

    /// The service rejected a produce call
    #[error("Delivery error: {0}")]
    Publish(String),

    /// An envelope could not be opened with this recipient's key
    #[error("Decrypt failed: {0}")]
    Decrypt(String),

    /// A signature did not match the counterparty certificate
    #[error("Signature verification failed for message key {key}")]
    VerifyFailure { key: String },

    /// The peer broke the wire protocol
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The service emitted an `error` event
    #[error("Service error: {0}")]
    Service(String),

    #[error("Crypto error: {0}")]
    Crypto(#[from] openssl::error::ErrorStack),

    #[error("Transport error: {0}")]
    Transport(Box<tungstenite::Error>),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl From<tungstenite::Error> for ClientError {
    fn from(err: tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::Http(response) => ClientError::Connection(format!(
                "handshake rejected with status {}",
                response.status()
            )),
            other => ClientError::Transport(Box::new(other)),
        }
    }
}

impl From<url::ParseError> for ClientError {
    fn from(err: url::ParseError) -> Self {
        ClientError::InvalidUrl(err.to_string())
    }
}

/// Result type for securesub operations
pub type Result<T> = std::result::Result<T, ClientError>;
