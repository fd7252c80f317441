//! Error types for the bridge

use thiserror::Error;

use crate::config::ConfigError;

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Errors surfaced by the bridge and its collaborators.
///
/// None of these stop the mediator; they end up as log lines or
/// `SendFailed`/`JoinFailed` notifications.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// The peer-discovery collaborator rejected a command
    #[error("Peer discovery error: {0}")]
    Discovery(String),

    /// The message-delivery collaborator rejected a command
    #[error("Message delivery error: {0}")]
    Delivery(String),

    /// The mediator task has stopped and no longer accepts commands
    #[error("Mediator is not running")]
    MediatorClosed,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}
