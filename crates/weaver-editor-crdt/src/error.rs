//! Error types for CRDT operations.

use thiserror::Error;

/// Errors that can occur during CRDT operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum CrdtError {
    /// Failed to import CRDT data.
    #[error("failed to import CRDT data: {0}")]
    Import(String),

    /// Failed to export CRDT data.
    #[error("failed to export CRDT data: {0}")]
    Export(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Malformed presence update from a peer.
    #[error("invalid presence update: {0}")]
    Presence(String),

    /// Configuration could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Loro CRDT error.
    #[error("loro error: {0}")]
    Loro(String),
}

impl From<loro::LoroError> for CrdtError {
    fn from(e: loro::LoroError) -> Self {
        CrdtError::Loro(e.to_string())
    }
}

impl From<serde_json::Error> for CrdtError {
    fn from(e: serde_json::Error) -> Self {
        CrdtError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for CrdtError {
    fn from(e: toml::de::Error) -> Self {
        CrdtError::Config(e.to_string())
    }
}
