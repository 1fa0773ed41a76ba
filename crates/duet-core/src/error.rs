//! Error types for Duet.
//!
//! This module provides a unified error type for all Duet operations,
//! with specific error variants for different failure modes.

use std::io;

use thiserror::Error;

/// A specialized `Result` type for Duet operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for Duet.
#[derive(Error, Debug)]
pub enum Error {
    /// Binary chunk frame shorter than its index header
    #[error("chunk frame too short: {len} bytes, need at least 4")]
    FrameTooShort {
        /// Length of the rejected frame
        len: usize,
    },

    /// Chunk would push the received byte count past the declared size
    #[error("over-delivery for '{file}': {received} bytes would exceed declared {declared}")]
    OverDelivery {
        /// File being received
        file: String,
        /// Byte count the chunk would produce
        received: u64,
        /// Declared file size
        declared: u64,
    },

    /// Chunk index already stored for this transfer
    #[error("duplicate chunk {index} for '{file}'")]
    DuplicateChunk {
        /// File being received
        file: String,
        /// Repeated chunk index
        index: u32,
    },

    /// Channel is closed
    #[error("channel closed")]
    ChannelClosed,

    /// Channel rejected an outbound message
    #[error("channel send failed: {0}")]
    SendFailed(String),

    /// Operation requires an open channel
    #[error("not connected")]
    NotConnected,

    /// An upload is already in progress
    #[error("an upload is already in progress")]
    TransferBusy,

    /// `Ready` arrived but no file is waiting to be sent
    #[error("no file queued for upload")]
    NoQueuedFile,

    /// Invalid peer id format
    #[error("invalid peer id: {0}")]
    InvalidPeerId(String),

    /// Invalid pairing link
    #[error("invalid pairing link: {0}")]
    InvalidLink(String),

    /// Pairing handshake rejected by the remote side
    #[error("pairing rejected: {0}")]
    PairingRejected(String),

    /// Invalid protocol message
    #[error("invalid protocol message: {0}")]
    ProtocolError(String),

    /// Configuration file error
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Invalid configuration value
    #[error("invalid configuration value for '{key}': {reason}")]
    InvalidConfig {
        /// Configuration key
        key: String,
        /// Reason for invalidity
        reason: String,
    },

    /// Invalid user input
    #[error("{0}")]
    InvalidInput(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Internal error (should not happen)
    #[error("internal error: {0}")]
    Internal(String),

    /// Operation timeout
    #[error("operation timed out after {0} seconds")]
    Timeout(u64),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_too_short_message() {
        let err = Error::FrameTooShort { len: 3 };
        assert!(err.to_string().contains("3 bytes"));
    }

    #[test]
    fn test_io_conversion() {
        let err: Error = io::Error::other("broken pipe").into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("broken pipe"));
    }

    #[test]
    fn test_serde_json_conversion() {
        let json_error = serde_json::from_str::<u32>("not json").unwrap_err();
        let err: Error = json_error.into();

        match err {
            Error::Serialization(_) => {}
            e => panic!("Expected Serialization error, got: {e:?}"),
        }
    }
}
