// ===============================
// src/error.rs
// ===============================
//
// Error taxonomy:
// - ConfigError     : rejected at Client::new, never touches the network
// - ValidationError : rejected at enqueue time, no queue/network effect
// - DecodeError     : one malformed inbound message
// - TransportError  : connect / read / write failures
// - ClientError     : everything the caller sees (return values + error channel)
//
use std::io;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid configuration: address is empty")]
    EmptyAddress,
    #[error("invalid configuration: channel capacity must be 1-{max}, got {got}")]
    ChannelCapacity { got: usize, max: usize },
    #[error("invalid configuration: connect timeout must be positive")]
    ConnectTimeout,
    #[error("invalid configuration: reconnect delays must be positive")]
    ReconnectDelay,
    #[error("invalid configuration: min delay {min:?} cannot exceed max delay {max:?}")]
    DelayOrder { min: Duration, max: Duration },
    #[error("invalid configuration: max reconnect attempts must be positive")]
    ReconnectAttempts,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("symbol cannot be empty")]
    EmptySymbol,
    #[error("symbol exceeds maximum length ({len} > {max})")]
    SymbolTooLong { len: usize, max: usize },
    #[error("symbol contains characters not allowed on the wire: {0:?}")]
    InvalidSymbol(String),
    #[error("quantity must be greater than zero")]
    ZeroQuantity,
    #[error("invalid order side: {0:?}")]
    InvalidSide(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("empty message")]
    EmptyMessage,
    #[error("unknown message type: {0}")]
    UnknownType(String),
    #[error("{kind}: expected {expected} fields, got {got}")]
    FieldCount {
        kind: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("{kind}: invalid {field}: {value:?}")]
    InvalidNumber {
        kind: &'static str,
        field: &'static str,
        value: String,
    },
    #[error("{kind}: invalid side: {value:?}")]
    InvalidSide { kind: &'static str, value: String },
    #[error("invalid frame length: {0}")]
    FrameLength(u32),
    #[error("line exceeds {max} bytes")]
    LineTooLong { max: usize },
    #[error("message is not valid UTF-8")]
    Utf8,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("resolve {addr} failed: {source}")]
    Resolve {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("connect to {addr} timed out after {timeout:?}")]
    ConnectTimeout { addr: String, timeout: Duration },
    #[error("connection closed by server")]
    PeerClosed,
    #[error("not connected")]
    NotConnected,
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

/// Failure while pulling the next event off a link: either the socket
/// itself or one malformed message.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
}

impl From<io::Error> for ReadError {
    fn from(e: io::Error) -> Self {
        ReadError::Transport(TransportError::Io(e))
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("write queue full")]
    QueueFull,
    #[error("{channel} channel full, message dropped")]
    ChannelFull { channel: &'static str },
    #[error("client closed")]
    Closed,
    #[error("client already connected")]
    AlreadyConnected,
    #[error("read error: {0}")]
    Read(#[from] ReadError),
    #[error("write error: {0}")]
    Write(#[source] TransportError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("reconnect attempt {attempt} failed: {source}")]
    ReconnectFailed {
        attempt: u32,
        #[source]
        source: TransportError,
    },
    #[error("maximum reconnection attempts exceeded ({0})")]
    MaxReconnects(u32),
    #[error("max consecutive errors ({0}) exceeded")]
    MaxConsecutiveErrors(u32),
}

impl ClientError {
    /// Terminal for the read loop: no more inbound events after this.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ClientError::MaxReconnects(_) | ClientError::MaxConsecutiveErrors(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(ClientError::QueueFull.to_string(), "write queue full");
        assert_eq!(
            ClientError::ChannelFull { channel: "acks" }.to_string(),
            "acks channel full, message dropped"
        );
        assert_eq!(
            DecodeError::FieldCount { kind: "ack", expected: 3, got: 2 }.to_string(),
            "ack: expected 3 fields, got 2"
        );
        let e: ClientError = ValidationError::ZeroQuantity.into();
        assert_eq!(e.to_string(), "quantity must be greater than zero");
    }

    #[test]
    fn fatal_classification() {
        assert!(ClientError::MaxReconnects(1000).is_fatal());
        assert!(ClientError::MaxConsecutiveErrors(100).is_fatal());
        assert!(!ClientError::QueueFull.is_fatal());
        assert!(!ClientError::Transport(TransportError::PeerClosed).is_fatal());
    }
}
