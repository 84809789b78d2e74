//! Error taxonomy shared by the codec, storage, and worker layers.
//!
//! Transport failures never escape on their own: the protocol layer wraps them
//! into [`ProtocolError::Receive`] or [`ProtocolError::Send`] so callers only
//! ever match on protocol, serialization, or storage failures.

use std::io;

use thiserror::Error;

/// Failure of the underlying byte channel.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("peer closed the connection after {received} of {expected} bytes")]
    Closed { expected: usize, received: usize },
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("failed to receive message: {0}")]
    Receive(#[source] TransportError),
    #[error("failed to send message: {0}")]
    Send(#[source] TransportError),
    #[error("unknown message type 0x{0:02x}")]
    UnknownMessageType(u8),
    #[error("frame too large: max {max_bytes} got {got_bytes}")]
    FrameTooLarge { max_bytes: usize, got_bytes: usize },
    #[error("{0} message carries no agency id")]
    MissingAgency(&'static str),
    #[error("unexpected {0} message")]
    UnexpectedMessage(&'static str),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SerializationError {
    #[error("expected {expected} fields, got {got}")]
    FieldCount { expected: usize, got: usize },
    #[error("field `{field}` is not a valid integer: {value:?}")]
    InvalidInteger { field: &'static str, value: String },
    #[error("field `{field}` is not valid utf-8")]
    InvalidUtf8 { field: &'static str },
    #[error("batch record {index} is malformed: {source}")]
    Record {
        index: usize,
        #[source]
        source: Box<SerializationError>,
    },
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("ledger io error: {0}")]
    Io(#[from] io::Error),
    #[error("ledger entry could not be encoded: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("ledger line {line} is corrupt: {source}")]
    Corrupt {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("storage arbitrator is no longer running")]
    Unavailable,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CompletionError {
    #[error("agency {agency} is outside the configured range 1..={total}")]
    UnknownAgency { agency: u8, total: u8 },
}

/// Anything that can end a client worker early.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Serialization(#[from] SerializationError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Completion(#[from] CompletionError),
}
