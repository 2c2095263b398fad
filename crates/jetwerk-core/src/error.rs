// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Jetwerk.

use thiserror::Error;

/// Top-level error type for all Jetwerk operations.
#[derive(Debug, Error)]
pub enum JetwerkError {
    // -- Transport errors (fatal to the connection) --
    #[error("invalid printer address: {0}")]
    InvalidAddress(String),

    #[error("could not resolve {host}: {detail}")]
    NameResolution { host: String, detail: String },

    #[error("socket creation failed: {0}")]
    SocketCreate(String),

    #[error("connect to {addr} timed out after {timeout_ms} ms")]
    ConnectTimeout { addr: String, timeout_ms: u64 },

    #[error("connection to {addr} refused by the printer")]
    ConnectRefused { addr: String },

    #[error("connect to {addr} failed: {detail}")]
    Connect { addr: String, detail: String },

    #[error("not connected to a printer")]
    NotConnected,

    #[error("send failed: {0}")]
    Send(String),

    #[error("receive failed: {0}")]
    Receive(String),

    #[error("printer closed the connection")]
    PeerClosed,

    // -- Timeouts --
    #[error("no acknowledgement within {timeout_ms} ms")]
    CommandTimeout { timeout_ms: u64 },

    // -- Protocol errors (connection stays up) --
    #[error("reply too short ({len} bytes)")]
    ShortReply { len: usize },

    #[error("reply does not start with ESC (got 0x{0:02X})")]
    BadFrameStart(u8),

    #[error("printer answered NAK")]
    Nak,

    #[error("unexpected reply status byte 0x{0:02X}")]
    UnexpectedStatusByte(u8),

    #[error("reply has no ESC ETX terminator")]
    MissingTerminator,

    #[error("malformed escape sequence at offset {offset}")]
    MalformedEscape { offset: usize },

    #[error("checksum mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    ChecksumMismatch { expected: u8, actual: u8 },

    #[error("reply acknowledges command 0x{actual:02X}, expected 0x{expected:02X}")]
    UnexpectedCommand { expected: u8, actual: u8 },

    #[error("payload too large: {len} bytes (max {max})")]
    PayloadTooLarge { len: usize, max: usize },

    // -- Validation (rejected before queuing) --
    #[error("print content must be 1-{max} characters (got {len})")]
    InvalidContent { len: usize, max: usize },

    #[error("print count must be between 1 and {max} (got {count})")]
    InvalidCount { count: i64, max: u32 },

    #[error("printer is not ready to print (status {0})")]
    NotPrintable(String),

    // -- Worker lifecycle / internal faults --
    #[error("worker thread did not stop within {timeout_ms} ms")]
    WorkerStop { timeout_ms: u64 },

    #[error("previous worker thread is still finishing a device command")]
    WorkerBusy,

    #[error("worker iteration panicked: {0}")]
    WorkerPanic(String),

    #[error("event delivery failed: {0}")]
    EventDelivery(String),

    // -- Storage / persistence --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Broad failure category, used to decide what a failure does to the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Socket create/connect/send/recv failure. The connection is torn down.
    Transport,
    /// Command or connect timeout. Only the current operation fails.
    Timeout,
    /// Bad frame, NAK or checksum mismatch. The connection stays up.
    Protocol,
    /// Device reported a fault through its error mask.
    Device,
    /// Rejected at the command API boundary.
    Validation,
    /// Unexpected fault inside the controller.
    Internal,
}

impl ErrorClass {
    /// Whether an error of this class leaves the socket unusable.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(self, Self::Transport)
    }
}

impl JetwerkError {
    /// Classify this error per the controller's failure taxonomy.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidAddress(_)
            | Self::NameResolution { .. }
            | Self::SocketCreate(_)
            | Self::ConnectRefused { .. }
            | Self::Connect { .. }
            | Self::NotConnected
            | Self::Send(_)
            | Self::Receive(_)
            | Self::PeerClosed => ErrorClass::Transport,

            Self::ConnectTimeout { .. } | Self::CommandTimeout { .. } => ErrorClass::Timeout,

            Self::ShortReply { .. }
            | Self::BadFrameStart(_)
            | Self::Nak
            | Self::UnexpectedStatusByte(_)
            | Self::MissingTerminator
            | Self::MalformedEscape { .. }
            | Self::ChecksumMismatch { .. }
            | Self::UnexpectedCommand { .. }
            | Self::PayloadTooLarge { .. } => ErrorClass::Protocol,

            Self::InvalidContent { .. } | Self::InvalidCount { .. } | Self::NotPrintable(_) => {
                ErrorClass::Validation
            }

            Self::WorkerStop { .. }
            | Self::WorkerBusy
            | Self::WorkerPanic(_)
            | Self::EventDelivery(_)
            | Self::Serialization(_) => ErrorClass::Internal,

            Self::Io(io_err) => match io_err.kind() {
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                    ErrorClass::Timeout
                }
                _ => ErrorClass::Transport,
            },
        }
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, JetwerkError>;
