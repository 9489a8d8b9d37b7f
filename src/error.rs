// MIT License - Copyright (c) 2026 Peter Wright
// Error taxonomy

use std::fmt;

use crate::points::PointId;

/// Error classes, used by the poll tick and the command paths to decide what
/// an error means for the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No reply within the bound. Tolerated a few times while polling.
    Timeout,
    /// Bad CRC, oversize message, unexpected reply, device Nak.
    ProtocolFormat,
    /// Invalid security code or rejected login.
    Authorization,
    /// Unknown item name or point id.
    NotFound,
    /// Malformed persisted configuration or setup values.
    Configuration,
    /// Malformed command text or point value.
    Format,
    /// Reserved; no device checks are made yet.
    UnsupportedDevice,
    /// The socket or session went away.
    Connection,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Timeout => "timeout",
            Self::ProtocolFormat => "protocol format",
            Self::Authorization => "authorization",
            Self::NotFound => "not found",
            Self::Configuration => "configuration",
            Self::Format => "format",
            Self::UnsupportedDevice => "unsupported device",
            Self::Connection => "connection",
        };
        f.write_str(s)
    }
}

/// All errors that can occur in the omni-lan-bridge library.
#[derive(Debug, thiserror::Error)]
pub enum OmniError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timeout waiting for {operation}")]
    Timeout { operation: String },

    #[error("CRC mismatch (computed {computed:#06x}, received {received:#06x})")]
    CrcMismatch { computed: u16, received: u16 },

    #[error("Oversize message: length byte {length}, {available} bytes available")]
    OversizeMessage { length: usize, available: usize },

    #[error("Controller sent Nak")]
    Nak,

    #[error("Unexpected reply: expected {expected}, got {got}")]
    UnexpectedReply { expected: String, got: String },

    #[error("Malformed packet: {details}")]
    MalformedPacket { details: String },

    #[error("Secure session negotiation failed: {stage}")]
    HandshakeFailed { stage: String },

    #[error("Login rejected by controller")]
    LoginRejected,

    #[error("Invalid security code for area {area}")]
    InvalidCode { area: u8 },

    #[error("No item named {name}")]
    ItemNotFound { name: String },

    #[error("No field with id {id}")]
    FieldNotFound { id: PointId },

    #[error("Configuration error: {details}")]
    Configuration { details: String },

    #[error("Format error: {details}")]
    Format { details: String },

    #[error("Unsupported device: {details}")]
    UnsupportedDevice { details: String },

    #[error("Not connected")]
    Disconnected,
}

impl OmniError {
    /// The taxonomy class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::CrcMismatch { .. }
            | Self::OversizeMessage { .. }
            | Self::Nak
            | Self::UnexpectedReply { .. }
            | Self::MalformedPacket { .. } => ErrorKind::ProtocolFormat,
            Self::LoginRejected | Self::InvalidCode { .. } => ErrorKind::Authorization,
            Self::ItemNotFound { .. } | Self::FieldNotFound { .. } => ErrorKind::NotFound,
            Self::Configuration { .. } => ErrorKind::Configuration,
            Self::Format { .. } => ErrorKind::Format,
            Self::UnsupportedDevice { .. } => ErrorKind::UnsupportedDevice,
            Self::Io(_) | Self::HandshakeFailed { .. } | Self::Disconnected => {
                ErrorKind::Connection
            }
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.kind() == ErrorKind::Timeout
    }

    pub(crate) fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    pub(crate) fn format(details: impl Into<String>) -> Self {
        Self::Format {
            details: details.into(),
        }
    }

    pub(crate) fn config(details: impl Into<String>) -> Self {
        Self::Configuration {
            details: details.into(),
        }
    }

    pub(crate) fn malformed(details: impl Into<String>) -> Self {
        Self::MalformedPacket {
            details: details.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, OmniError>;
