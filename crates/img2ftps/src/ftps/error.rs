//! FTPS-specific error type.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Categorised FTPS error.
#[derive(Debug, Clone, Serialize, Deserialize, Error)]
#[error("[FTPS {kind:?}] {message}")]
pub struct FtpsError {
    pub kind: FtpsErrorKind,
    pub message: String,
    /// FTP reply code that triggered the error, if any.
    pub code: Option<u16>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FtpsErrorKind {
    /// TCP / DNS resolution failure.
    ConnectionFailed,
    /// AUTH TLS / TLS handshake failure.
    TlsFailed,
    /// Wrong username/password.
    AuthFailed,
    /// Server returned a 4xx/5xx for a command.
    CommandRejected,
    /// Data channel could not be established.
    DataChannelFailed,
    /// Transfer aborted or incomplete.
    TransferFailed,
    /// Server sent an un-parseable response.
    ProtocolError,
    /// Local I/O failure (including reading source files).
    IoError,
    Timeout,
    /// Server closed the control connection.
    Disconnected,
    PermissionDenied,
    NotFound,
    /// Config / parameter validation error.
    InvalidConfig,
    Unknown,
}

pub type FtpsResult<T> = Result<T, FtpsError>;

impl FtpsError {
    pub fn new(kind: FtpsErrorKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            message: msg.into(),
            code: None,
        }
    }

    pub fn with_code(mut self, code: u16) -> Self {
        self.code = Some(code);
        self
    }

    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::new(FtpsErrorKind::ConnectionFailed, msg)
    }

    pub fn tls_failed(msg: impl Into<String>) -> Self {
        Self::new(FtpsErrorKind::TlsFailed, msg)
    }

    pub fn auth_failed(msg: impl Into<String>) -> Self {
        Self::new(FtpsErrorKind::AuthFailed, msg)
    }

    pub fn data_channel(msg: impl Into<String>) -> Self {
        Self::new(FtpsErrorKind::DataChannelFailed, msg)
    }

    pub fn protocol_error(msg: impl Into<String>) -> Self {
        Self::new(FtpsErrorKind::ProtocolError, msg)
    }

    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(FtpsErrorKind::IoError, msg)
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::new(FtpsErrorKind::Timeout, msg)
    }

    pub fn disconnected(msg: impl Into<String>) -> Self {
        Self::new(FtpsErrorKind::Disconnected, msg)
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::new(FtpsErrorKind::InvalidConfig, msg)
    }

    /// Classify an FTP reply code into the most appropriate error kind.
    pub fn from_reply(code: u16, text: &str) -> Self {
        let kind = match code {
            421 => FtpsErrorKind::Disconnected,
            425 | 426 => FtpsErrorKind::DataChannelFailed,
            430 | 530 => FtpsErrorKind::AuthFailed,
            450 | 550 => {
                let lower = text.to_lowercase();
                if lower.contains("permission") || lower.contains("denied") {
                    FtpsErrorKind::PermissionDenied
                } else if lower.contains("not found") || lower.contains("no such") {
                    FtpsErrorKind::NotFound
                } else {
                    FtpsErrorKind::CommandRejected
                }
            }
            451 | 452 | 552 => FtpsErrorKind::TransferFailed,
            _ if code >= 400 => FtpsErrorKind::CommandRejected,
            _ => FtpsErrorKind::Unknown,
        };
        Self {
            kind,
            message: text.to_string(),
            code: Some(code),
        }
    }
}

impl From<std::io::Error> for FtpsError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::TimedOut {
            Self::timeout(format!("I/O timeout: {}", e))
        } else {
            Self::io_error(e.to_string())
        }
    }
}

impl From<rustls::Error> for FtpsError {
    fn from(e: rustls::Error) -> Self {
        Self::tls_failed(e.to_string())
    }
}
