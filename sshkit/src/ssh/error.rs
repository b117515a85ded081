//! SSH error types

use std::path::PathBuf;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur during SSH operations
#[derive(Debug, Error)]
pub enum SshError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Host key verification failed for {host}")]
    HostKeyVerification { host: String },

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Session is already connected")]
    AlreadyConnected,

    #[error("Session was closed; create a new client to reconnect")]
    SessionClosed,

    #[error("Not connected")]
    NotConnected,

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Transfer of {path} failed: {reason}")]
    Transfer { path: String, reason: String },

    #[error("Command execution failed: {0}")]
    Exec(String),

    #[error("Command returned non-zero exit code: {code}")]
    NonZeroExit { code: u32, stderr: String },

    #[error("Command was killed by signal {signal}")]
    KilledBySignal { signal: String, stderr: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SSH protocol error: {0}")]
    Protocol(String),
}

/// Coarse error category, one per failure class of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or missing credentials
    Config,
    /// Handshake, authentication, network or lifecycle failure while opening
    Connection,
    /// Operation attempted without a live session
    NotConnected,
    /// Upload or download failure
    Transfer,
    /// Remote execution channel or I/O failure
    Exec,
}

impl SshError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SshError::Config(_) => ErrorKind::Config,
            SshError::Connection(_)
            | SshError::Authentication(_)
            | SshError::HostKeyVerification { .. }
            | SshError::Timeout(_)
            | SshError::AlreadyConnected
            | SshError::SessionClosed
            | SshError::Io(_)
            | SshError::Protocol(_) => ErrorKind::Connection,
            SshError::NotConnected => ErrorKind::NotConnected,
            SshError::FileNotFound(_) | SshError::Transfer { .. } => ErrorKind::Transfer,
            SshError::Exec(_)
            | SshError::NonZeroExit { .. }
            | SshError::KilledBySignal { .. } => ErrorKind::Exec,
        }
    }

    pub(crate) fn transfer(path: &str, reason: impl ToString) -> Self {
        SshError::Transfer {
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Re-tag a transport failure that happened while transferring `path`.
    pub(crate) fn into_transfer(self, path: &str) -> Self {
        match self.kind() {
            ErrorKind::Transfer | ErrorKind::NotConnected => self,
            _ => SshError::transfer(path, self),
        }
    }

    /// Re-tag a transport failure that happened while running a command.
    pub(crate) fn into_exec(self) -> Self {
        match self.kind() {
            ErrorKind::Exec | ErrorKind::NotConnected => self,
            _ => SshError::Exec(self.to_string()),
        }
    }
}

impl From<russh::Error> for SshError {
    fn from(e: russh::Error) -> Self {
        SshError::Protocol(e.to_string())
    }
}

/// Result type for SSH operations
pub type SshResult<T> = std::result::Result<T, SshError>;
