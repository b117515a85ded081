//! Transport seam between [`RemoteSession`](super::RemoteSession) and the SSH library
//!
//! The session client only needs three capabilities from a transport:
//! establish an authenticated session, open a file-transfer sub-channel and
//! open a command-execution sub-channel. [`RusshTransport`](super::RusshTransport)
//! implements them on top of russh; tests plug in in-memory doubles.

use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};

use super::error::SshResult;
use super::host_key::HostKeyPolicy;
use crate::config::ConnectionConfig;

/// Connection behaviour that is not part of the credentials.
///
/// By default any host key is accepted and nothing times out.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// How the server's host key is checked during the handshake
    pub host_key_policy: HostKeyPolicy,
    /// Upper bound for connect + authenticate. `None` waits indefinitely.
    pub connect_timeout: Option<Duration>,
    /// Drop the session after this long without traffic
    pub inactivity_timeout: Option<Duration>,
    /// Send keepalive requests at this interval
    pub keepalive_interval: Option<Duration>,
}

/// One message from a running remote command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecEvent {
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
    ExitStatus(u32),
    /// The command was terminated by this signal, e.g. `KILL`
    ExitSignal(String),
}

/// Establishes authenticated sessions.
#[async_trait]
pub trait SessionTransport: Send + Sync {
    type Session: TransportSession;

    async fn connect(
        &self,
        config: &ConnectionConfig,
        options: &SessionOptions,
    ) -> SshResult<Self::Session>;
}

/// A live, authenticated session.
#[async_trait]
pub trait TransportSession: Send + 'static {
    type Sftp: SftpChannel;
    type Exec: ExecChannel;

    /// Open a file-transfer sub-channel.
    async fn open_sftp(&mut self) -> SshResult<Self::Sftp>;

    /// Open a sub-channel running `command`. Stdin is not forwarded.
    async fn open_exec(&mut self, command: &str) -> SshResult<Self::Exec>;

    /// Gracefully end the session.
    async fn disconnect(&mut self) -> SshResult<()>;

    /// Whether the underlying connection is gone.
    fn is_closed(&self) -> bool;
}

/// A file-transfer sub-channel.
#[async_trait]
pub trait SftpChannel: Send {
    type Writer: AsyncWrite + Send + Unpin;
    type Reader: AsyncRead + Send + Unpin;

    /// Create or truncate `remote_path` for writing.
    async fn create(&mut self, remote_path: &str) -> SshResult<Self::Writer>;

    /// Open `remote_path` for reading.
    async fn open(&mut self, remote_path: &str) -> SshResult<Self::Reader>;

    async fn close(&mut self) -> SshResult<()>;
}

/// A command-execution sub-channel.
#[async_trait]
pub trait ExecChannel: Send {
    /// Next message from the remote command, `None` once the channel is closed.
    async fn next_event(&mut self) -> SshResult<Option<ExecEvent>>;

    async fn close(&mut self) -> SshResult<()>;
}
