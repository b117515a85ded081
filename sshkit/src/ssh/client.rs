//! Remote session client

use russh::Channel;
use russh::client::Msg;
use std::fmt;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::channel;
use super::connection::RusshTransport;
use super::error::{SshError, SshResult};
use super::transport::{
    ExecChannel, ExecEvent, SessionOptions, SessionTransport, SftpChannel, TransportSession,
};
use crate::config::{ConfigRecord, ConnectionConfig};

const CHUNK_SIZE: usize = 64 * 1024;

/// Output from a command execution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Standard output
    pub stdout: String,
    /// Standard error; empty when it was forwarded to the local stderr
    pub stderr: String,
    /// Exit code, if the server reported one
    pub exit_code: Option<u32>,
    /// Name of the signal that terminated the command, e.g. `KILL`
    pub exit_signal: Option<String>,
}

impl CommandOutput {
    /// Check if command succeeded
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Lifecycle of a [`RemoteSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Constructed, `open` not yet called
    Unopened,
    /// Holding a live session
    Open,
    /// Closed or failed to open; cannot be reopened
    Closed,
}

enum SessionState<S> {
    Unopened,
    Open(S),
    Closed,
}

/// A single SSH session to one host, used for file transfer and remote
/// command execution.
///
/// The client moves through `Unopened -> Open -> Closed` and never back.
/// Every operation takes `&mut self`, so a client serves one caller at a
/// time. Each transfer or command uses its own short-lived sub-channel that
/// is closed before the operation returns.
pub struct RemoteSession<T: SessionTransport = RusshTransport> {
    config: ConnectionConfig,
    options: SessionOptions,
    transport: T,
    state: SessionState<T::Session>,
}

impl RemoteSession<RusshTransport> {
    /// Create a client for an already validated config.
    pub fn new(config: ConnectionConfig) -> Self {
        Self::with_transport(config, SessionOptions::default(), RusshTransport)
    }

    /// Create a client from a parsed config record.
    pub fn from_config(record: ConfigRecord) -> SshResult<Self> {
        Ok(Self::new(ConnectionConfig::try_from(record)?))
    }

    /// Create a client from explicit credentials.
    pub fn from_explicit_credentials(
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> SshResult<Self> {
        Ok(Self::new(ConnectionConfig::new(host, port, user, password)?))
    }

    /// Open a raw session channel for callers that manage the channel
    /// themselves, e.g. request a shell and read it with
    /// [`drain_channel_output`](Self::drain_channel_output).
    pub async fn open_channel(&mut self) -> SshResult<Channel<Msg>> {
        let result = self.live_session()?.open_channel().await;
        self.settle(result)
    }
}

impl<T: SessionTransport> RemoteSession<T> {
    pub fn with_transport(config: ConnectionConfig, options: SessionOptions, transport: T) -> Self {
        Self {
            config,
            options,
            transport,
            state: SessionState::Unopened,
        }
    }

    /// Replace the session options. Only affects a later `open`.
    pub fn with_options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn state(&self) -> SessionStatus {
        match self.state {
            SessionState::Unopened => SessionStatus::Unopened,
            SessionState::Open(_) => SessionStatus::Open,
            SessionState::Closed => SessionStatus::Closed,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, SessionState::Open(_))
    }

    /// Connect and authenticate with the configured password.
    ///
    /// A client opens at most once. A failed attempt leaves it closed.
    pub async fn open(&mut self) -> SshResult<()> {
        match self.state {
            SessionState::Unopened => {}
            SessionState::Open(_) => return Err(SshError::AlreadyConnected),
            SessionState::Closed => return Err(SshError::SessionClosed),
        }

        tracing::debug!(
            host = %self.config.host(),
            port = self.config.port(),
            user = %self.config.user(),
            host_key_policy = %self.options.host_key_policy,
            "Opening SSH session"
        );

        match self.transport.connect(&self.config, &self.options).await {
            Ok(session) => {
                self.state = SessionState::Open(session);
                tracing::info!(session = %self.config, "SSH session established");
                Ok(())
            }
            Err(e) => {
                self.state = SessionState::Closed;
                tracing::warn!(session = %self.config, error = %e, "SSH session failed to open");
                Err(e)
            }
        }
    }

    /// Disconnect if a session is live. Never fails and is safe to repeat.
    pub async fn close(&mut self) {
        let state = std::mem::replace(&mut self.state, SessionState::Closed);
        if let SessionState::Open(mut session) = state {
            if let Err(e) = session.disconnect().await {
                tracing::debug!(error = %e, "Disconnect failed, dropping session");
            }
            tracing::info!(session = %self.config, "SSH session closed");
        }
    }

    /// Upload `local_path` to `remote_path`, overwriting it.
    ///
    /// Not atomic: if the transfer fails partway the remote file may be left
    /// truncated.
    pub async fn send(&mut self, local_path: &Path, remote_path: &str) -> SshResult<()> {
        self.live_session()?;

        let file = File::open(local_path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SshError::FileNotFound(local_path.to_path_buf())
            } else {
                SshError::transfer(remote_path, format!("failed to open {}: {e}", local_path.display()))
            }
        })?;

        let size = self.send_reader(file, remote_path).await?;

        tracing::debug!(
            local = %local_path.display(),
            remote = %remote_path,
            size,
            "File uploaded"
        );
        Ok(())
    }

    /// Upload everything `reader` yields to `remote_path`. Returns the number
    /// of bytes written.
    pub async fn send_reader<R>(&mut self, reader: R, remote_path: &str) -> SshResult<u64>
    where
        R: AsyncRead + Unpin,
    {
        let session = self.live_session()?;
        let result = upload(session, reader, remote_path)
            .await
            .map_err(|e| e.into_transfer(remote_path));
        self.settle(result)
    }

    /// Download `remote_path` into `local_path`, overwriting it.
    ///
    /// The local file is only created once the remote file has been opened.
    /// A failure partway through leaves a truncated local file.
    pub async fn get(&mut self, remote_path: &str, local_path: &Path) -> SshResult<()> {
        let session = self.live_session()?;
        let result = download_to_path(session, remote_path, local_path)
            .await
            .map_err(|e| e.into_transfer(remote_path));
        let size = self.settle(result)?;

        tracing::debug!(
            remote = %remote_path,
            local = %local_path.display(),
            size,
            "File downloaded"
        );
        Ok(())
    }

    /// Download `remote_path` into `writer`. Returns the number of bytes
    /// copied.
    pub async fn get_writer<W>(&mut self, remote_path: &str, writer: W) -> SshResult<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let session = self.live_session()?;
        let result = download(session, remote_path, writer)
            .await
            .map_err(|e| e.into_transfer(remote_path));
        self.settle(result)
    }

    /// Run `command` and return its stdout with trailing line breaks removed.
    ///
    /// Remote stderr is copied to this process's stderr as it arrives and is
    /// not kept in memory. The exit status is ignored; see
    /// [`exec_checked`](Self::exec_checked).
    pub async fn exec(&mut self, command: &str) -> SshResult<String> {
        let output = self.run(command, true).await?;
        Ok(output.stdout.trim_end_matches(['\n', '\r']).to_string())
    }

    /// Run `command` and capture stdout, stderr and the exit status.
    ///
    /// A non-zero exit status is reported, not treated as an error.
    pub async fn exec_output(&mut self, command: &str) -> SshResult<CommandOutput> {
        self.run(command, false).await
    }

    /// Like [`exec_output`](Self::exec_output), but fails unless the command
    /// exited with status 0.
    ///
    /// A non-zero status is [`SshError::NonZeroExit`], a terminating signal
    /// is [`SshError::KilledBySignal`].
    pub async fn exec_checked(&mut self, command: &str) -> SshResult<CommandOutput> {
        let output = self.exec_output(command).await?;
        check_exit(output)
    }

    /// Read text lines from a caller-managed channel until it ends.
    ///
    /// See [`channel::drain_channel_output`].
    pub async fn drain_channel_output<R>(&self, channel: &mut R) -> SshResult<String>
    where
        R: AsyncRead + Unpin,
    {
        channel::drain_channel_output(channel).await
    }

    async fn run(&mut self, command: &str, forward_stderr: bool) -> SshResult<CommandOutput> {
        let session = self.live_session()?;

        tracing::debug!(command = %command, "Executing remote command");

        let result = run_command(session, command, forward_stderr)
            .await
            .map_err(SshError::into_exec);
        let output = self.settle(result)?;

        tracing::debug!(
            exit_code = ?output.exit_code,
            stdout_len = output.stdout.len(),
            stderr_len = output.stderr.len(),
            "Command completed"
        );
        Ok(output)
    }

    fn live_session(&mut self) -> SshResult<&mut T::Session> {
        match &mut self.state {
            SessionState::Open(session) => Ok(session),
            _ => Err(SshError::NotConnected),
        }
    }

    /// Drop to `Closed` when a failed operation took the connection down.
    fn settle<R>(&mut self, result: SshResult<R>) -> SshResult<R> {
        if result.is_err() {
            let lost = matches!(&self.state, SessionState::Open(session) if session.is_closed());
            if lost {
                tracing::warn!(session = %self.config, "SSH session lost");
                self.state = SessionState::Closed;
            }
        }
        result
    }
}

impl<T: SessionTransport> fmt::Debug for RemoteSession<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteSession")
            .field("config", &self.config)
            .field("options", &self.options)
            .field("state", &self.state())
            .finish()
    }
}

impl<T: SessionTransport> Drop for RemoteSession<T> {
    fn drop(&mut self) {
        let state = std::mem::replace(&mut self.state, SessionState::Closed);
        let SessionState::Open(mut session) = state else {
            return;
        };
        // Without a runtime the session is simply dropped, which tears the
        // connection down.
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                if let Err(e) = session.disconnect().await {
                    tracing::debug!(error = %e, "Disconnect on drop failed");
                }
            });
        }
    }
}

fn log_close_failure(kind: &str, result: SshResult<()>) {
    if let Err(e) = result {
        tracing::debug!(channel = kind, error = %e, "Failed to close sub-channel");
    }
}

async fn upload<S, R>(session: &mut S, mut reader: R, remote_path: &str) -> SshResult<u64>
where
    S: TransportSession,
    R: AsyncRead + Unpin,
{
    let mut sftp = session.open_sftp().await?;
    let result = async {
        let mut remote_file = sftp.create(remote_path).await?;
        let mut buffer = vec![0u8; CHUNK_SIZE];
        let mut transferred = 0u64;

        loop {
            let n = reader.read(&mut buffer).await.map_err(|e| {
                SshError::transfer(remote_path, format!("failed to read local data: {e}"))
            })?;
            if n == 0 {
                break;
            }

            remote_file.write_all(&buffer[..n]).await.map_err(|e| {
                SshError::transfer(remote_path, format!("failed to write to remote file: {e}"))
            })?;
            transferred += n as u64;
        }

        remote_file.shutdown().await.map_err(|e| {
            SshError::transfer(remote_path, format!("failed to close remote file: {e}"))
        })?;

        Ok::<_, SshError>(transferred)
    }
    .await;
    log_close_failure("sftp", sftp.close().await);
    result
}

async fn download<S, W>(session: &mut S, remote_path: &str, mut writer: W) -> SshResult<u64>
where
    S: TransportSession,
    W: AsyncWrite + Unpin,
{
    let mut sftp = session.open_sftp().await?;
    let result = async {
        let mut remote_file = sftp.open(remote_path).await?;
        copy_from_remote(&mut remote_file, &mut writer, remote_path).await
    }
    .await;
    log_close_failure("sftp", sftp.close().await);
    result
}

async fn download_to_path<S>(session: &mut S, remote_path: &str, local_path: &Path) -> SshResult<u64>
where
    S: TransportSession,
{
    let mut sftp = session.open_sftp().await?;
    let result = async {
        let mut remote_file = sftp.open(remote_path).await?;
        let mut local_file = File::create(local_path).await.map_err(|e| {
            SshError::transfer(remote_path, format!("failed to create {}: {e}", local_path.display()))
        })?;
        copy_from_remote(&mut remote_file, &mut local_file, remote_path).await
    }
    .await;
    log_close_failure("sftp", sftp.close().await);
    result
}

async fn copy_from_remote<R, W>(remote_file: &mut R, writer: &mut W, remote_path: &str) -> SshResult<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut transferred = 0u64;

    loop {
        let n = remote_file.read(&mut buffer).await.map_err(|e| {
            SshError::transfer(remote_path, format!("failed to read remote file: {e}"))
        })?;
        if n == 0 {
            break;
        }

        writer.write_all(&buffer[..n]).await.map_err(|e| {
            SshError::transfer(remote_path, format!("failed to write local data: {e}"))
        })?;
        transferred += n as u64;
    }

    writer.flush().await.map_err(|e| {
        SshError::transfer(remote_path, format!("failed to write local data: {e}"))
    })?;

    Ok(transferred)
}

async fn run_command<S>(session: &mut S, command: &str, forward_stderr: bool) -> SshResult<CommandOutput>
where
    S: TransportSession,
{
    let mut channel = session.open_exec(command).await?;
    let result = collect_output(&mut channel, forward_stderr).await;
    log_close_failure("exec", channel.close().await);
    result
}

async fn collect_output<C: ExecChannel>(channel: &mut C, forward_stderr: bool) -> SshResult<CommandOutput> {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let mut exit_code = None;
    let mut exit_signal = None;
    let mut local_stderr = forward_stderr.then(tokio::io::stderr);

    // Read until the channel closes; the exit status can arrive after EOF.
    while let Some(event) = channel.next_event().await? {
        match event {
            ExecEvent::Stdout(data) => stdout.extend_from_slice(&data),
            ExecEvent::Stderr(data) => match local_stderr.as_mut() {
                Some(sink) => {
                    if let Err(e) = sink.write_all(&data).await {
                        tracing::debug!(error = %e, "Failed to forward remote stderr");
                    }
                }
                None => stderr.extend_from_slice(&data),
            },
            ExecEvent::ExitStatus(code) => exit_code = Some(code),
            ExecEvent::ExitSignal(signal) => exit_signal = Some(signal),
        }
    }

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        exit_code,
        exit_signal,
    })
}

fn check_exit(output: CommandOutput) -> SshResult<CommandOutput> {
    match (output.exit_code, &output.exit_signal) {
        (_, Some(signal)) => Err(SshError::KilledBySignal {
            signal: signal.clone(),
            stderr: output.stderr,
        }),
        (Some(0), None) => Ok(output),
        (Some(code), None) => Err(SshError::NonZeroExit {
            code,
            stderr: output.stderr,
        }),
        (None, None) => Err(SshError::Exec(
            "command ended without reporting an exit status".to_string(),
        )),
    }
}
