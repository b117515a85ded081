//! russh-backed transport

use async_trait::async_trait;
use russh::client::{self, Config, Handle, Handler, Msg};
use russh::keys::PublicKey;
use russh::{Channel, ChannelMsg, Disconnect, Sig};
use russh_sftp::client::SftpSession;
use russh_sftp::client::fs::File;
use std::future::Future;
use std::sync::Arc;

use super::error::{SshError, SshResult};
use super::host_key::HostKeyPolicy;
use super::transport::{
    ExecChannel, ExecEvent, SessionOptions, SessionTransport, SftpChannel, TransportSession,
};
use crate::config::ConnectionConfig;

/// Handler for SSH client events
pub struct SshHandler {
    host: String,
    port: u16,
    host_key_policy: HostKeyPolicy,
}

impl SshHandler {
    pub fn new(host: &str, port: u16, host_key_policy: HostKeyPolicy) -> Self {
        Self {
            host: host.to_string(),
            port,
            host_key_policy,
        }
    }
}

impl Handler for SshHandler {
    type Error = SshError;

    fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> impl Future<Output = std::result::Result<bool, Self::Error>> + Send {
        let verdict = self
            .host_key_policy
            .verify(&self.host, self.port, server_public_key);
        async move { verdict }
    }
}

/// Opens sessions with russh using password authentication.
#[derive(Debug, Clone, Copy, Default)]
pub struct RusshTransport;

#[async_trait]
impl SessionTransport for RusshTransport {
    type Session = RusshSession;

    async fn connect(
        &self,
        config: &ConnectionConfig,
        options: &SessionOptions,
    ) -> SshResult<RusshSession> {
        let ssh_config = Config {
            inactivity_timeout: options.inactivity_timeout,
            keepalive_interval: options.keepalive_interval,
            ..Default::default()
        };

        let handler = SshHandler::new(
            config.host(),
            config.port(),
            options.host_key_policy.clone(),
        );

        tracing::debug!(host = %config.host(), port = config.port(), "Connecting to SSH server");

        let establish = async {
            let mut handle = client::connect(
                Arc::new(ssh_config),
                (config.host().to_string(), config.port()),
                handler,
            )
            .await
            .map_err(|e| match e {
                SshError::HostKeyVerification { .. } => e,
                other => SshError::Connection(other.to_string()),
            })?;

            let auth = handle
                .authenticate_password(config.user(), config.password())
                .await
                .map_err(|e| SshError::Authentication(e.to_string()))?;

            if !auth.success() {
                return Err(SshError::Authentication(format!(
                    "password rejected for {}",
                    config.user_host()
                )));
            }

            Ok(handle)
        };

        let handle = match options.connect_timeout {
            Some(timeout) => tokio::time::timeout(timeout, establish)
                .await
                .map_err(|_| {
                    SshError::Timeout(format!(
                        "connecting to {} took longer than {}s",
                        config,
                        timeout.as_secs()
                    ))
                })??,
            None => establish.await?,
        };

        Ok(RusshSession { handle })
    }
}

/// An authenticated russh session.
pub struct RusshSession {
    handle: Handle<SshHandler>,
}

impl RusshSession {
    /// Open a plain session channel whose purpose the caller requests.
    pub async fn open_channel(&self) -> SshResult<Channel<Msg>> {
        Ok(self.handle.channel_open_session().await?)
    }
}

#[async_trait]
impl TransportSession for RusshSession {
    type Sftp = RusshSftp;
    type Exec = RusshExec;

    async fn open_sftp(&mut self) -> SshResult<RusshSftp> {
        let channel = self.open_channel().await?;

        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| SshError::Protocol(format!("Failed to request SFTP subsystem: {e}")))?;

        let session = SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| SshError::Protocol(format!("Failed to create SFTP session: {e}")))?;

        Ok(RusshSftp { session })
    }

    async fn open_exec(&mut self, command: &str) -> SshResult<RusshExec> {
        let channel = self.open_channel().await?;
        channel.exec(true, command).await?;
        Ok(RusshExec { channel })
    }

    async fn disconnect(&mut self) -> SshResult<()> {
        self.handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
            .map_err(|e| SshError::Connection(e.to_string()))
    }

    fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }
}

/// SFTP sub-channel
pub struct RusshSftp {
    session: SftpSession,
}

#[async_trait]
impl SftpChannel for RusshSftp {
    type Writer = File;
    type Reader = File;

    async fn create(&mut self, remote_path: &str) -> SshResult<File> {
        self.session
            .create(remote_path)
            .await
            .map_err(|e| SshError::transfer(remote_path, format!("failed to create remote file: {e}")))
    }

    async fn open(&mut self, remote_path: &str) -> SshResult<File> {
        self.session
            .open(remote_path)
            .await
            .map_err(|e| SshError::transfer(remote_path, format!("failed to open remote file: {e}")))
    }

    async fn close(&mut self) -> SshResult<()> {
        self.session
            .close()
            .await
            .map_err(|e| SshError::Protocol(format!("Failed to close SFTP session: {e}")))
    }
}

/// Exec sub-channel
pub struct RusshExec {
    channel: Channel<Msg>,
}

#[async_trait]
impl ExecChannel for RusshExec {
    async fn next_event(&mut self) -> SshResult<Option<ExecEvent>> {
        loop {
            match self.channel.wait().await {
                Some(ChannelMsg::Data { data }) => return Ok(Some(ExecEvent::Stdout(data.to_vec()))),
                Some(ChannelMsg::ExtendedData { data, ext }) => {
                    if ext == 1 {
                        return Ok(Some(ExecEvent::Stderr(data.to_vec())));
                    }
                }
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    return Ok(Some(ExecEvent::ExitStatus(exit_status)));
                }
                Some(ChannelMsg::ExitSignal { signal_name, .. }) => {
                    return Ok(Some(ExecEvent::ExitSignal(signal_label(&signal_name))));
                }
                // The exit status may still follow an EOF, so keep reading
                // until the server closes the channel.
                Some(_) => {}
                None => return Ok(None),
            }
        }
    }

    async fn close(&mut self) -> SshResult<()> {
        Ok(self.channel.close().await?)
    }
}

/// Signal name without the `SIG` prefix, as sent on the wire.
fn signal_label(signal: &Sig) -> String {
    match signal {
        Sig::Custom(name) => name.clone(),
        other => format!("{other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_labels_use_wire_names() {
        assert_eq!(signal_label(&Sig::KILL), "KILL");
        assert_eq!(signal_label(&Sig::TERM), "TERM");
        assert_eq!(signal_label(&Sig::Custom("WINCH".into())), "WINCH");
    }
}
