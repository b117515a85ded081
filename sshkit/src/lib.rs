//! Password-authenticated SSH sessions for file transfer and remote commands.
//!
//! ```no_run
//! # async fn demo() -> sshkit::ssh::SshResult<()> {
//! use sshkit::RemoteSession;
//! use std::path::Path;
//!
//! let mut session = RemoteSession::from_explicit_credentials("10.0.0.5", 22, "deploy", "pw")?;
//! session.open().await?;
//! session.send(Path::new("app.tar.gz"), "/tmp/app.tar.gz").await?;
//! let listing = session.exec("ls /tmp").await?;
//! println!("{listing}");
//! session.close().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod ssh;

pub use config::{ConfigRecord, ConnectionConfig};
pub use ssh::{
    CommandOutput, ErrorKind, HostKeyPolicy, RemoteSession, SessionOptions, SessionStatus,
    SshError, SshResult,
};
