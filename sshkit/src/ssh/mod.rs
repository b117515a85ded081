//! SSH session client
//!
//! Provides async SSH connectivity for:
//! - Password authentication with a configurable host key policy
//! - File upload/download via SFTP
//! - Remote command execution
//! - Reading output from caller-managed channels

mod channel;
mod client;
mod connection;
mod error;
mod host_key;
mod transport;

pub use channel::*;
pub use client::*;
pub use connection::*;
pub use error::*;
pub use host_key::*;
pub use transport::*;
