//! Connection configuration
//!
//! A connection is described by a flat host/port/user/password record. The
//! record is usually read from a JSON file, but the library never picks a
//! file on its own: callers pass the path (or the values) explicitly.

mod connection;
mod error;

pub use connection::*;
pub use error::*;
