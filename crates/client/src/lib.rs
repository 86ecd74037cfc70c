//! IRC client runtime: connection supervision, the socket loop and the
//! session glue feeding the plug kernel.

pub mod connection;
pub mod error;
pub mod session;
pub mod supervisor;

pub use {
    connection::Client,
    error::ClientError,
    session::{Session, SessionConfig},
    supervisor::{Backoff, ConnectionState, Next, Supervisor},
};
