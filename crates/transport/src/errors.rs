//! Error types for the transport bridge

use std::io;

use thiserror::Error;

use crate::endpoint::{AddressFamily, Endpoint};
use crate::registry::VirtualSocketId;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("failed to bind {family} socket on port {port}: {source}")]
    BindError {
        family: AddressFamily,
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("unknown virtual socket {0}")]
    UnknownSocket(VirtualSocketId),

    #[error("unsupported address family: {0}")]
    UnsupportedFamily(String),

    #[error("malformed packed endpoint: got {len} bytes, need {expected}")]
    MalformedEndpoint { len: usize, expected: usize },

    #[error("send on socket {socket} to {endpoint} failed: {source}")]
    SendError {
        socket: VirtualSocketId,
        endpoint: Endpoint,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, TransportError>;
