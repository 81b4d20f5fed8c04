//! toxbridge transport
//!
//! Lets a messaging core that performs its own handshakes, but owns no sockets,
//! run its datagram traffic over real OS sockets.
//!
//! ## Modules
//! - `endpoint`: 26-byte packed socket-address codec shared with the core
//! - `registry`: virtual socket id → bound UDP socket table
//! - `dispatcher`: inbound datagram relay and outbound send path
//! - `bridge`: socket-factory facade the core talks to
//! - `config`: bind addresses, buffer sizes, IPv4 presentation form
//! - `errors`: transport error taxonomy

pub mod bridge;
pub mod config;
pub mod dispatcher;
pub mod endpoint;
pub mod errors;
pub mod registry;

// ------------------------------------------------------------
// Re-exports for workspace-wide use
// ------------------------------------------------------------

pub use bridge::TransportBridge;
pub use config::TransportConfig;
pub use dispatcher::{DispatchStats, PacketDispatcher, PacketEnvelope};
pub use endpoint::{
    decode, decode_with_form, encode, AddressFamily, Endpoint, Ipv4Form, PackedEndpoint,
    PACKED_ENDPOINT_LEN,
};
pub use errors::{Result, TransportError};
pub use registry::{
    BoundSocket, InboundDatagram, SocketRegistry, VirtualSocketDescriptor, VirtualSocketId,
};
