//! Transport bridge configuration

use std::net::{Ipv4Addr, Ipv6Addr};

use serde::{Deserialize, Serialize};

use crate::endpoint::Ipv4Form;

/// Largest UDP payload; inbound reads use a buffer this big by default.
pub const DEFAULT_RECV_BUFFER_SIZE: usize = 65_535;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Presentation of IPv4 sources handed to the core.
    pub ipv4_form: Ipv4Form,
    pub recv_buffer_size: usize,
    /// Local address for IPv4 virtual sockets.
    pub bind_ipv4: Ipv4Addr,
    /// Local address for IPv6 virtual sockets.
    pub bind_ipv6: Ipv6Addr,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            ipv4_form: Ipv4Form::DottedQuad,
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
            bind_ipv4: Ipv4Addr::UNSPECIFIED,
            bind_ipv6: Ipv6Addr::UNSPECIFIED,
        }
    }
}

impl TransportConfig {
    /// Loopback-only binds, used by tests and local tooling.
    pub fn loopback() -> Self {
        Self {
            bind_ipv4: Ipv4Addr::LOCALHOST,
            bind_ipv6: Ipv6Addr::LOCALHOST,
            ..Self::default()
        }
    }
}
