//! Packet dispatch between the core and the bound sockets.
//!
//! Inbound datagrams are relayed to the core over an unbounded channel, one
//! [`PacketEnvelope`] per datagram, without looking at the payload. Outbound
//! requests are looked up in the [`SocketRegistry`] and sent; any failure is
//! logged and counted but never reported back to the core, whose own protocol
//! retransmits.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::endpoint::{decode, Endpoint, Ipv4Form};
use crate::errors::{Result, TransportError};
use crate::registry::{InboundDatagram, SocketRegistry, VirtualSocketId};

/// One datagram travelling between the core and the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketEnvelope {
    pub socket: VirtualSocketId,
    /// Source for inbound packets, destination for outbound ones.
    pub endpoint: Endpoint,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub inbound_packets: u64,
    pub outbound_packets: u64,
    pub outbound_dropped: u64,
}

#[derive(Debug, Default)]
struct DispatchCounters {
    inbound: AtomicU64,
    sent: AtomicU64,
    dropped: AtomicU64,
}

pub struct PacketDispatcher {
    registry: Arc<SocketRegistry>,
    core: mpsc::UnboundedSender<PacketEnvelope>,
    ipv4_form: Ipv4Form,
    counters: DispatchCounters,
}

impl PacketDispatcher {
    /// Create a dispatcher; the returned receiver is the core's inbound packet feed.
    pub fn new(
        registry: Arc<SocketRegistry>,
        ipv4_form: Ipv4Form,
    ) -> (Self, mpsc::UnboundedReceiver<PacketEnvelope>) {
        let (core, packets) = mpsc::unbounded_channel();
        let dispatcher = Self {
            registry,
            core,
            ipv4_form,
            counters: DispatchCounters::default(),
        };
        (dispatcher, packets)
    }

    /// Relay a datagram read from `socket` to the core unchanged.
    pub fn on_inbound_datagram(&self, socket: VirtualSocketId, payload: Vec<u8>, source: SocketAddr) {
        // Datagrams read before a release can still be queued behind it.
        if self.registry.descriptor(socket).is_none() {
            debug!(socket = %socket, %source, "dropping datagram for released socket");
            return;
        }

        let endpoint = Endpoint::from(source).with_ipv4_form(self.ipv4_form);
        self.counters.inbound.fetch_add(1, Ordering::Relaxed);
        trace!(socket = %socket, peer = %endpoint, bytes = payload.len(), "inbound datagram");

        let envelope = PacketEnvelope {
            socket,
            endpoint,
            payload,
        };
        if self.core.send(envelope).is_err() {
            debug!(socket = %socket, "core packet receiver dropped; discarding datagram");
        }
    }

    /// Send an outbound packet. Failures are logged and swallowed.
    pub async fn on_outbound_request(&self, envelope: PacketEnvelope) {
        if let Err(err) = self.try_send(&envelope).await {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            warn!(
                socket = %envelope.socket,
                peer = %envelope.endpoint,
                error = %err,
                "dropping outbound datagram"
            );
        }
    }

    /// Send an outbound packet whose destination is the core's 26-byte packed endpoint.
    pub async fn on_outbound_packed(&self, socket: VirtualSocketId, packed: &[u8], payload: Vec<u8>) {
        match decode(packed) {
            Ok(endpoint) => {
                self.on_outbound_request(PacketEnvelope {
                    socket,
                    endpoint,
                    payload,
                })
                .await
            }
            Err(err) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(socket = %socket, error = %err, "dropping outbound datagram");
            }
        }
    }

    /// Drain datagrams from the registry's readers until the channel closes.
    pub async fn run(self: Arc<Self>, mut inbound: mpsc::UnboundedReceiver<InboundDatagram>) {
        while let Some(datagram) = inbound.recv().await {
            self.on_inbound_datagram(datagram.socket, datagram.payload, datagram.source);
        }
        debug!("inbound pump stopped");
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            inbound_packets: self.counters.inbound.load(Ordering::Relaxed),
            outbound_packets: self.counters.sent.load(Ordering::Relaxed),
            outbound_dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }

    pub fn registry(&self) -> &Arc<SocketRegistry> {
        &self.registry
    }

    async fn try_send(&self, envelope: &PacketEnvelope) -> Result<()> {
        let bound = self.registry.lookup(envelope.socket)?;
        bound
            .send_to(&envelope.payload, envelope.endpoint)
            .await
            .map_err(|source| TransportError::SendError {
                socket: envelope.socket,
                endpoint: envelope.endpoint,
                source,
            })?;
        self.counters.sent.fetch_add(1, Ordering::Relaxed);
        trace!(
            socket = %envelope.socket,
            peer = %envelope.endpoint,
            bytes = envelope.payload.len(),
            "outbound datagram"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransportConfig;
    use crate::endpoint::{encode, AddressFamily};
    use std::net::Ipv4Addr;

    fn dispatcher(
        form: Ipv4Form,
    ) -> (PacketDispatcher, mpsc::UnboundedReceiver<PacketEnvelope>) {
        let (tx, _rx) = mpsc::unbounded_channel();
        let registry = Arc::new(SocketRegistry::new(TransportConfig::loopback(), tx));
        PacketDispatcher::new(registry, form)
    }

    async fn open(dispatcher: &PacketDispatcher) -> VirtualSocketId {
        dispatcher
            .registry()
            .create_socket(AddressFamily::Ipv4, 0)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn inbound_is_forwarded_unchanged() {
        let (dispatcher, mut packets) = dispatcher(Ipv4Form::DottedQuad);
        let socket = open(&dispatcher).await;
        let source: SocketAddr = "192.0.2.44:33445".parse().unwrap();

        dispatcher.on_inbound_datagram(socket, vec![0x02, 0xff, 0x00], source);

        let envelope = packets.recv().await.unwrap();
        assert_eq!(envelope.socket, socket);
        assert_eq!(envelope.endpoint, Endpoint::from(source));
        assert_eq!(envelope.payload, vec![0x02, 0xff, 0x00]);
        assert_eq!(dispatcher.stats().inbound_packets, 1);
    }

    #[tokio::test]
    async fn inbound_uses_configured_ipv4_form() {
        let (dispatcher, mut packets) = dispatcher(Ipv4Form::Mapped);
        let socket = open(&dispatcher).await;
        dispatcher.on_inbound_datagram(
            socket,
            b"x".to_vec(),
            SocketAddr::new(Ipv4Addr::new(10, 0, 0, 1).into(), 5),
        );
        let envelope = packets.recv().await.unwrap();
        assert_eq!(envelope.endpoint.address.to_string(), "::ffff:10.0.0.1");
    }

    #[tokio::test]
    async fn inbound_for_released_socket_is_dropped() {
        let (dispatcher, mut packets) = dispatcher(Ipv4Form::DottedQuad);
        let released = open(&dispatcher).await;
        let live = open(&dispatcher).await;
        dispatcher.registry().release_socket(released).await;

        let source: SocketAddr = "192.0.2.44:33445".parse().unwrap();
        dispatcher.on_inbound_datagram(released, b"stale".to_vec(), source);
        dispatcher.on_inbound_datagram(live, b"fresh".to_vec(), source);

        let envelope = packets.recv().await.unwrap();
        assert_eq!(envelope.socket, live);
        assert_eq!(envelope.payload, b"fresh");
        assert!(packets.try_recv().is_err());
        assert_eq!(dispatcher.stats().inbound_packets, 1);
    }

    #[tokio::test]
    async fn send_to_unknown_socket_is_dropped() {
        let (dispatcher, _packets) = dispatcher(Ipv4Form::DottedQuad);
        dispatcher
            .on_outbound_request(PacketEnvelope {
                socket: VirtualSocketId(42),
                endpoint: Endpoint::new(Ipv4Addr::LOCALHOST, 9),
                payload: b"lost".to_vec(),
            })
            .await;

        let stats = dispatcher.stats();
        assert_eq!(stats.outbound_dropped, 1);
        assert_eq!(stats.outbound_packets, 0);
    }

    #[tokio::test]
    async fn short_packed_endpoint_is_dropped() {
        let (dispatcher, _packets) = dispatcher(Ipv4Form::DottedQuad);
        let packed = encode(&Endpoint::new(Ipv4Addr::LOCALHOST, 9));
        dispatcher
            .on_outbound_packed(VirtualSocketId(1), &packed.as_bytes()[..20], b"x".to_vec())
            .await;
        assert_eq!(dispatcher.stats().outbound_dropped, 1);
    }
}
