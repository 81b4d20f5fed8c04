//! Socket-factory facade for the messaging core.
//!
//! The core asks for sockets by numeric family tag and port, sends payloads
//! tagged with a virtual socket id and a packed endpoint, and receives packets
//! from the channel returned by [`TransportBridge::new`].

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::TransportConfig;
use crate::dispatcher::{DispatchStats, PacketDispatcher, PacketEnvelope};
use crate::endpoint::AddressFamily;
use crate::errors::Result;
use crate::registry::{SocketRegistry, VirtualSocketId};

pub struct TransportBridge {
    registry: Arc<SocketRegistry>,
    dispatcher: Arc<PacketDispatcher>,
    pump: JoinHandle<()>,
}

impl TransportBridge {
    /// Build the bridge and start its inbound pump. Must run inside a Tokio runtime.
    pub fn new(config: TransportConfig) -> (Self, mpsc::UnboundedReceiver<PacketEnvelope>) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let ipv4_form = config.ipv4_form;
        let registry = Arc::new(SocketRegistry::new(config, inbound_tx));
        let (dispatcher, packets) = PacketDispatcher::new(registry.clone(), ipv4_form);
        let dispatcher = Arc::new(dispatcher);
        let pump = tokio::spawn(dispatcher.clone().run(inbound_rx));

        let bridge = Self {
            registry,
            dispatcher,
            pump,
        };
        (bridge, packets)
    }

    /// Core entry point: create a socket from the core's raw family tag.
    pub async fn create_socket(&self, family_tag: u8, port: u16) -> Result<VirtualSocketId> {
        let family = AddressFamily::from_raw(family_tag)?;
        self.open_socket(family, port).await
    }

    pub async fn open_socket(&self, family: AddressFamily, port: u16) -> Result<VirtualSocketId> {
        self.registry.create_socket(family, port).await
    }

    /// Core entry point: send `payload` to the packed destination. Never fails
    /// from the caller's point of view.
    pub async fn send(&self, socket: VirtualSocketId, packed_endpoint: &[u8], payload: &[u8]) {
        self.dispatcher
            .on_outbound_packed(socket, packed_endpoint, payload.to_vec())
            .await
    }

    pub async fn send_envelope(&self, envelope: PacketEnvelope) {
        self.dispatcher.on_outbound_request(envelope).await
    }

    pub async fn close_socket(&self, socket: VirtualSocketId) {
        self.registry.release_socket(socket).await;
    }

    pub fn registry(&self) -> &Arc<SocketRegistry> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Arc<PacketDispatcher> {
        &self.dispatcher
    }

    pub fn stats(&self) -> DispatchStats {
        self.dispatcher.stats()
    }

    /// Release every socket and stop the inbound pump.
    pub async fn shutdown(&self) {
        self.registry.release_all().await;
        self.pump.abort();
        info!("transport bridge stopped");
    }
}

impl Drop for TransportBridge {
    fn drop(&mut self) {
        self.pump.abort();
    }
}
