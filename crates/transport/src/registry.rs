//! Virtual socket registry
//!
//! Binds a real UDP socket for every virtual socket the core asks for and keeps
//! the id → socket table. Each bound socket gets a reader task that forwards
//! datagrams, in host arrival order, to the inbound channel handed to
//! [`SocketRegistry::new`].

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::TransportConfig;
use crate::endpoint::{AddressFamily, Endpoint};
use crate::errors::{Result, TransportError};

/// Handle the core uses to name a socket. Never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VirtualSocketId(pub u64);

impl fmt::Display for VirtualSocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vs{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtualSocketDescriptor {
    pub id: VirtualSocketId,
    pub family: AddressFamily,
    /// Port actually bound; differs from the request when an ephemeral port was asked for.
    pub local_port: u16,
}

/// Datagram read from a bound socket, before it is handed to the core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundDatagram {
    pub socket: VirtualSocketId,
    pub source: SocketAddr,
    pub payload: Vec<u8>,
}

/// OS socket bound to a virtual socket.
#[derive(Debug, Clone)]
pub struct BoundSocket {
    pub descriptor: VirtualSocketDescriptor,
    socket: Arc<UdpSocket>,
}

impl BoundSocket {
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Send `payload` to `endpoint`, adjusting the address form to the socket family.
    pub async fn send_to(&self, payload: &[u8], endpoint: Endpoint) -> io::Result<usize> {
        let target = endpoint.for_socket(self.descriptor.family).socket_addr();
        self.socket.send_to(payload, target).await
    }
}

struct SocketEntry {
    bound: BoundSocket,
    reader: JoinHandle<()>,
}

impl SocketEntry {
    /// Stop the reader and drop its socket reference along with ours.
    async fn close(self) {
        let SocketEntry { bound, reader } = self;
        reader.abort();
        // A cancelled task has dropped its future, and with it the reader's socket.
        let _ = reader.await;
        drop(bound);
    }
}

/// Table of virtual sockets.
///
/// Mutations (`create_socket`, `release_socket`) take the write lock; lookups share
/// the read lock.
pub struct SocketRegistry {
    config: TransportConfig,
    next_id: AtomicU64,
    sockets: RwLock<HashMap<VirtualSocketId, SocketEntry>>,
    inbound: mpsc::UnboundedSender<InboundDatagram>,
}

impl SocketRegistry {
    pub fn new(config: TransportConfig, inbound: mpsc::UnboundedSender<InboundDatagram>) -> Self {
        Self {
            config,
            next_id: AtomicU64::new(1),
            sockets: RwLock::new(HashMap::new()),
            inbound,
        }
    }

    /// Bind a UDP socket for `family` on `port` (0 for ephemeral) and register it.
    ///
    /// Must be called from within a Tokio runtime; the reader task is spawned on it.
    pub async fn create_socket(&self, family: AddressFamily, port: u16) -> Result<VirtualSocketId> {
        let bind_addr = match family {
            AddressFamily::Ipv4 => SocketAddr::new(self.config.bind_ipv4.into(), port),
            AddressFamily::Ipv6 => SocketAddr::new(self.config.bind_ipv6.into(), port),
        };

        let socket = UdpSocket::bind(bind_addr).await.map_err(|source| {
            warn!(%family, port, error = %source, "bind refused");
            TransportError::BindError {
                family,
                port,
                source,
            }
        })?;
        let local_port = socket.local_addr().map(|addr| addr.port()).unwrap_or(port);

        let id = VirtualSocketId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let socket = Arc::new(socket);
        let reader = tokio::spawn(read_loop(
            id,
            socket.clone(),
            self.inbound.clone(),
            self.config.recv_buffer_size.max(1),
        ));

        let descriptor = VirtualSocketDescriptor {
            id,
            family,
            local_port,
        };
        self.sockets.write().insert(
            id,
            SocketEntry {
                bound: BoundSocket { descriptor, socket },
                reader,
            },
        );

        info!(socket = %id, %family, port = local_port, "virtual socket bound");
        Ok(id)
    }

    /// Close the OS socket behind `id`. Unknown or already released ids are ignored.
    ///
    /// Returns once the reader task has stopped and the socket is closed, so the
    /// port can be bound again straight away.
    pub async fn release_socket(&self, id: VirtualSocketId) {
        let removed = self.sockets.write().remove(&id);
        match removed {
            Some(entry) => {
                entry.close().await;
                info!(socket = %id, "virtual socket released");
            }
            None => debug!(socket = %id, "release of unknown socket ignored"),
        }
    }

    /// Release every registered socket.
    pub async fn release_all(&self) {
        let drained: Vec<_> = self.sockets.write().drain().collect();
        for (id, entry) in drained {
            entry.close().await;
            debug!(socket = %id, "virtual socket released");
        }
    }

    pub fn lookup(&self, id: VirtualSocketId) -> Result<BoundSocket> {
        self.sockets
            .read()
            .get(&id)
            .map(|entry| entry.bound.clone())
            .ok_or(TransportError::UnknownSocket(id))
    }

    pub fn descriptor(&self, id: VirtualSocketId) -> Option<VirtualSocketDescriptor> {
        self.sockets.read().get(&id).map(|entry| entry.bound.descriptor)
    }

    pub fn local_addr(&self, id: VirtualSocketId) -> Result<SocketAddr> {
        let bound = self.lookup(id)?;
        bound.local_addr().map_err(|source| TransportError::BindError {
            family: bound.descriptor.family,
            port: bound.descriptor.local_port,
            source,
        })
    }

    pub fn ids(&self) -> Vec<VirtualSocketId> {
        let mut ids: Vec<_> = self.sockets.read().keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.sockets.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sockets.read().is_empty()
    }
}

impl Drop for SocketRegistry {
    fn drop(&mut self) {
        for entry in self.sockets.get_mut().values() {
            entry.reader.abort();
        }
    }
}

async fn read_loop(
    id: VirtualSocketId,
    socket: Arc<UdpSocket>,
    inbound: mpsc::UnboundedSender<InboundDatagram>,
    buffer_size: usize,
) {
    let mut buf = vec![0u8; buffer_size];
    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, source)) => {
                let datagram = InboundDatagram {
                    socket: id,
                    source,
                    payload: buf[..len].to_vec(),
                };
                if inbound.send(datagram).is_err() {
                    debug!(socket = %id, "inbound channel closed; stopping reader");
                    break;
                }
            }
            // ICMP unreachable from an earlier send; the socket is still usable.
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionRefused
                ) =>
            {
                debug!(socket = %id, error = %err, "peer unreachable");
            }
            Err(err) => {
                warn!(socket = %id, error = %err, "receive failed; stopping reader");
                break;
            }
        }
    }
}
