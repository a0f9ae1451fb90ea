use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::io;
use std::net::{Shutdown, SocketAddr, TcpStream};
use uuid::Uuid;

/// Information about a connected client
#[derive(Debug)]
pub struct ClientInfo {
    pub id: Uuid,
    pub peer: SocketAddr,
    pub connected_at: DateTime<Utc>,
    /// Second handle to the socket so other workers can close it
    stream: TcpStream,
}

/// Connected clients, keyed by connection id
///
/// Workers register the connection they claim and unregister it when the
/// session ends. Other workers use the registry to list or disconnect peers.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: DashMap<Uuid, ClientInfo>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection; the registry keeps a clone of the socket handle
    pub fn register(&self, id: Uuid, stream: &TcpStream, peer: SocketAddr) -> io::Result<()> {
        let info = ClientInfo {
            id,
            peer,
            connected_at: Utc::now(),
            stream: stream.try_clone()?,
        };
        self.clients.insert(id, info);
        tracing::info!("Registered client {} from {}", id, peer);
        Ok(())
    }

    /// Unregister a connection
    pub fn unregister(&self, id: &Uuid) {
        if self.clients.remove(id).is_some() {
            tracing::info!("Unregistered client: {}", id);
        }
    }

    /// Peer addresses of the connected clients, oldest connection first
    pub fn peers(&self) -> Vec<SocketAddr> {
        let mut clients: Vec<_> = self
            .clients
            .iter()
            .map(|entry| (entry.connected_at, entry.peer))
            .collect();
        clients.sort();
        clients.into_iter().map(|(_, peer)| peer).collect()
    }

    /// Disconnect every client whose peer address is `peer`
    ///
    /// Returns whether any connection matched. The owning worker notices the
    /// closed socket on its next read and cleans up.
    pub fn kill(&self, peer: SocketAddr) -> bool {
        let mut killed = false;
        for entry in self.clients.iter().filter(|entry| entry.peer == peer) {
            if let Err(e) = entry.stream.shutdown(Shutdown::Both) {
                tracing::warn!("Failed to shut down client {}: {}", entry.id, e);
            }
            tracing::info!("Killed client {} ({})", entry.id, peer);
            killed = true;
        }
        killed
    }

    /// Stop reading from every connected client
    ///
    /// Pending writes still go out, so a command already being handled gets
    /// its response.
    pub fn shutdown_all(&self) {
        for entry in self.clients.iter() {
            let _ = entry.stream.shutdown(Shutdown::Read);
        }
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
