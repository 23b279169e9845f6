//! In-memory registry of connected clients.
//!
//! One record per open WebSocket, inserted on connect and removed on
//! disconnect by the connection handler. Nothing else mutates it.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::{RwLock, watch};
use tracing::{info, warn};

use crate::executor::ExecutionHandle;

/// Bookkeeping for one connected client.
#[derive(Debug)]
pub struct Connection {
    /// Server-assigned identity, sent to the client as `clientId`.
    pub id: String,
    pub peer: SocketAddr,
    /// RFC 3339 connect time.
    pub connected_at: String,
    in_flight: watch::Sender<Option<ExecutionHandle>>,
}

impl Connection {
    pub fn new(id: String, peer: SocketAddr) -> Self {
        let (in_flight, _) = watch::channel(None);
        Self {
            id,
            peer,
            connected_at: remoteme_core::timestamp::now_rfc3339(),
            in_flight,
        }
    }

    /// Record the command now running for this connection.
    pub fn begin_execution(&self, handle: ExecutionHandle) {
        self.in_flight.send_replace(Some(handle));
    }

    /// Clear the in-flight slot once the executor has returned.
    pub fn finish_execution(&self) -> Option<ExecutionHandle> {
        self.in_flight.send_replace(None)
    }

    /// The command currently running, if any.
    pub fn in_flight(&self) -> Option<ExecutionHandle> {
        self.in_flight.borrow().clone()
    }
}

/// Thread-safe registry of active client connections.
#[derive(Clone)]
pub struct ConnectionRegistry {
    connections: Arc<RwLock<HashMap<String, Arc<Connection>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a new client and assign it a fresh identity.
    pub async fn register(&self, peer: SocketAddr) -> Arc<Connection> {
        let conn = Arc::new(Connection::new(uuid::Uuid::new_v4().to_string(), peer));
        self.connections
            .write()
            .await
            .insert(conn.id.clone(), Arc::clone(&conn));
        info!(client_id = %conn.id, peer = %peer, "Client connection registered");
        conn
    }

    /// Remove a client connection.
    pub async fn unregister(&self, client_id: &str) -> Option<Arc<Connection>> {
        let conn = self.connections.write().await.remove(client_id);
        if conn.is_some() {
            info!(client_id, "Client connection unregistered");
        } else {
            warn!(client_id, "Tried to unregister unknown connection");
        }
        conn
    }

    pub async fn is_connected(&self, client_id: &str) -> bool {
        self.connections.read().await.contains_key(client_id)
    }

    /// Count of active connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Drop every record (server shutdown).
    pub async fn clear(&self) -> usize {
        let mut connections = self.connections.write().await;
        let count = connections.len();
        connections.clear();
        drop(connections);
        if count > 0 {
            info!(count, "Cleared active connections");
        }
        count
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
