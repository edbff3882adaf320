//! Connection registry — `identity -> writer` reverse map.
//!
//! Breaks the connection/router/store cycle: connections hold no router
//! pointer, and the router looks up writers by identity here instead. Each
//! connection owns a single writer task reading from the other end of this
//! channel, so every frame the router enqueues is delivered in the order
//! enqueued and never interleaved with another enqueuer.
//!
//! Registration is also how single-active-device kicks work: registering a
//! new connection for an identity already holding one atomically replaces
//! the map entry and hands the caller a direct handle to the *displaced*
//! connection's channel — sending `Close` on it is how a fresh
//! `register_proof` forces the stale socket closed after its `force_logout`
//! frame, without the old connection ever touching the registry again.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use whisper_common::wire::OutboundEnvelope;

/// Everything a connection's writer task accepts on its inbound channel.
#[derive(Debug)]
pub enum ConnectionCommand {
    Frame(OutboundEnvelope),
    Close { code: u16, reason: &'static str },
}

impl From<OutboundEnvelope> for ConnectionCommand {
    fn from(envelope: OutboundEnvelope) -> Self {
        ConnectionCommand::Frame(envelope)
    }
}

#[derive(Clone)]
struct Entry {
    connection_id: Uuid,
    sender: mpsc::UnboundedSender<ConnectionCommand>,
}

/// A handle to a connection that was just displaced from the registry by a
/// newer registration for the same identity.
pub struct DisplacedConnection {
    pub connection_id: Uuid,
    sender: mpsc::UnboundedSender<ConnectionCommand>,
}

impl DisplacedConnection {
    /// Send `force_logout` then close — the caller supplies the frame since
    /// only the auth flow knows the reason text the client should see.
    pub fn force_logout(&self, frame: OutboundEnvelope) {
        let _ = self.sender.send(ConnectionCommand::Frame(frame));
        let _ = self.sender.send(ConnectionCommand::Close {
            code: 1000,
            reason: "kicked by newer registration",
        });
    }
}

#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<HashMap<String, Entry>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection for an identity, replacing any previous
    /// registration (single-active-device means there's at most one).
    pub async fn register(
        &self,
        whisper_id: &str,
        connection_id: Uuid,
        sender: mpsc::UnboundedSender<ConnectionCommand>,
    ) -> Option<DisplacedConnection> {
        let mut map = self.inner.write().await;
        map.insert(whisper_id.to_string(), Entry { connection_id, sender }).map(|prev| {
            DisplacedConnection { connection_id: prev.connection_id, sender: prev.sender }
        })
    }

    /// Remove the registration, but only if it still belongs to
    /// `connection_id` — guards against a disconnecting old connection
    /// clobbering a newer one's registration during a race.
    pub async fn unregister(&self, whisper_id: &str, connection_id: Uuid) {
        let mut map = self.inner.write().await;
        if let Some(entry) = map.get(whisper_id) {
            if entry.connection_id == connection_id {
                map.remove(whisper_id);
            }
        }
    }

    pub async fn is_online(&self, whisper_id: &str) -> bool {
        self.inner.read().await.contains_key(whisper_id)
    }

    /// Enqueue a frame onto the identity's writer. Returns `false` if the
    /// identity has no live connection, or its writer has gone away (in
    /// which case the stale entry is dropped).
    pub async fn send(&self, whisper_id: &str, envelope: OutboundEnvelope) -> bool {
        let sender = {
            let map = self.inner.read().await;
            match map.get(whisper_id) {
                Some(entry) => entry.sender.clone(),
                None => return false,
            }
        };

        if sender.send(ConnectionCommand::Frame(envelope)).is_err() {
            self.inner.write().await.remove(whisper_id);
            return false;
        }
        true
    }

    /// Broadcast a drain shutdown to every registered connection — used by
    /// graceful-shutdown draining, not routine traffic.
    pub async fn close_all(&self, code: u16, reason: &'static str, frame: impl Fn() -> OutboundEnvelope) {
        let map = self.inner.read().await;
        for entry in map.values() {
            let _ = entry.sender.send(ConnectionCommand::Frame(frame()));
            let _ = entry.sender.send(ConnectionCommand::Close { code, reason });
        }
    }
}
