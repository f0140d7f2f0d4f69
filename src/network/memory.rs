//! In-process transport: a signaling broker and reliable ordered channels.
//!
//! Every peer registered on a [`MemoryHub`] gets its own event channel.
//! Identities are UUIDs unless a specific one is requested, the way a hosted
//! signaling service hands them out. Delivery is immediate and ordered.

use super::errors::TransportErrorKind;
use super::transport::{ConnectionId, PeerIdentity, Transport, TransportEvent};
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

fn identity_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z0-9]+(?:[ _-][A-Za-z0-9]+)*$").ok())
        .as_ref()
}

/// Whether `id` is an acceptable identity on the hub
pub fn is_valid_identity(id: &str) -> bool {
    identity_pattern().is_some_and(|pattern| pattern.is_match(id))
}

#[derive(Default)]
struct HubInner {
    peers: HashMap<PeerIdentity, mpsc::UnboundedSender<TransportEvent>>,
    connections: HashMap<ConnectionId, (PeerIdentity, PeerIdentity)>,
    next_conn: ConnectionId,
}

impl HubInner {
    fn deliver(&self, to: &PeerIdentity, event: TransportEvent) {
        if let Some(tx) = self.peers.get(to) {
            if tx.send(event).is_err() {
                debug!(peer = %to, "Peer event channel closed");
            }
        }
    }

    /// Remove `conn` and tell both ends
    fn tear_down(&mut self, conn: ConnectionId) {
        if let Some((a, b)) = self.connections.remove(&conn) {
            self.deliver(&a, TransportEvent::ConnectionClosed { conn });
            self.deliver(&b, TransportEvent::ConnectionClosed { conn });
        }
    }
}

/// Shared broker; clone freely
#[derive(Clone, Default)]
pub struct MemoryHub {
    inner: Arc<Mutex<HubInner>>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HubInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a peer, optionally asking for a specific identity
    ///
    /// The outcome arrives on the returned channel: `Open` on success, or a
    /// fatal `InvalidId` / `UnavailableId` error.
    pub fn register(
        &self,
        requested: Option<&str>,
    ) -> (MemoryTransport, mpsc::UnboundedReceiver<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.lock();

        let id = match requested {
            Some(id) if !is_valid_identity(id) => {
                warn!(id, "Rejecting invalid identity");
                let _ = tx.send(TransportEvent::error(
                    TransportErrorKind::InvalidId,
                    format!("identity '{}' is not valid", id),
                ));
                None
            }
            Some(id) if inner.peers.contains_key(&PeerIdentity::from(id)) => {
                warn!(id, "Identity already registered");
                let _ = tx.send(TransportEvent::error(
                    TransportErrorKind::UnavailableId,
                    format!("identity '{}' is taken", id),
                ));
                None
            }
            Some(id) => Some(PeerIdentity::from(id)),
            None => Some(PeerIdentity::new(uuid::Uuid::new_v4().to_string())),
        };

        if let Some(id) = &id {
            info!(%id, "Peer registered on hub");
            inner.peers.insert(id.clone(), tx.clone());
            let _ = tx.send(TransportEvent::Open { id: id.clone() });
        }
        drop(inner);

        let transport = MemoryTransport {
            hub: self.clone(),
            id,
            events: tx,
        };
        (transport, rx)
    }

    /// Whether a peer with this identity is currently registered
    pub fn is_registered(&self, id: &PeerIdentity) -> bool {
        self.lock().peers.contains_key(id)
    }

    /// Drop a live connection as if the link failed
    pub fn sever(&self, conn: ConnectionId) {
        info!(conn, "Severing connection");
        self.lock().tear_down(conn);
    }

    /// Connections currently open on the hub
    pub fn connection_count(&self) -> usize {
        self.lock().connections.len()
    }

    /// Ids of the open connections, lowest first
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> = self.lock().connections.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Report a transport error to one peer
    pub fn inject_error(&self, to: &PeerIdentity, kind: TransportErrorKind, message: &str) {
        self.lock().deliver(to, TransportEvent::error(kind, message));
    }
}

/// One peer's handle onto a [`MemoryHub`]
pub struct MemoryTransport {
    hub: MemoryHub,
    id: Option<PeerIdentity>,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl Transport for MemoryTransport {
    fn id(&self) -> Option<&PeerIdentity> {
        self.id.as_ref()
    }

    fn connect(&mut self, target: &PeerIdentity) -> ConnectionId {
        let mut inner = self.hub.lock();
        inner.next_conn += 1;
        let conn = inner.next_conn;

        let Some(me) = self.id.clone().filter(|id| inner.peers.contains_key(id)) else {
            let _ = self.events.send(TransportEvent::error(
                TransportErrorKind::Disconnected,
                "not registered on the hub",
            ));
            return conn;
        };

        if !inner.peers.contains_key(target) {
            debug!(%target, "Connect target is not registered");
            inner.deliver(
                &me,
                TransportEvent::error(
                    TransportErrorKind::PeerUnavailable,
                    format!("could not connect to peer {}", target),
                ),
            );
            return conn;
        }

        inner.connections.insert(conn, (me.clone(), target.clone()));
        inner.deliver(
            target,
            TransportEvent::IncomingConnection {
                conn,
                remote: me.clone(),
            },
        );
        inner.deliver(
            target,
            TransportEvent::ConnectionOpen {
                conn,
                remote: me.clone(),
            },
        );
        inner.deliver(
            &me,
            TransportEvent::ConnectionOpen {
                conn,
                remote: target.clone(),
            },
        );
        conn
    }

    fn send(&mut self, conn: ConnectionId, payload: String) {
        let inner = self.hub.lock();
        let Some((a, b)) = inner.connections.get(&conn) else {
            debug!(conn, "Send on unknown connection");
            return;
        };
        let to = match &self.id {
            Some(me) if me == a => b,
            Some(me) if me == b => a,
            _ => return,
        };
        inner.deliver(to, TransportEvent::ConnectionData { conn, payload });
    }

    fn close(&mut self, conn: ConnectionId) {
        self.hub.lock().tear_down(conn);
    }

    fn destroy(&mut self) {
        let Some(me) = self.id.take() else {
            return;
        };
        let mut inner = self.hub.lock();
        // Unregister first so our own channel hears nothing further
        inner.peers.remove(&me);
        let owned: Vec<ConnectionId> = inner
            .connections
            .iter()
            .filter(|(_, (a, b))| *a == me || *b == me)
            .map(|(conn, _)| *conn)
            .collect();
        for conn in owned {
            inner.tear_down(conn);
        }
        info!(id = %me, "Peer left hub");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(rx: &mut mpsc::UnboundedReceiver<TransportEvent>) -> Vec<TransportEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    #[test]
    fn test_identity_validation() {
        assert!(is_valid_identity("abc-123"));
        assert!(is_valid_identity("room 7"));
        assert!(!is_valid_identity(""));
        assert!(!is_valid_identity("bad/id"));
        assert!(!is_valid_identity("-leading"));
    }

    #[test]
    fn test_register_assigns_uuid() {
        let hub = MemoryHub::new();
        let (transport, mut rx) = hub.register(None);
        let id = transport.id().unwrap().clone();
        assert!(uuid::Uuid::parse_str(id.as_str()).is_ok());
        assert_eq!(drain(&mut rx), vec![TransportEvent::Open { id }]);
    }

    #[test]
    fn test_register_rejects_taken_and_invalid_ids() {
        let hub = MemoryHub::new();
        let (_first, _) = hub.register(Some("room"));
        let (taken, mut rx) = hub.register(Some("room"));
        assert!(taken.id().is_none());
        assert!(matches!(
            drain(&mut rx)[..],
            [TransportEvent::Error { kind: TransportErrorKind::UnavailableId, .. }]
        ));

        let (_, mut rx) = hub.register(Some("no/slashes"));
        assert!(matches!(
            drain(&mut rx)[..],
            [TransportEvent::Error { kind: TransportErrorKind::InvalidId, .. }]
        ));
    }

    #[test]
    fn test_connect_send_close() {
        let hub = MemoryHub::new();
        let (mut host, mut host_rx) = hub.register(Some("host"));
        let (mut guest, mut guest_rx) = hub.register(Some("guest"));
        drain(&mut host_rx);
        drain(&mut guest_rx);

        let conn = guest.connect(&"host".into());
        assert_eq!(
            drain(&mut host_rx),
            vec![
                TransportEvent::IncomingConnection { conn, remote: "guest".into() },
                TransportEvent::ConnectionOpen { conn, remote: "guest".into() },
            ]
        );
        assert_eq!(
            drain(&mut guest_rx),
            vec![TransportEvent::ConnectionOpen { conn, remote: "host".into() }]
        );

        guest.send(conn, "one".to_string());
        guest.send(conn, "two".to_string());
        host.send(conn, "back".to_string());
        assert_eq!(
            drain(&mut host_rx),
            vec![
                TransportEvent::ConnectionData { conn, payload: "one".to_string() },
                TransportEvent::ConnectionData { conn, payload: "two".to_string() },
            ]
        );
        assert_eq!(
            drain(&mut guest_rx),
            vec![TransportEvent::ConnectionData { conn, payload: "back".to_string() }]
        );

        host.close(conn);
        assert_eq!(drain(&mut host_rx), vec![TransportEvent::ConnectionClosed { conn }]);
        assert_eq!(drain(&mut guest_rx), vec![TransportEvent::ConnectionClosed { conn }]);
        assert_eq!(hub.connection_count(), 0);
    }

    #[test]
    fn test_connect_to_missing_peer() {
        let hub = MemoryHub::new();
        let (mut guest, mut rx) = hub.register(None);
        drain(&mut rx);
        guest.connect(&"ghost".into());
        assert!(matches!(
            drain(&mut rx)[..],
            [TransportEvent::Error { kind: TransportErrorKind::PeerUnavailable, .. }]
        ));
    }

    #[test]
    fn test_destroy_frees_identity_and_closes_connections() {
        let hub = MemoryHub::new();
        let (mut host, _host_rx) = hub.register(Some("host"));
        let (mut guest, mut guest_rx) = hub.register(Some("guest"));
        let conn = guest.connect(&"host".into());
        drain(&mut guest_rx);

        host.destroy();
        assert!(!hub.is_registered(&"host".into()));
        assert_eq!(drain(&mut guest_rx), vec![TransportEvent::ConnectionClosed { conn }]);

        let (again, _) = hub.register(Some("host"));
        assert_eq!(again.id(), Some(&PeerIdentity::from("host")));
    }
}
