use super::errors::{ErrorRecord, TransportErrorKind};
use super::transport::{ConnectionId, PeerIdentity, Transport, TransportEvent};
use crate::messages::{Message, MessageCodec, MAX_PAYLOAD_SIZE};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

/// Delay between the transport opening and `Ready` being emitted
pub const DEFAULT_READY_SETTLE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub ready_settle: Duration,
    pub max_payload_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ready_settle: DEFAULT_READY_SETTLE,
            max_payload_size: MAX_PAYLOAD_SIZE,
        }
    }
}

/// Which side of the connection we are
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Accepted the inbound connection
    Host,
    /// Dialed out and joined
    Guest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Initializing,
    Ready,
    Connected(Role),
    Errored,
    Disposed,
}

/// Lifecycle notifications for the session owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Ready,
    /// Carries the room id: our own id as host, the host's id as guest
    GameJoined(PeerIdentity),
    /// The guest went away (host side)
    GameLeft,
    /// The host went away (guest side)
    HostRecoveryMode,
    FailedToJoin,
    NetworkStatusChanged,
    Error(ErrorRecord),
    Data(Message),
}

pub type ListenerId = u64;

#[derive(Debug)]
struct Slot {
    conn: ConnectionId,
    remote: PeerIdentity,
    role: Role,
    open: bool,
}

/// Owner of the single peer connection
///
/// A synchronous state machine: transport events and timer polls go in,
/// [`SessionEvent`]s come out to every subscriber in emission order.
pub struct PeerSession {
    transport: Box<dyn Transport>,
    codec: MessageCodec,
    config: SessionConfig,
    id: Option<PeerIdentity>,
    ready: bool,
    ready_at: Option<Instant>,
    connection: Option<Slot>,
    pending_join: Option<(ConnectionId, PeerIdentity)>,
    /// Latest error; a fatal one is never replaced
    error: Option<ErrorRecord>,
    listeners: Vec<(ListenerId, mpsc::UnboundedSender<SessionEvent>)>,
    next_listener: ListenerId,
    disposed: bool,
}

impl PeerSession {
    pub fn new(transport: Box<dyn Transport>, config: SessionConfig) -> Self {
        let codec = MessageCodec::new(config.max_payload_size);
        Self {
            transport,
            codec,
            config,
            id: None,
            ready: false,
            ready_at: None,
            connection: None,
            pending_join: None,
            error: None,
            listeners: Vec::new(),
            next_listener: 0,
            disposed: false,
        }
    }

    /// Register a listener; events are delivered until it is removed or dropped
    pub fn subscribe(&mut self) -> (ListenerId, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_listener;
        self.next_listener += 1;
        self.listeners.push((id, tx));
        (id, rx)
    }

    pub fn unsubscribe(&mut self, id: ListenerId) {
        self.listeners.retain(|(listener, _)| *listener != id);
    }

    fn emit(&mut self, event: SessionEvent) {
        trace!(?event, listeners = self.listeners.len(), "Emitting session event");
        self.listeners.retain(|(_, tx)| tx.send(event.clone()).is_ok());
    }

    pub fn id(&self) -> Option<&PeerIdentity> {
        self.id.as_ref()
    }

    pub fn is_ready(&self) -> bool {
        self.ready && !self.disposed
    }

    /// An open connection exists
    pub fn game_joined(&self) -> bool {
        self.connection.as_ref().is_some_and(|slot| slot.open)
    }

    pub fn is_host(&self) -> bool {
        self.open_role() == Some(Role::Host)
    }

    pub fn is_guest(&self) -> bool {
        self.open_role() == Some(Role::Guest)
    }

    fn open_role(&self) -> Option<Role> {
        self.connection
            .as_ref()
            .filter(|slot| slot.open)
            .map(|slot| slot.role)
    }

    /// Identity of the connected peer
    pub fn remote(&self) -> Option<&PeerIdentity> {
        self.connection.as_ref().map(|slot| &slot.remote)
    }

    /// Most recently recorded error
    pub fn error(&self) -> Option<&ErrorRecord> {
        self.error.as_ref()
    }

    pub fn network_error(&self) -> bool {
        self.error()
            .is_some_and(|e| e.kind == TransportErrorKind::Network)
    }

    pub fn state(&self) -> SessionState {
        if self.disposed {
            SessionState::Disposed
        } else if self.error().is_some_and(|e| e.is_fatal) {
            SessionState::Errored
        } else if let Some(role) = self.open_role() {
            SessionState::Connected(role)
        } else if self.ready {
            SessionState::Ready
        } else {
            SessionState::Initializing
        }
    }

    /// Earliest instant at which `poll_timers` has work to do
    pub fn next_deadline(&self) -> Option<Instant> {
        self.ready_at
    }

    pub fn poll_timers(&mut self, now: Instant) {
        if self.disposed {
            return;
        }
        if let Some(at) = self.ready_at {
            if at <= now {
                self.ready_at = None;
                self.ready = true;
                info!("Session is ready");
                self.emit(SessionEvent::Ready);
            }
        }
    }

    /// Dial the host of room `target`
    ///
    /// Returns `None` when the session can no longer open connections.
    pub fn join(&mut self, target: &PeerIdentity) -> Option<ConnectionId> {
        if self.disposed {
            warn!(%target, "Ignoring join on a disposed session");
            return None;
        }
        if let Some((stale, _)) = self.pending_join.take() {
            debug!(conn = stale, "Abandoning previous join attempt");
            self.transport.close(stale);
        }
        let conn = self.transport.connect(target);
        info!(%target, conn, "Joining room");
        self.pending_join = Some((conn, target.clone()));
        Some(conn)
    }

    /// Send a message to the connected peer; does nothing without one
    pub fn send(&mut self, message: &Message) {
        let Some(conn) = self.connection.as_ref().filter(|s| s.open).map(|s| s.conn) else {
            debug!(message_type = message.message_type(), "No open connection, dropping message");
            return;
        };
        match self.codec.encode(message) {
            Ok(payload) => {
                debug!(message_type = message.message_type(), conn, "Sending message");
                self.transport.send(conn, payload);
            }
            Err(e) => error!(error = %e, "Failed to encode outgoing message"),
        }
    }

    pub fn handle_transport_event(&mut self, event: TransportEvent, now: Instant) {
        if self.disposed {
            trace!(?event, "Session disposed, ignoring transport event");
            return;
        }

        match event {
            TransportEvent::Open { id } => {
                info!(%id, "Transport open");
                self.id = Some(id);
                self.ready_at = Some(now + self.config.ready_settle);
            }
            TransportEvent::IncomingConnection { conn, remote } => {
                info!(conn, %remote, "New inbound connection");
                if let Some(previous) = self.connection.take() {
                    info!(conn = previous.conn, "Closing previous connection");
                    self.transport.close(previous.conn);
                }
                self.connection = Some(Slot {
                    conn,
                    remote,
                    role: Role::Host,
                    open: false,
                });
            }
            TransportEvent::ConnectionOpen { conn, remote } => self.on_connection_open(conn, remote),
            TransportEvent::ConnectionClosed { conn } => self.on_connection_closed(conn),
            TransportEvent::ConnectionData { conn, payload } => {
                if self.connection.as_ref().map(|s| s.conn) != Some(conn) {
                    debug!(conn, "Data on an inactive connection, ignoring");
                    return;
                }
                match self.codec.decode(&payload) {
                    Ok(message) => {
                        debug!(message_type = message.message_type(), "Received message");
                        self.emit(SessionEvent::Data(message));
                    }
                    Err(e) => warn!(error = %e, "Dropping unrecognized message"),
                }
            }
            TransportEvent::ConnectionError { conn, description } => {
                warn!(conn, %description, "Connection error");
            }
            TransportEvent::Error { kind, message } => self.on_error(kind, message),
            TransportEvent::Disconnected => {
                info!("Disconnected from signaling");
            }
        }
    }

    fn on_connection_open(&mut self, conn: ConnectionId, remote: PeerIdentity) {
        if let Some(slot) = self.connection.as_mut().filter(|s| s.conn == conn) {
            slot.open = true;
            if slot.role == Role::Host {
                info!(conn, remote = %slot.remote, "Guest connected");
                if let Some(id) = self.id.clone() {
                    self.emit(SessionEvent::GameJoined(id));
                }
            }
            return;
        }

        if self.pending_join.as_ref().is_some_and(|(pending, _)| *pending == conn) {
            self.pending_join = None;
            if let Some(previous) = self.connection.take() {
                self.transport.close(previous.conn);
            }
            info!(conn, %remote, "Joined room");
            self.connection = Some(Slot {
                conn,
                remote: remote.clone(),
                role: Role::Guest,
                open: true,
            });
            self.emit(SessionEvent::GameJoined(remote));
            return;
        }

        debug!(conn, "Open for an unknown connection, ignoring");
    }

    fn on_connection_closed(&mut self, conn: ConnectionId) {
        if self.connection.as_ref().is_some_and(|s| s.conn == conn) {
            if let Some(slot) = self.connection.take() {
                info!(conn, remote = %slot.remote, "Connection closed");
                match slot.role {
                    Role::Host => self.emit(SessionEvent::GameLeft),
                    Role::Guest => self.emit(SessionEvent::HostRecoveryMode),
                }
            }
            return;
        }

        if self.pending_join.as_ref().is_some_and(|(pending, _)| *pending == conn) {
            self.pending_join = None;
            info!(conn, "Join attempt closed before opening");
            self.emit(SessionEvent::FailedToJoin);
            return;
        }

        debug!(conn, "Close of a superseded connection, ignoring");
    }

    fn on_error(&mut self, kind: TransportErrorKind, message: String) {
        if self.error().is_some_and(|e| e.is_fatal) {
            debug!(%kind, "Already failed fatally, ignoring error");
            return;
        }

        let record = ErrorRecord::classify(kind, message);
        if record.is_fatal {
            error!(kind = %record.kind, cause = %record.cause, "{}", record.description);
        } else {
            warn!(kind = %record.kind, cause = %record.cause, "{}", record.description);
        }
        self.error = Some(record.clone());
        self.emit(SessionEvent::Error(record));

        match kind {
            TransportErrorKind::Network => self.emit(SessionEvent::NetworkStatusChanged),
            TransportErrorKind::PeerUnavailable => {
                if let Some((conn, _)) = self.pending_join.take() {
                    self.transport.close(conn);
                }
                self.emit(SessionEvent::FailedToJoin);
            }
            _ => {}
        }
    }

    /// Close the connection, destroy the transport and drop all listeners
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        info!("Disposing session");
        if let Some(slot) = self.connection.take() {
            self.transport.close(slot.conn);
        }
        if let Some((conn, _)) = self.pending_join.take() {
            self.transport.close(conn);
        }
        self.transport.destroy();
        self.listeners.clear();
        self.ready_at = None;
        self.disposed = true;
    }
}
