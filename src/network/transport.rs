use super::errors::TransportErrorKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of one connection, unique within a transport
pub type ConnectionId = u64;

/// Opaque identity of a peer on the transport
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerIdentity(String);

impl PeerIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PeerIdentity {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for PeerIdentity {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Everything a transport reports back to its owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Registered with identity `id`, ready to accept and dial
    Open { id: PeerIdentity },
    /// A remote peer dialed us
    IncomingConnection {
        conn: ConnectionId,
        remote: PeerIdentity,
    },
    /// A connection (inbound or outbound) can carry data
    ConnectionOpen {
        conn: ConnectionId,
        remote: PeerIdentity,
    },
    ConnectionClosed { conn: ConnectionId },
    ConnectionData { conn: ConnectionId, payload: String },
    ConnectionError {
        conn: ConnectionId,
        description: String,
    },
    /// Transport level failure
    Error {
        kind: TransportErrorKind,
        message: String,
    },
    /// Lost the signaling side; existing connections may survive
    Disconnected,
}

impl TransportEvent {
    pub fn error(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        TransportEvent::Error {
            kind,
            message: message.into(),
        }
    }
}

/// Reliable ordered message channel between peers
///
/// Operations never block; outcomes arrive later as [`TransportEvent`]s on
/// the channel the transport was created with.
pub trait Transport: Send {
    /// Our identity once registered
    fn id(&self) -> Option<&PeerIdentity>;

    /// Start dialing `target`. The returned id names the half-open connection.
    fn connect(&mut self, target: &PeerIdentity) -> ConnectionId;

    /// Queue `payload` on `conn`. Unknown connections are ignored.
    fn send(&mut self, conn: ConnectionId, payload: String);

    /// Close `conn`. Both ends eventually see `ConnectionClosed`.
    fn close(&mut self, conn: ConnectionId);

    /// Tear everything down and give up our identity
    fn destroy(&mut self);
}
