use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Failure categories a transport can report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportErrorKind {
    BrowserIncompatible,
    Disconnected,
    InvalidId,
    InvalidKey,
    Network,
    PeerUnavailable,
    SslUnavailable,
    ServerError,
    SocketError,
    SocketClosed,
    UnavailableId,
    WebRtc,
}

impl TransportErrorKind {
    /// Fatal errors leave the session unusable until it is disposed
    pub fn is_fatal(&self) -> bool {
        match self {
            TransportErrorKind::BrowserIncompatible
            | TransportErrorKind::InvalidId
            | TransportErrorKind::InvalidKey
            | TransportErrorKind::SslUnavailable
            | TransportErrorKind::ServerError
            | TransportErrorKind::SocketError
            | TransportErrorKind::SocketClosed
            | TransportErrorKind::UnavailableId => true,
            TransportErrorKind::Disconnected
            | TransportErrorKind::Network
            | TransportErrorKind::PeerUnavailable
            | TransportErrorKind::WebRtc => false,
        }
    }

    /// Human readable explanation shown to the player
    pub fn description(&self) -> &'static str {
        match self {
            TransportErrorKind::BrowserIncompatible => {
                "This platform lacks transport features the game needs."
            }
            TransportErrorKind::Disconnected => {
                "This peer was already disconnected from the signaling service and cannot open new connections."
            }
            TransportErrorKind::InvalidId => "The requested peer identity contains illegal characters.",
            TransportErrorKind::InvalidKey => "The signaling service rejected the access key.",
            TransportErrorKind::Network => "The signaling service is unreachable or the link to it was lost.",
            TransportErrorKind::PeerUnavailable => "The peer you are trying to reach does not exist.",
            TransportErrorKind::SslUnavailable => "The signaling service does not offer a secure channel.",
            TransportErrorKind::ServerError => "The signaling service could not be reached.",
            TransportErrorKind::SocketError => "The underlying socket reported an error.",
            TransportErrorKind::SocketClosed => "The underlying socket closed unexpectedly.",
            TransportErrorKind::UnavailableId => "The requested peer identity is already taken.",
            TransportErrorKind::WebRtc => "The peer channel reported an error.",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransportErrorKind::BrowserIncompatible => "browser-incompatible",
            TransportErrorKind::Disconnected => "disconnected",
            TransportErrorKind::InvalidId => "invalid-id",
            TransportErrorKind::InvalidKey => "invalid-key",
            TransportErrorKind::Network => "network",
            TransportErrorKind::PeerUnavailable => "peer-unavailable",
            TransportErrorKind::SslUnavailable => "ssl-unavailable",
            TransportErrorKind::ServerError => "server-error",
            TransportErrorKind::SocketError => "socket-error",
            TransportErrorKind::SocketClosed => "socket-closed",
            TransportErrorKind::UnavailableId => "unavailable-id",
            TransportErrorKind::WebRtc => "webrtc",
        }
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A classified transport error as kept by the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    pub kind: TransportErrorKind,
    pub is_fatal: bool,
    pub description: &'static str,
    pub cause: String,
}

impl ErrorRecord {
    pub fn classify(kind: TransportErrorKind, cause: impl Into<String>) -> Self {
        Self {
            kind,
            is_fatal: kind.is_fatal(),
            description: kind.description(),
            cause: cause.into(),
        }
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.kind, self.description, self.cause)
    }
}

/// Error returned by transport constructors
#[derive(Error, Debug)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [TransportErrorKind; 12] = [
        TransportErrorKind::BrowserIncompatible,
        TransportErrorKind::Disconnected,
        TransportErrorKind::InvalidId,
        TransportErrorKind::InvalidKey,
        TransportErrorKind::Network,
        TransportErrorKind::PeerUnavailable,
        TransportErrorKind::SslUnavailable,
        TransportErrorKind::ServerError,
        TransportErrorKind::SocketError,
        TransportErrorKind::SocketClosed,
        TransportErrorKind::UnavailableId,
        TransportErrorKind::WebRtc,
    ];

    #[test]
    fn test_fatality_table() {
        let non_fatal: Vec<_> = ALL.iter().filter(|k| !k.is_fatal()).copied().collect();
        assert_eq!(
            non_fatal,
            vec![
                TransportErrorKind::Disconnected,
                TransportErrorKind::Network,
                TransportErrorKind::PeerUnavailable,
                TransportErrorKind::WebRtc,
            ]
        );
    }

    #[test]
    fn test_classify_copies_fatality() {
        for kind in ALL {
            let record = ErrorRecord::classify(kind, "cause");
            assert_eq!(record.is_fatal, kind.is_fatal());
            assert!(!record.description.is_empty());
            assert_eq!(record.cause, "cause");
        }
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(TransportErrorKind::UnavailableId.to_string(), "unavailable-id");
        assert_eq!(
            serde_json::to_string(&TransportErrorKind::PeerUnavailable).unwrap(),
            "\"peer-unavailable\""
        );
    }
}
