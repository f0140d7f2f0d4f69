pub mod errors;
pub mod memory;
pub mod session;
pub mod tcp;
pub mod transport;
pub mod wire;

pub use errors::{ErrorRecord, TransportError, TransportErrorKind};
pub use memory::{MemoryHub, MemoryTransport};
pub use session::{
    ListenerId, PeerSession, Role, SessionConfig, SessionEvent, SessionState,
    DEFAULT_READY_SETTLE,
};
pub use tcp::TcpTransport;
pub use transport::{ConnectionId, PeerIdentity, Transport, TransportEvent};
pub use wire::{FrameCodec, WireConfig, WireProtocolError};
