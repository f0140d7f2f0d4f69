pub mod cli;
pub mod game;
pub mod messages;
pub mod network;
pub mod random;
pub mod room;
pub mod storage;

// Re-export key types for easy testing
pub use game::{Board, GameMode, GameSession, Symbol};
pub use messages::{Message, RecoverySnapshot};
pub use network::{MemoryHub, PeerIdentity, PeerSession, SessionEvent, TcpTransport};
pub use random::SeededRandom;
pub use room::{Coordinator, CoordinatorConfig};
pub use storage::ProgressStore;
