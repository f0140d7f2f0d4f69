pub mod codec;
pub mod types;

pub use codec::{decode, encode, MessageCodec, ProtocolError, MAX_PAYLOAD_SIZE};
pub use types::{Message, RecoverySnapshot, KNOWN_TYPES};
