pub mod coordinator;
pub mod errors;
pub mod recovery;

pub use coordinator::{
    guest_symbol, host_symbol, Coordinator, CoordinatorConfig, DEFAULT_HOST_RECOVERY_DELAY,
};
pub use errors::RoomError;
pub use recovery::{CancelToken, RecoveryLoop, DEFAULT_RETRY_INTERVAL};
