use crate::game::GameError;
use crate::storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RoomError {
    #[error("The session has no identity yet")]
    NotReady,

    #[error("Only the host can do that")]
    NotHost,

    #[error("No game in progress")]
    NoActiveGame,

    #[error("The game is already over")]
    GameOver,

    #[error("It is not your turn")]
    NotYourTurn,

    #[error("Cell {0} is already taken")]
    CellOccupied(usize),

    #[error("Game error: {0}")]
    Game(#[from] GameError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}
