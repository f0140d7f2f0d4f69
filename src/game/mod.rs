// Re-export all public items
pub use self::board::{
    check_board_state, check_ultimate_board_state, is_turn_to_play, split_index, Board,
    BoardState, Cell, Grid, REGULAR_CELLS, ULTIMATE_CELLS,
};
pub use self::error::GameError;
pub use self::state::{
    index_to_text, ChatMessage, ChatOrigin, GameOutcome, GameSession, SystemMessageKind,
};
pub use self::symbol::{GameMode, Symbol};

// Define submodules
mod board;
mod error;
mod state;
mod symbol;
