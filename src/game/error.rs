use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameError {
    InvalidSymbol(String),
    InvalidMode(String),
    IndexOutOfRange { index: usize, cells: usize },
}

impl fmt::Display for GameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameError::InvalidSymbol(msg) => write!(f, "Invalid symbol: {}", msg),
            GameError::InvalidMode(msg) => write!(f, "Invalid game mode: {}", msg),
            GameError::IndexOutOfRange { index, cells } => write!(
                f,
                "Cell index {} is out of range for a board of {} cells",
                index, cells
            ),
        }
    }
}

impl std::error::Error for GameError {}
