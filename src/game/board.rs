use super::error::GameError;
use super::symbol::{GameMode, Symbol};
use serde::{Deserialize, Serialize};

/// Number of addressable cells on a regular board
pub const REGULAR_CELLS: usize = 9;

/// Number of addressable cells on an ultimate board
pub const ULTIMATE_CELLS: usize = 81;

/// One square: empty or holding a symbol
pub type Cell = Option<Symbol>;

/// A single 3x3 grid, row-major
pub type Grid = [Cell; 9];

/// The 8 winning lines of a 3x3 grid, diagonals first
const DIAGONALS: [[usize; 3]; 2] = [[0, 4, 8], [2, 4, 6]];

/// Resolution of a grid or of a whole board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoardState {
    Won(Symbol),
    Draw,
}

/// Game board for either mode
///
/// Serialized as a bare JSON array (`null` for empty cells) for regular
/// boards and as an array of nine such arrays for ultimate boards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Board {
    Regular(Grid),
    Ultimate([Grid; 9]),
}

impl Board {
    /// Create an empty board for the given mode
    pub fn new(mode: GameMode) -> Self {
        match mode {
            GameMode::Regular => Board::Regular([None; 9]),
            GameMode::Ultimate => Board::Ultimate([[None; 9]; 9]),
        }
    }

    /// The mode this board shape belongs to
    pub fn mode(&self) -> GameMode {
        match self {
            Board::Regular(_) => GameMode::Regular,
            Board::Ultimate(_) => GameMode::Ultimate,
        }
    }

    /// Size of the flattened index space
    pub fn cell_count(&self) -> usize {
        match self {
            Board::Regular(_) => REGULAR_CELLS,
            Board::Ultimate(_) => ULTIMATE_CELLS,
        }
    }

    /// Get the cell at a flattened index, `None` if the index is out of range
    pub fn get(&self, index: usize) -> Option<Cell> {
        if index >= self.cell_count() {
            return None;
        }
        match self {
            Board::Regular(grid) => Some(grid[index]),
            Board::Ultimate(grids) => {
                let (outer, inner) = split_index(index);
                Some(grids[outer][inner])
            }
        }
    }

    /// Write a symbol at a flattened index
    ///
    /// Filled cells are overwritten without complaint; only the index range
    /// is checked.
    pub fn set(&mut self, index: usize, symbol: Symbol) -> Result<(), GameError> {
        let cells = self.cell_count();
        if index >= cells {
            return Err(GameError::IndexOutOfRange { index, cells });
        }
        match self {
            Board::Regular(grid) => grid[index] = Some(symbol),
            Board::Ultimate(grids) => {
                let (outer, inner) = split_index(index);
                grids[outer][inner] = Some(symbol);
            }
        }
        Ok(())
    }

    /// All cells in flattened index order
    pub fn cells(&self) -> Vec<Cell> {
        match self {
            Board::Regular(grid) => grid.to_vec(),
            Board::Ultimate(grids) => grids.iter().flatten().copied().collect(),
        }
    }

    /// Count the cells holding `symbol`
    pub fn count(&self, symbol: Symbol) -> usize {
        self.cells()
            .into_iter()
            .filter(|cell| *cell == Some(symbol))
            .count()
    }

    /// Win/draw state of the whole board
    pub fn state(&self) -> Option<BoardState> {
        match self {
            Board::Regular(grid) => check_board_state(grid),
            Board::Ultimate(grids) => check_ultimate_board_state(grids),
        }
    }
}

/// Split an ultimate index into (sub-board, cell within sub-board)
pub fn split_index(index: usize) -> (usize, usize) {
    (index / 9, index % 9)
}

fn line_owner(grid: &Grid, line: [usize; 3]) -> Option<Symbol> {
    let first = grid[line[0]]?;
    if grid[line[1]] == Some(first) && grid[line[2]] == Some(first) {
        Some(first)
    } else {
        None
    }
}

/// Resolve a single 3x3 grid
///
/// Diagonals are checked first, then row `i` and column `i` for each `i`.
/// Returns `Draw` only when no line is complete and every cell is filled.
pub fn check_board_state(grid: &Grid) -> Option<BoardState> {
    for diagonal in DIAGONALS {
        if let Some(symbol) = line_owner(grid, diagonal) {
            return Some(BoardState::Won(symbol));
        }
    }

    for i in 0..3 {
        let row = [i * 3, i * 3 + 1, i * 3 + 2];
        if let Some(symbol) = line_owner(grid, row) {
            return Some(BoardState::Won(symbol));
        }
        let column = [i, i + 3, i + 6];
        if let Some(symbol) = line_owner(grid, column) {
            return Some(BoardState::Won(symbol));
        }
    }

    if grid.iter().all(Option::is_some) {
        return Some(BoardState::Draw);
    }

    None
}

/// Resolve an ultimate board through its meta-board
///
/// Each won sub-board occupies its meta cell with the winner; drawn or open
/// sub-boards leave it empty. A meta-board win decides the game. Otherwise
/// the game is a draw only once every sub-board is resolved.
pub fn check_ultimate_board_state(grids: &[Grid; 9]) -> Option<BoardState> {
    let results: Vec<Option<BoardState>> = grids.iter().map(check_board_state).collect();

    let mut meta: Grid = [None; 9];
    for (slot, result) in meta.iter_mut().zip(&results) {
        if let Some(BoardState::Won(symbol)) = result {
            *slot = Some(*symbol);
        }
    }

    match check_board_state(&meta) {
        Some(BoardState::Won(symbol)) => Some(BoardState::Won(symbol)),
        _ if results.iter().all(Option::is_some) => Some(BoardState::Draw),
        _ => None,
    }
}

/// Whether `symbol` is the one to move, judged only from the board contents
pub fn is_turn_to_play(board: &Board, symbol: Symbol) -> bool {
    let mine = board.count(symbol) as i64;
    let theirs = board.count(symbol.opposite()) as i64;
    let expected = if symbol == Symbol::first() { 0 } else { -1 };
    mine - theirs == expected
}
