use super::board::{split_index, Board, BoardState};
use super::error::GameError;
use super::symbol::{GameMode, Symbol};
use crate::random::SeededRandom;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Who a chat line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChatOrigin {
    Local,
    Network,
    System,
}

/// Category of a system chat line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SystemMessageKind {
    Info,
    GameWon,
    GameLost,
    XPlay,
    OPlay,
    NetworkState,
}

impl SystemMessageKind {
    /// The move-log kind for a symbol
    pub fn play(symbol: Symbol) -> Self {
        match symbol {
            Symbol::O => SystemMessageKind::OPlay,
            Symbol::X => SystemMessageKind::XPlay,
        }
    }
}

/// One line of the shared chat / move log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub origin: ChatOrigin,
    pub text: String,
    pub kind: Option<SystemMessageKind>,
}

impl ChatMessage {
    pub fn local(text: impl Into<String>) -> Self {
        Self {
            origin: ChatOrigin::Local,
            text: text.into(),
            kind: None,
        }
    }

    pub fn network(text: impl Into<String>) -> Self {
        Self {
            origin: ChatOrigin::Network,
            text: text.into(),
            kind: None,
        }
    }

    pub fn system(kind: SystemMessageKind, text: impl Into<String>) -> Self {
        Self {
            origin: ChatOrigin::System,
            text: text.into(),
            kind: Some(kind),
        }
    }
}

/// Result of a finished game from the local player's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GameOutcome {
    Win,
    Lost,
    Draw,
}

/// Describe a 3x3 position in words, e.g. "top left"
pub fn index_to_text(index: usize) -> String {
    fn part(u: usize, vertical: bool) -> &'static str {
        match (u, vertical) {
            (0, true) => "top",
            (1, true) => "middle",
            (2, true) => "bottom",
            (0, false) => "left",
            (1, false) => "center",
            (2, false) => "right",
            _ => "",
        }
    }

    let row = index / 3;
    format!("{} {}", part(row, true), part(index - row * 3, false))
}

/// Local view of one game: board, symbols, generator and log
#[derive(Debug, Clone)]
pub struct GameSession {
    mode: GameMode,
    board: Option<Board>,
    player_symbol: Symbol,
    last_played_index: Option<usize>,
    rng: Option<SeededRandom>,
    started: bool,
    room_id: Option<String>,
    chat: Vec<ChatMessage>,
}

impl Default for GameSession {
    fn default() -> Self {
        Self::new()
    }
}

impl GameSession {
    pub fn new() -> Self {
        Self {
            mode: GameMode::Regular,
            board: None,
            player_symbol: Symbol::first(),
            last_played_index: None,
            rng: None,
            started: false,
            room_id: None,
            chat: Vec::new(),
        }
    }

    pub fn mode(&self) -> GameMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: GameMode) {
        self.mode = mode;
    }

    pub fn board(&self) -> Option<&Board> {
        self.board.as_ref()
    }

    pub fn player_symbol(&self) -> Symbol {
        self.player_symbol
    }

    pub fn set_player_symbol(&mut self, symbol: Symbol) {
        self.player_symbol = symbol;
    }

    pub fn opponent_symbol(&self) -> Symbol {
        self.player_symbol.opposite()
    }

    pub fn last_played_index(&self) -> Option<usize> {
        self.last_played_index
    }

    pub fn started(&self) -> bool {
        self.started
    }

    pub fn set_started(&mut self, started: bool) {
        self.started = started;
    }

    pub fn rng(&self) -> Option<&SeededRandom> {
        self.rng.as_ref()
    }

    pub fn set_rng(&mut self, rng: SeededRandom) {
        self.rng = Some(rng);
    }

    /// Draw from the game's generator, if one is installed
    pub fn draw(&mut self) -> Option<f64> {
        self.rng.as_mut().map(SeededRandom::next)
    }

    pub fn room_id(&self) -> Option<&str> {
        self.room_id.as_deref()
    }

    pub fn set_room_id(&mut self, room_id: Option<String>) {
        self.room_id = room_id;
    }

    pub fn chat(&self) -> &[ChatMessage] {
        &self.chat
    }

    pub fn push_chat(&mut self, message: ChatMessage) {
        self.chat.push(message);
    }

    /// Allocate an empty board for the current mode
    pub fn create_board(&mut self) {
        self.board = Some(Board::new(self.mode));
        self.last_played_index = None;
        self.push_chat(ChatMessage::system(SystemMessageKind::Info, "Game started!"));
    }

    /// Drop the board and return to the pre-game state
    pub fn clear_board(&mut self) {
        self.board = None;
        self.started = false;
        self.last_played_index = None;
    }

    /// Replace the whole game with state received from the peer
    pub fn restore(
        &mut self,
        board: Board,
        player_symbol: Symbol,
        last_played_index: Option<usize>,
        rng: SeededRandom,
    ) {
        self.mode = board.mode();
        self.board = Some(board);
        self.player_symbol = player_symbol;
        self.last_played_index = last_played_index;
        self.rng = Some(rng);
        self.started = true;
    }

    /// Put `symbol` at `index` and log the move
    ///
    /// Without a board this does nothing. Turn order is not checked here.
    pub fn play_at(&mut self, index: usize, symbol: Symbol) -> Result<(), GameError> {
        let Some(board) = self.board.as_mut() else {
            return Ok(());
        };
        let before = board.state();
        board.set(index, symbol)?;
        self.last_played_index = Some(index);

        let who = if symbol == self.player_symbol {
            "You"
        } else {
            "Your opponent"
        };
        let text = match board {
            Board::Regular(_) => format!("{} played {}", who, index_to_text(index)),
            Board::Ultimate(_) => {
                let (outer, inner) = split_index(index);
                format!(
                    "{} played {} of the {} board",
                    who,
                    index_to_text(inner),
                    index_to_text(outer)
                )
            }
        };
        self.push_chat(ChatMessage::system(SystemMessageKind::play(symbol), text));

        if before.is_none() {
            match self.game_result() {
                Some(GameOutcome::Win) => {
                    self.push_chat(ChatMessage::system(SystemMessageKind::GameWon, "You won!"))
                }
                Some(GameOutcome::Lost) => {
                    self.push_chat(ChatMessage::system(SystemMessageKind::GameLost, "You lost!"))
                }
                Some(GameOutcome::Draw) => {
                    self.push_chat(ChatMessage::system(SystemMessageKind::Info, "It's a draw!"))
                }
                None => {}
            }
        }
        Ok(())
    }

    /// Whether the local player is the one to move
    pub fn is_turn_to_play(&self) -> bool {
        match &self.board {
            Some(board) => super::board::is_turn_to_play(board, self.player_symbol),
            None => false,
        }
    }

    /// Win/draw state of the current board
    pub fn state(&self) -> Option<BoardState> {
        self.board.as_ref().and_then(Board::state)
    }

    /// Outcome for the local player once the board is resolved
    pub fn game_result(&self) -> Option<GameOutcome> {
        match self.state()? {
            BoardState::Won(symbol) if symbol == self.player_symbol => Some(GameOutcome::Win),
            BoardState::Won(_) => Some(GameOutcome::Lost),
            BoardState::Draw => Some(GameOutcome::Draw),
        }
    }

    /// Hex SHA-256 over the board and last move, for comparing peers
    pub fn state_digest(&self) -> String {
        let encoded = serde_json::to_vec(&(&self.board, self.last_played_index))
            .unwrap_or_default();
        hex::encode(Sha256::digest(&encoded))
    }
}
