use crate::game::{Board, GameMode, Symbol};
use crate::random::{RandomPosition, SeededRandom};
use serde::{Deserialize, Serialize};

/// Wire discriminants, in declaration order
pub const CHANGE_OPTIONS: &str = "GameClientChangeOptionsMessage";
pub const START_GAME: &str = "GameClientStartGameMessage";
pub const START_GAME_LEGACY: &str = "GameClientStartGame";
pub const CHAT: &str = "GameClientChatMessage";
pub const PLAY_AT: &str = "GameClientPlayAtMessage";
pub const BACK_TO_LOBBY: &str = "GameClientBackToLobbyMessage";
pub const HOST_RECOVERY: &str = "GameClientHostRecoveryMessage";
pub const GUEST_RECOVERY: &str = "GameClientGuestRecoveryMessage";

/// Every `type` value a peer may send
pub const KNOWN_TYPES: [&str; 8] = [
    CHANGE_OPTIONS,
    START_GAME,
    START_GAME_LEGACY,
    CHAT,
    PLAY_AT,
    BACK_TO_LOBBY,
    HOST_RECOVERY,
    GUEST_RECOVERY,
];

/// Full game state sent during recovery
///
/// `sender_symbol` is the symbol of the peer that sent the snapshot; the
/// receiver takes the opposite one. It travels as `guestSymbol`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RecoverySnapshot {
    pub game_mode: GameMode,
    pub seed: String,
    pub iteration: u64,
    pub board: Board,
    #[serde(rename = "guestSymbol")]
    pub sender_symbol: Symbol,
    #[serde(default)]
    pub last_played_index: Option<usize>,
    pub room_id: String,
}

impl RecoverySnapshot {
    /// Whether the board shape agrees with the declared mode
    pub fn is_consistent(&self) -> bool {
        self.board.mode() == self.game_mode
    }

    /// Generator positioned where the sender's generator is
    pub fn rng(&self) -> SeededRandom {
        SeededRandom::from(&self.position())
    }

    pub fn position(&self) -> RandomPosition {
        RandomPosition {
            seed: self.seed.clone(),
            iteration: self.iteration,
        }
    }
}

/// Messages exchanged between the two peers
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum Message {
    #[serde(rename = "GameClientChangeOptionsMessage", rename_all = "camelCase")]
    ChangeOptions { game_mode: GameMode },

    #[serde(
        rename = "GameClientStartGameMessage",
        alias = "GameClientStartGame",
        rename_all = "camelCase"
    )]
    StartGame {
        game_mode: GameMode,
        seed: String,
        iteration: u64,
    },

    #[serde(rename = "GameClientChatMessage")]
    Chat { text: String },

    #[serde(rename = "GameClientPlayAtMessage")]
    PlayAt { index: usize },

    #[serde(rename = "GameClientBackToLobbyMessage")]
    BackToLobby,

    #[serde(rename = "GameClientHostRecoveryMessage")]
    HostRecovery(RecoverySnapshot),

    #[serde(rename = "GameClientGuestRecoveryMessage")]
    GuestRecovery(RecoverySnapshot),
}

impl Message {
    pub fn change_options(game_mode: GameMode) -> Self {
        Message::ChangeOptions { game_mode }
    }

    /// StartGame for a freshly seeded generator
    pub fn start_game(game_mode: GameMode, seed: impl Into<String>) -> Self {
        Message::StartGame {
            game_mode,
            seed: seed.into(),
            iteration: 0,
        }
    }

    pub fn chat(text: impl Into<String>) -> Self {
        Message::Chat { text: text.into() }
    }

    pub fn play_at(index: usize) -> Self {
        Message::PlayAt { index }
    }

    /// Get the message type as it appears on the wire
    pub fn message_type(&self) -> &'static str {
        match self {
            Message::ChangeOptions { .. } => CHANGE_OPTIONS,
            Message::StartGame { .. } => START_GAME,
            Message::Chat { .. } => CHAT,
            Message::PlayAt { .. } => PLAY_AT,
            Message::BackToLobby => BACK_TO_LOBBY,
            Message::HostRecovery(_) => HOST_RECOVERY,
            Message::GuestRecovery(_) => GUEST_RECOVERY,
        }
    }

    /// Generator position carried by the message, if any
    pub fn iteration(&self) -> Option<u64> {
        match self {
            Message::StartGame { iteration, .. } => Some(*iteration),
            Message::HostRecovery(snapshot) | Message::GuestRecovery(snapshot) => {
                Some(snapshot.iteration)
            }
            _ => None,
        }
    }

    /// The snapshot carried by either recovery message
    pub fn snapshot(&self) -> Option<&RecoverySnapshot> {
        match self {
            Message::HostRecovery(snapshot) | Message::GuestRecovery(snapshot) => Some(snapshot),
            _ => None,
        }
    }

    pub fn is_recovery(&self) -> bool {
        self.snapshot().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot() -> RecoverySnapshot {
        let mut board = Board::new(GameMode::Regular);
        board.set(4, Symbol::O).unwrap();
        RecoverySnapshot {
            game_mode: GameMode::Regular,
            seed: "abc".to_string(),
            iteration: 1,
            board,
            sender_symbol: Symbol::X,
            last_played_index: Some(4),
            room_id: "room-1".to_string(),
        }
    }

    #[test]
    fn test_start_game_wire_shape() {
        let value = serde_json::to_value(Message::start_game(GameMode::Ultimate, "abc")).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "GameClientStartGameMessage",
                "gameMode": "ultimate",
                "seed": "abc",
                "iteration": 0
            })
        );
    }

    #[test]
    fn test_unit_and_simple_variants() {
        assert_eq!(
            serde_json::to_value(Message::BackToLobby).unwrap(),
            json!({"type": "GameClientBackToLobbyMessage"})
        );
        assert_eq!(
            serde_json::to_value(Message::play_at(7)).unwrap(),
            json!({"type": "GameClientPlayAtMessage", "index": 7})
        );
        assert_eq!(
            serde_json::to_value(Message::change_options(GameMode::Regular)).unwrap(),
            json!({"type": "GameClientChangeOptionsMessage", "gameMode": "regular"})
        );
    }

    #[test]
    fn test_recovery_wire_shape() {
        let value = serde_json::to_value(Message::GuestRecovery(snapshot())).unwrap();
        assert_eq!(value["type"], "GameClientGuestRecoveryMessage");
        assert_eq!(value["guestSymbol"], "x");
        assert_eq!(value["lastPlayedIndex"], 4);
        assert_eq!(value["roomId"], "room-1");
        assert_eq!(value["board"][4], "o");
        assert!(value["board"][0].is_null());
    }

    #[test]
    fn test_missing_last_played_index_defaults() {
        let mut value = serde_json::to_value(Message::HostRecovery(snapshot())).unwrap();
        value.as_object_mut().unwrap().remove("lastPlayedIndex");
        let message: Message = serde_json::from_value(value).unwrap();
        assert_eq!(message.snapshot().unwrap().last_played_index, None);
    }

    #[test]
    fn test_iteration_accessor() {
        assert_eq!(Message::start_game(GameMode::Regular, "s").iteration(), Some(0));
        assert_eq!(Message::HostRecovery(snapshot()).iteration(), Some(1));
        assert_eq!(Message::play_at(3).iteration(), None);
    }

    #[test]
    fn test_snapshot_consistency() {
        let mut s = snapshot();
        assert!(s.is_consistent());
        s.game_mode = GameMode::Ultimate;
        assert!(!s.is_consistent());
    }

    #[test]
    fn test_snapshot_rng_position() {
        let s = snapshot();
        let mut rng = s.rng();
        assert_eq!(rng.iteration(), 1);
        let mut reference = SeededRandom::new(Some("abc"));
        reference.next();
        assert_eq!(rng.next(), reference.next());
    }

    #[test]
    fn test_message_type_matches_wire() {
        let messages = [
            Message::change_options(GameMode::Regular),
            Message::start_game(GameMode::Regular, "s"),
            Message::chat("hi"),
            Message::play_at(0),
            Message::BackToLobby,
            Message::HostRecovery(snapshot()),
            Message::GuestRecovery(snapshot()),
        ];
        for message in messages {
            let value = serde_json::to_value(&message).unwrap();
            assert_eq!(value["type"], message.message_type());
            assert!(KNOWN_TYPES.contains(&message.message_type()));
        }
    }
}
