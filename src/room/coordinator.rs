use super::errors::RoomError;
use super::recovery::{CancelToken, RecoveryLoop, DEFAULT_RETRY_INTERVAL};
use crate::game::{ChatMessage, GameMode, GameSession, Symbol, SystemMessageKind};
use crate::messages::{Message, RecoverySnapshot};
use crate::network::{ListenerId, PeerIdentity, PeerSession, SessionEvent, TransportEvent};
use crate::random::SeededRandom;
use crate::storage::{HostProgress, ProgressStore};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

/// Settle delay before a host offers its snapshot to a reconnected guest
pub const DEFAULT_HOST_RECOVERY_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub retry_interval: Duration,
    pub host_recovery_delay: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            retry_interval: DEFAULT_RETRY_INTERVAL,
            host_recovery_delay: DEFAULT_HOST_RECOVERY_DELAY,
        }
    }
}

/// Host symbol for the shared first draw: `o` above one half
pub fn host_symbol(draw: f64) -> Symbol {
    if draw > 0.5 {
        Symbol::O
    } else {
        Symbol::X
    }
}

/// Guest symbol for the same draw, always the other one
pub fn guest_symbol(draw: f64) -> Symbol {
    if draw > 0.5 {
        Symbol::X
    } else {
        Symbol::O
    }
}

/// Drives one room: lobby, game start, move relay and recovery
///
/// Like [`PeerSession`] this is a synchronous state machine. Feed it
/// transport events and timer polls; it forwards them to the session,
/// reacts to the resulting session events, and mutates the game.
pub struct Coordinator {
    session: PeerSession,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    listener: ListenerId,
    store: ProgressStore,
    game: GameSession,
    config: CoordinatorConfig,
    recovery: Option<RecoveryLoop>,
    host_recovery_at: Option<Instant>,
    join_reply: Option<oneshot::Sender<bool>>,
}

impl Coordinator {
    pub fn new(mut session: PeerSession, store: ProgressStore, config: CoordinatorConfig) -> Self {
        let (listener, events) = session.subscribe();
        Self {
            session,
            events,
            listener,
            store,
            game: GameSession::new(),
            config,
            recovery: None,
            host_recovery_at: None,
            join_reply: None,
        }
    }

    pub fn game(&self) -> &GameSession {
        &self.game
    }

    pub fn session(&self) -> &PeerSession {
        &self.session
    }

    pub fn store(&self) -> &ProgressStore {
        &self.store
    }

    /// Listen to the session's lifecycle events alongside the coordinator
    pub fn subscribe(&mut self) -> (ListenerId, mpsc::UnboundedReceiver<SessionEvent>) {
        self.session.subscribe()
    }

    pub fn unsubscribe(&mut self, id: ListenerId) {
        self.session.unsubscribe(id);
    }

    pub fn is_recovering(&self) -> bool {
        self.recovery.as_ref().is_some_and(|r| !r.is_cancelled())
    }

    /// Rejoin attempts made by the current recovery loop
    pub fn recovery_attempts(&self) -> u32 {
        self.recovery.as_ref().map_or(0, RecoveryLoop::attempts)
    }

    /// Token of the running recovery loop, for cancelling it from elsewhere
    pub fn recovery_token(&self) -> Option<CancelToken> {
        self.recovery.as_ref().map(|r| r.token().clone())
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        [
            self.session.next_deadline(),
            self.recovery.as_ref().and_then(RecoveryLoop::next_deadline),
            self.host_recovery_at,
        ]
        .into_iter()
        .flatten()
        .min()
    }

    pub fn handle_transport_event(&mut self, event: TransportEvent, now: Instant) {
        self.session.handle_transport_event(event, now);
        self.drain_session_events(now);
    }

    pub fn poll_timers(&mut self, now: Instant) {
        self.session.poll_timers(now);
        self.drain_session_events(now);

        if self.host_recovery_at.is_some_and(|at| at <= now) {
            self.host_recovery_at = None;
            self.offer_host_recovery();
        }

        if self.recovery.as_ref().is_some_and(RecoveryLoop::is_cancelled) {
            debug!("Dropping cancelled recovery loop");
            self.recovery = None;
        }
        let attempt = self.recovery.as_mut().and_then(|r| r.take_attempt(now));
        if let Some(room) = attempt {
            if self.session.join(&room).is_none() {
                warn!(%room, "Session can no longer join, abandoning recovery");
                self.cancel_recovery();
            }
        }
        self.drain_session_events(now);
    }

    fn drain_session_events(&mut self, now: Instant) {
        while let Ok(event) = self.events.try_recv() {
            self.on_session_event(event, now);
        }
    }

    /// Snapshot of the current game, if there is one to share
    pub fn snapshot(&self) -> Option<RecoverySnapshot> {
        let board = self.game.board()?.clone();
        let rng = self.game.rng()?;
        let room_id = self
            .game
            .room_id()
            .map(str::to_string)
            .or_else(|| self.session.id().map(|id| id.to_string()))?;
        Some(RecoverySnapshot {
            game_mode: board.mode(),
            seed: rng.seed().to_string(),
            iteration: rng.iteration(),
            board,
            sender_symbol: self.game.player_symbol(),
            last_played_index: self.game.last_played_index(),
            room_id,
        })
    }

    /// Open a room under our own identity
    ///
    /// Reopening an interrupted room under the same identity keeps its
    /// `game-started` progress, so a returning guest is offered recovery.
    pub fn host(&mut self) -> Result<PeerIdentity, RoomError> {
        let id = self.session.id().cloned().ok_or(RoomError::NotReady)?;
        let resuming = self.store.identity()?.as_deref() == Some(id.as_str())
            && self.store.host_progress()? == HostProgress::GameStarted;
        self.store.set_identity(id.as_str())?;
        if resuming {
            info!(%id, "Reopening interrupted room");
        } else {
            self.store.set_host_progress(HostProgress::Hosting)?;
            info!(%id, "Hosting room");
        }
        self.game.set_room_id(Some(id.to_string()));
        Ok(id)
    }

    /// Join someone else's room; `reply` resolves with the outcome
    pub fn join(&mut self, room: &PeerIdentity, reply: oneshot::Sender<bool>) -> Result<(), RoomError> {
        self.store.clear()?;
        self.cancel_recovery();
        if let Some(previous) = self.join_reply.take() {
            let _ = previous.send(false);
        }
        match self.session.join(room) {
            Some(_) => self.join_reply = Some(reply),
            None => {
                let _ = reply.send(false);
            }
        }
        Ok(())
    }

    /// Start the first game of the room
    pub fn start(&mut self) -> Result<(), RoomError> {
        if !self.session.is_host() {
            return Err(RoomError::NotHost);
        }
        self.store.set_host_progress(HostProgress::GameStarted)?;
        self.begin_game();
        self.game.set_started(true);
        Ok(())
    }

    /// Start over with a fresh seed
    pub fn play_again(&mut self) -> Result<(), RoomError> {
        if !self.session.is_host() {
            return Err(RoomError::NotHost);
        }
        self.begin_game();
        Ok(())
    }

    fn begin_game(&mut self) {
        let mut rng = SeededRandom::new(None);
        let seed = rng.seed().to_string();
        self.game.create_board();
        let symbol = host_symbol(rng.next());
        self.game.set_player_symbol(symbol);
        self.game.set_rng(rng);
        info!(%seed, %symbol, mode = %self.game.mode(), "Starting game");
        self.session.send(&Message::start_game(self.game.mode(), seed));
    }

    pub fn back_to_lobby(&mut self) -> Result<(), RoomError> {
        if !self.session.is_host() {
            return Err(RoomError::NotHost);
        }
        self.game.clear_board();
        self.session.send(&Message::BackToLobby);
        Ok(())
    }

    /// Play a local move and relay it
    pub fn play_at(&mut self, index: usize) -> Result<(), RoomError> {
        let board = self.game.board().ok_or(RoomError::NoActiveGame)?;
        if board.state().is_some() {
            return Err(RoomError::GameOver);
        }
        if !self.game.is_turn_to_play() {
            return Err(RoomError::NotYourTurn);
        }
        if matches!(board.get(index), Some(Some(_))) {
            return Err(RoomError::CellOccupied(index));
        }
        self.game.play_at(index, self.game.player_symbol())?;
        self.session.send(&Message::play_at(index));
        Ok(())
    }

    pub fn send_chat(&mut self, text: &str) {
        self.session.send(&Message::chat(text));
        self.game.push_chat(ChatMessage::local(text));
    }

    /// Change the lobby mode; a host tells the guest about it
    pub fn set_mode(&mut self, mode: GameMode) {
        if mode == self.game.mode() {
            return;
        }
        self.game.set_mode(mode);
        if self.session.is_host() {
            self.session.send(&Message::change_options(mode));
        }
    }

    /// Stop trying to rejoin the host
    pub fn cancel_recovery(&mut self) {
        if let Some(recovery) = self.recovery.take() {
            info!(room = %recovery.room(), attempts = recovery.attempts(), "Cancelling recovery");
            recovery.token().cancel();
        }
    }

    /// Leave the room; forgets a persisted identity that no game depends on
    ///
    /// Returns whether the store was cleared.
    pub fn return_home(&mut self) -> Result<bool, RoomError> {
        self.cancel_recovery();
        self.host_recovery_at = None;
        self.game.clear_board();
        self.game.set_room_id(None);

        let stale = self.store.identity()?.is_some()
            && self.store.host_progress()? == HostProgress::NotStarted;
        if stale {
            info!("Clearing stale persisted identity");
            self.store.clear()?;
        }
        Ok(stale)
    }

    pub fn dispose(&mut self) {
        self.cancel_recovery();
        if let Some(reply) = self.join_reply.take() {
            let _ = reply.send(false);
        }
        self.session.unsubscribe(self.listener);
        self.session.dispose();
    }

    #[instrument(level = "debug", skip(self, now))]
    fn on_session_event(&mut self, event: SessionEvent, now: Instant) {
        match event {
            SessionEvent::Ready => debug!("Session ready"),
            SessionEvent::GameJoined(room) => self.on_game_joined(room, now),
            SessionEvent::GameLeft => {
                info!("Guest left the room");
                self.game
                    .push_chat(ChatMessage::system(SystemMessageKind::Info, "Your opponent left"));
            }
            SessionEvent::HostRecoveryMode => self.enter_recovery(now),
            SessionEvent::FailedToJoin => self.on_failed_to_join(now),
            SessionEvent::NetworkStatusChanged => {
                let text = if self.session.network_error() {
                    "Network connection lost"
                } else {
                    "Network connection restored"
                };
                self.game
                    .push_chat(ChatMessage::system(SystemMessageKind::NetworkState, text));
            }
            SessionEvent::Error(record) => {
                debug!(kind = %record.kind, fatal = record.is_fatal, "Session reported an error");
            }
            SessionEvent::Data(message) => self.on_message(message),
        }
    }

    fn on_game_joined(&mut self, room: PeerIdentity, now: Instant) {
        if self.session.is_host() {
            info!(%room, "Guest joined");
            self.session.send(&Message::change_options(self.game.mode()));
            match self.store.host_progress() {
                Ok(HostProgress::GameStarted) => {
                    debug!(
                        delay_ms = self.config.host_recovery_delay.as_millis() as u64,
                        "Scheduling host recovery"
                    );
                    self.host_recovery_at = Some(now + self.config.host_recovery_delay);
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Could not read host progress"),
            }
            return;
        }

        if let Some(recovery) = self.recovery.take() {
            info!(%room, attempts = recovery.attempts(), "Rejoined host");
            match self.snapshot() {
                Some(snapshot) => self.session.send(&Message::GuestRecovery(snapshot)),
                None => info!("No game to restore, skipping guest recovery"),
            }
        } else {
            info!(%room, "Joined room");
            self.game.set_room_id(Some(room.to_string()));
        }
        if let Some(reply) = self.join_reply.take() {
            let _ = reply.send(true);
        }
    }

    fn on_failed_to_join(&mut self, now: Instant) {
        if let Some(recovery) = self.recovery.as_mut() {
            if recovery.awaiting_result() {
                if !recovery.attempt_failed(now) {
                    self.recovery = None;
                }
                return;
            }
        }
        if let Some(reply) = self.join_reply.take() {
            info!("Failed to join room");
            let _ = reply.send(false);
        }
    }

    fn enter_recovery(&mut self, now: Instant) {
        if self.is_recovering() {
            debug!("Recovery already running");
            return;
        }
        let Some(room) = self.game.room_id().map(PeerIdentity::from) else {
            warn!("Lost the host but no room is known, cannot recover");
            return;
        };
        self.game.push_chat(ChatMessage::system(
            SystemMessageKind::NetworkState,
            "Lost connection to the host, reconnecting",
        ));
        self.recovery = Some(RecoveryLoop::start(
            room,
            CancelToken::new(),
            self.config.retry_interval,
            now,
        ));
    }

    fn offer_host_recovery(&mut self) {
        if !self.session.is_host() {
            debug!("No guest connected anymore, skipping host recovery");
            return;
        }
        match self.snapshot() {
            Some(snapshot) => {
                info!(iteration = snapshot.iteration, "Sending host recovery snapshot");
                self.session.send(&Message::HostRecovery(snapshot));
            }
            None => info!("No game to offer, skipping host recovery"),
        }
    }

    fn on_message(&mut self, message: Message) {
        match message {
            Message::ChangeOptions { game_mode } => {
                debug!(%game_mode, "Peer changed the game mode");
                self.game.set_mode(game_mode);
            }
            Message::StartGame {
                game_mode,
                seed,
                iteration,
            } => {
                self.game.set_mode(game_mode);
                let mut rng = SeededRandom::with_iteration(&seed, iteration);
                self.game.create_board();
                let symbol = guest_symbol(rng.next());
                self.game.set_player_symbol(symbol);
                self.game.set_rng(rng);
                self.game.set_started(true);
                info!(%seed, iteration, %symbol, "Game started by host");
            }
            Message::Chat { text } => self.game.push_chat(ChatMessage::network(text)),
            Message::PlayAt { index } => {
                let symbol = self.game.opponent_symbol();
                if let Err(e) = self.game.play_at(index, symbol) {
                    warn!(index, error = %e, "Ignoring opponent move");
                }
            }
            Message::BackToLobby => {
                info!("Host returned to the lobby");
                self.game.clear_board();
            }
            Message::HostRecovery(snapshot) | Message::GuestRecovery(snapshot) => {
                self.adopt(snapshot)
            }
        }
    }

    /// Replace local game state with the peer's snapshot
    fn adopt(&mut self, snapshot: RecoverySnapshot) {
        if !snapshot.is_consistent() {
            warn!(
                mode = %snapshot.game_mode,
                board = %snapshot.board.mode(),
                "Dropping recovery snapshot whose board does not match its mode"
            );
            return;
        }
        let rng = snapshot.rng();
        self.game.restore(
            snapshot.board,
            snapshot.sender_symbol.opposite(),
            snapshot.last_played_index,
            rng,
        );
        self.game.set_room_id(Some(snapshot.room_id));
        if self.session.is_host() {
            if let Err(e) = self.store.set_host_progress(HostProgress::GameStarted) {
                error!(error = %e, "Failed to persist host progress");
            }
        }
        self.game
            .push_chat(ChatMessage::system(SystemMessageKind::Info, "Game restored"));
        info!(
            symbol = %self.game.player_symbol(),
            digest = %self.game.state_digest(),
            "Adopted recovery snapshot"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::Board;
    use crate::network::{MemoryHub, SessionConfig};

    struct Peer {
        coordinator: Coordinator,
        transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
    }

    impl Peer {
        fn new(hub: &MemoryHub, id: &str, store: ProgressStore) -> Self {
            let (transport, transport_rx) = hub.register(Some(id));
            let session = PeerSession::new(Box::new(transport), SessionConfig::default());
            Self {
                coordinator: Coordinator::new(session, store, CoordinatorConfig::default()),
                transport_rx,
            }
        }

        fn pump(&mut self, now: Instant) -> bool {
            let mut any = false;
            while let Ok(event) = self.transport_rx.try_recv() {
                self.coordinator.handle_transport_event(event, now);
                any = true;
            }
            any
        }
    }

    fn settle(peers: &mut [&mut Peer], now: Instant) {
        loop {
            let mut any = false;
            for peer in peers.iter_mut() {
                any |= peer.pump(now);
            }
            if !any {
                break;
            }
        }
    }

    fn connected(now: Instant) -> (MemoryHub, Peer, Peer) {
        let hub = MemoryHub::new();
        let mut host = Peer::new(&hub, "host", ProgressStore::in_memory().unwrap());
        let mut guest = Peer::new(&hub, "guest", ProgressStore::in_memory().unwrap());
        settle(&mut [&mut host, &mut guest], now);
        host.coordinator.host().unwrap();

        let (tx, mut rx) = oneshot::channel();
        guest.coordinator.join(&"host".into(), tx).unwrap();
        settle(&mut [&mut host, &mut guest], now);
        assert_eq!(rx.try_recv(), Ok(true));
        (hub, host, guest)
    }

    #[test]
    fn test_symbols_are_complementary() {
        for draw in [0.0, 0.25, 0.5, 0.5000001, 0.75, 0.999] {
            assert_ne!(host_symbol(draw), guest_symbol(draw));
        }
        assert_eq!(host_symbol(0.9), Symbol::O);
        assert_eq!(host_symbol(0.5), Symbol::X);
    }

    #[test]
    fn test_host_requires_identity() {
        let hub = MemoryHub::new();
        let mut peer = Peer::new(&hub, "host", ProgressStore::in_memory().unwrap());
        assert!(matches!(peer.coordinator.host(), Err(RoomError::NotReady)));

        peer.pump(Instant::now());
        assert_eq!(peer.coordinator.host().unwrap(), PeerIdentity::from("host"));
        let store = peer.coordinator.store();
        assert_eq!(store.identity().unwrap().as_deref(), Some("host"));
        assert_eq!(store.host_progress().unwrap(), HostProgress::Hosting);
    }

    #[test]
    fn test_reopened_room_keeps_started_progress() {
        let store = ProgressStore::in_memory().unwrap();
        store.set_identity("host").unwrap();
        store.set_host_progress(HostProgress::GameStarted).unwrap();
        let hub = MemoryHub::new();
        let mut host = Peer::new(&hub, "host", store.clone());
        let mut guest = Peer::new(&hub, "guest", ProgressStore::in_memory().unwrap());
        let now = Instant::now();
        settle(&mut [&mut host, &mut guest], now);

        host.coordinator.host().unwrap();
        assert_eq!(store.host_progress().unwrap(), HostProgress::GameStarted);

        let (tx, _rx) = oneshot::channel();
        guest.coordinator.join(&"host".into(), tx).unwrap();
        settle(&mut [&mut host, &mut guest], now);
        assert!(host.coordinator.session().is_host());
        assert_eq!(
            host.coordinator.next_deadline(),
            Some(now + DEFAULT_HOST_RECOVERY_DELAY)
        );
    }

    #[test]
    fn test_other_identity_starts_fresh_room() {
        let store = ProgressStore::in_memory().unwrap();
        store.set_identity("someone-else").unwrap();
        store.set_host_progress(HostProgress::GameStarted).unwrap();
        let hub = MemoryHub::new();
        let mut peer = Peer::new(&hub, "host", store.clone());
        peer.pump(Instant::now());

        peer.coordinator.host().unwrap();
        assert_eq!(store.identity().unwrap().as_deref(), Some("host"));
        assert_eq!(store.host_progress().unwrap(), HostProgress::Hosting);
    }

    #[test]
    fn test_start_is_host_only() {
        let now = Instant::now();
        let (_hub, mut host, mut guest) = connected(now);
        assert!(matches!(guest.coordinator.start(), Err(RoomError::NotHost)));
        assert!(matches!(guest.coordinator.back_to_lobby(), Err(RoomError::NotHost)));

        host.coordinator.start().unwrap();
        settle(&mut [&mut host, &mut guest], now);
        assert!(guest.coordinator.game().started());
        assert_ne!(
            host.coordinator.game().player_symbol(),
            guest.coordinator.game().player_symbol()
        );
        assert_eq!(
            host.coordinator.store().host_progress().unwrap(),
            HostProgress::GameStarted
        );
    }

    #[test]
    fn test_local_moves_are_gated() {
        let now = Instant::now();
        let (_hub, mut host, mut guest) = connected(now);
        assert!(matches!(host.coordinator.play_at(0), Err(RoomError::NoActiveGame)));

        host.coordinator.start().unwrap();
        settle(&mut [&mut host, &mut guest], now);

        let (first, second) = if host.coordinator.game().player_symbol() == Symbol::O {
            (&mut host, &mut guest)
        } else {
            (&mut guest, &mut host)
        };
        assert!(matches!(second.coordinator.play_at(4), Err(RoomError::NotYourTurn)));
        first.coordinator.play_at(4).unwrap();
        settle(&mut [first, second], now);
        assert!(matches!(second.coordinator.play_at(4), Err(RoomError::CellOccupied(4))));
        assert!(matches!(
            second.coordinator.play_at(99),
            Err(RoomError::Game(_))
        ));
    }

    #[test]
    fn test_inconsistent_snapshot_is_dropped() {
        let now = Instant::now();
        let (_hub, mut host, _guest) = connected(now);
        let snapshot = RecoverySnapshot {
            game_mode: GameMode::Ultimate,
            seed: "abc".to_string(),
            iteration: 1,
            board: Board::new(GameMode::Regular),
            sender_symbol: Symbol::X,
            last_played_index: None,
            room_id: "host".to_string(),
        };
        host.coordinator.on_message(Message::GuestRecovery(snapshot));
        assert!(host.coordinator.game().board().is_none());
    }

    #[test]
    fn test_return_home_clears_only_stale_identity() {
        let store = ProgressStore::in_memory().unwrap();
        store.set_identity("old").unwrap();
        let hub = MemoryHub::new();
        let mut peer = Peer::new(&hub, "me", store.clone());
        assert!(peer.coordinator.return_home().unwrap());
        assert_eq!(store.identity().unwrap(), None);

        store.set_identity("old").unwrap();
        store.set_host_progress(HostProgress::GameStarted).unwrap();
        assert!(!peer.coordinator.return_home().unwrap());
        assert_eq!(store.identity().unwrap().as_deref(), Some("old"));
    }

    #[test]
    fn test_join_missing_room_replies_false() {
        let hub = MemoryHub::new();
        let mut guest = Peer::new(&hub, "guest", ProgressStore::in_memory().unwrap());
        let now = Instant::now();
        guest.pump(now);
        let (tx, mut rx) = oneshot::channel();
        guest.coordinator.join(&"nobody".into(), tx).unwrap();
        guest.pump(now);
        assert_eq!(rx.try_recv(), Ok(false));
    }
}
