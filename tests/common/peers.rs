use std::time::Duration;
use tictac::network::{
    MemoryHub, PeerIdentity, PeerSession, SessionConfig, SessionEvent, TransportEvent,
};
use tictac::room::{Coordinator, CoordinatorConfig};
use tictac::storage::ProgressStore;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

pub const HOST: &str = "host";
pub const GUEST: &str = "guest";

/// One coordinator on a hub, plus a tap on its session events
pub struct TestPeer {
    pub coordinator: Coordinator,
    pub transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
    pub events: mpsc::UnboundedReceiver<SessionEvent>,
}

impl TestPeer {
    pub fn register(hub: &MemoryHub, id: &str, store: ProgressStore) -> Self {
        let (transport, transport_rx) = hub.register(Some(id));
        let session = PeerSession::new(Box::new(transport), SessionConfig::default());
        let mut coordinator = Coordinator::new(session, store, CoordinatorConfig::default());
        let (_, events) = coordinator.subscribe();
        Self {
            coordinator,
            transport_rx,
            events,
        }
    }

    /// Feed queued transport events; returns whether there were any
    pub fn pump(&mut self, now: Instant) -> bool {
        let mut any = false;
        while let Ok(event) = self.transport_rx.try_recv() {
            self.coordinator.handle_transport_event(event, now);
            any = true;
        }
        any
    }

    /// Session events seen since the last call
    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    pub fn digest(&self) -> String {
        self.coordinator.game().state_digest()
    }
}

/// Pump every peer until no transport events are left in flight
pub fn settle(peers: &mut [&mut TestPeer], now: Instant) {
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

/// A host and a guest joined to the same room
pub struct Room {
    pub hub: MemoryHub,
    pub host: TestPeer,
    pub guest: TestPeer,
    pub host_store: ProgressStore,
    pub now: Instant,
}

impl Room {
    pub fn open() -> Self {
        let hub = MemoryHub::new();
        let host_store = ProgressStore::in_memory().expect("in-memory store");
        let host = TestPeer::register(&hub, HOST, host_store.clone());
        let guest = TestPeer::register(
            &hub,
            GUEST,
            ProgressStore::in_memory().expect("in-memory store"),
        );
        let mut room = Self {
            hub,
            host,
            guest,
            host_store,
            now: Instant::now(),
        };
        room.settle();
        room.host.coordinator.host().expect("host room");
        room
    }

    /// Open a room and have the guest join it
    pub fn joined() -> Self {
        let mut room = Self::open();
        assert_eq!(room.join(), Some(true));
        room.host.drain_events();
        room.guest.drain_events();
        room
    }

    /// Ask the guest to join the host and report the reply
    pub fn join(&mut self) -> Option<bool> {
        let (tx, mut rx) = oneshot::channel();
        self.guest
            .coordinator
            .join(&PeerIdentity::from(HOST), tx)
            .expect("join");
        self.settle();
        rx.try_recv().ok()
    }

    pub fn settle(&mut self) {
        settle(&mut [&mut self.host, &mut self.guest], self.now);
    }

    /// Move the clock forward and fire whatever timers are due
    pub fn advance(&mut self, by: Duration) {
        self.now += by;
        self.host.coordinator.poll_timers(self.now);
        self.guest.coordinator.poll_timers(self.now);
        self.settle();
    }

    /// Host starts a game and the guest receives it
    pub fn start(&mut self) {
        self.host.coordinator.start().expect("start");
        self.settle();
    }

    /// Peer holding `o`, who moves first
    pub fn first_mover(&mut self) -> &mut TestPeer {
        if self.host.coordinator.game().player_symbol() == tictac::Symbol::O {
            &mut self.host
        } else {
            &mut self.guest
        }
    }

    pub fn second_mover(&mut self) -> &mut TestPeer {
        if self.host.coordinator.game().player_symbol() == tictac::Symbol::O {
            &mut self.guest
        } else {
            &mut self.host
        }
    }

    /// Play a sequence of alternating moves starting with `o`
    pub fn play(&mut self, moves: &[usize]) {
        for (turn, &index) in moves.iter().enumerate() {
            let peer = if turn % 2 == 0 {
                self.first_mover()
            } else {
                self.second_mover()
            };
            peer.coordinator.play_at(index).expect("legal move");
            self.settle();
        }
    }
}
