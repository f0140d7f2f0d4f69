use crate::cli::display::{format_chat_line, render_board, status_line};
use crate::game::GameMode;
use crate::network::{PeerIdentity, SessionEvent, TransportEvent};
use crate::room::Coordinator;
use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info};

pub const HELP: &str = "\
Commands:
  start              start the game (host)
  again              start a new game with a fresh seed (host)
  lobby              return both players to the lobby (host)
  play <n>           play cell n
  mode <m>           switch to 'regular' or 'ultimate'
  say <text>         chat with your opponent
  board              show the board
  status             show the game status
  cancel             stop trying to reconnect to the host
  help               show this help
  quit               leave";

/// A line typed at the prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Again,
    Lobby,
    Play(usize),
    Mode(GameMode),
    Say(String),
    Board,
    Status,
    Cancel,
    Help,
    Quit,
}

pub fn parse_command(line: &str) -> Result<Command, String> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    match word.to_lowercase().as_str() {
        "start" => Ok(Command::Start),
        "again" => Ok(Command::Again),
        "lobby" => Ok(Command::Lobby),
        "play" | "p" => rest
            .parse::<usize>()
            .map(Command::Play)
            .map_err(|_| format!("Not a cell number: '{}'", rest)),
        "mode" => rest
            .parse::<GameMode>()
            .map(Command::Mode)
            .map_err(|e| e.to_string()),
        "say" if !rest.is_empty() => Ok(Command::Say(rest.to_string())),
        "say" => Err("Nothing to say".to_string()),
        "board" | "b" => Ok(Command::Board),
        "status" => Ok(Command::Status),
        "cancel" => Ok(Command::Cancel),
        "help" | "?" => Ok(Command::Help),
        "quit" | "exit" | "q" => Ok(Command::Quit),
        "" => Err(String::new()),
        other => Err(format!("Unknown command '{}', type 'help'", other)),
    }
}

/// What to do once the session is ready
pub enum Launch {
    Host { mode: Option<GameMode> },
    Join { room: PeerIdentity },
}

/// Interactive terminal front end over one [`Coordinator`]
pub struct Terminal {
    coordinator: Coordinator,
    transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
    session_rx: mpsc::UnboundedReceiver<SessionEvent>,
    launch: Option<Launch>,
    join_rx: Option<oneshot::Receiver<bool>>,
    chat_seen: usize,
}

impl Terminal {
    pub fn new(
        mut coordinator: Coordinator,
        transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
        launch: Launch,
    ) -> Self {
        let (_, session_rx) = coordinator.subscribe();
        Self {
            coordinator,
            transport_rx,
            session_rx,
            launch: Some(launch),
            join_rx: None,
            chat_seen: 0,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        println!("Connecting... (type 'help' for commands)");

        loop {
            let deadline = self.coordinator.next_deadline();
            tokio::select! {
                Some(event) = self.transport_rx.recv() => {
                    self.coordinator.handle_transport_event(event, Instant::now());
                }
                Some(event) = self.session_rx.recv() => {
                    if !self.on_session_event(event)? {
                        break;
                    }
                }
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.coordinator.poll_timers(Instant::now());
                }
                line = lines.next_line() => match line? {
                    Some(line) => {
                        if !self.execute(&line) {
                            break;
                        }
                    }
                    None => break,
                },
                _ = tokio::signal::ctrl_c() => {
                    println!();
                    break;
                }
            }
            self.check_join();
            self.print_new_chat();
        }

        info!("Leaving");
        self.coordinator.dispose();
        Ok(())
    }

    /// Returns `false` when the session cannot continue
    fn on_session_event(&mut self, event: SessionEvent) -> Result<bool> {
        match event {
            SessionEvent::Ready => match self.launch.take() {
                Some(Launch::Host { mode }) => {
                    if let Some(mode) = mode {
                        self.coordinator.set_mode(mode);
                    }
                    let id = self.coordinator.host()?;
                    println!("Hosting room {}", id);
                    println!("Your opponent can join with: tictac join {}", id);
                }
                Some(Launch::Join { room }) => {
                    let (tx, rx) = oneshot::channel();
                    self.coordinator.join(&room, tx)?;
                    self.join_rx = Some(rx);
                    println!("Joining room {}...", room);
                }
                None => {}
            },
            SessionEvent::GameJoined(_) if self.coordinator.session().is_host() => {
                println!("An opponent joined. Type 'start' to begin.");
            }
            SessionEvent::Error(record) if record.is_fatal => {
                println!("Fatal network error: {} ({})", record.description, record.cause);
                return Ok(false);
            }
            other => debug!(?other, "Session event"),
        }
        Ok(true)
    }

    fn check_join(&mut self) {
        let Some(rx) = self.join_rx.as_mut() else {
            return;
        };
        match rx.try_recv() {
            Ok(true) => {
                println!("Joined. Waiting for the host to start.");
                self.join_rx = None;
            }
            Ok(false) => {
                println!("Could not join the room.");
                self.join_rx = None;
            }
            Err(oneshot::error::TryRecvError::Empty) => {}
            Err(oneshot::error::TryRecvError::Closed) => self.join_rx = None,
        }
    }

    fn print_new_chat(&mut self) {
        let chat = self.coordinator.game().chat();
        if chat.len() <= self.chat_seen {
            return;
        }
        for message in &chat[self.chat_seen..] {
            println!("{}", format_chat_line(message));
        }
        self.chat_seen = chat.len();
        if let Some(board) = self.coordinator.game().board() {
            println!("{}", render_board(board));
            println!("{}", status_line(self.coordinator.game()));
        }
    }

    /// Returns `false` on quit
    fn execute(&mut self, line: &str) -> bool {
        let command = match parse_command(line) {
            Ok(command) => command,
            Err(message) => {
                if !message.is_empty() {
                    println!("{}", message);
                }
                return true;
            }
        };

        let result = match command {
            Command::Start => self.coordinator.start(),
            Command::Again => self.coordinator.play_again(),
            Command::Lobby => self.coordinator.back_to_lobby(),
            Command::Play(index) => self.coordinator.play_at(index),
            Command::Mode(mode) => {
                self.coordinator.set_mode(mode);
                println!("Mode: {}", self.coordinator.game().mode());
                Ok(())
            }
            Command::Say(text) => {
                self.coordinator.send_chat(&text);
                Ok(())
            }
            Command::Board => {
                match self.coordinator.game().board() {
                    Some(board) => println!("{}", render_board(board)),
                    None => println!("No game in progress"),
                }
                Ok(())
            }
            Command::Status => {
                println!("{}", status_line(self.coordinator.game()));
                if self.coordinator.is_recovering() {
                    println!(
                        "Reconnecting to the host ({} attempts so far)",
                        self.coordinator.recovery_attempts()
                    );
                }
                Ok(())
            }
            Command::Cancel => {
                self.coordinator.cancel_recovery();
                Ok(())
            }
            Command::Help => {
                println!("{}", HELP);
                Ok(())
            }
            Command::Quit => return false,
        };

        if let Err(e) = result {
            println!("{}", e);
        }
        true
    }
}
