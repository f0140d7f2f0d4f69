pub mod app;
pub mod commands;
pub mod display;
pub mod interactive;

pub use app::{App, Config};
pub use commands::{Cli, Commands, ConfigCommand, IdentityCommand};
pub use display::{format_chat_line, render_board, status_line};
pub use interactive::{parse_command, Command, Launch, Terminal};
