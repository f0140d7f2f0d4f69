use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tictac")]
#[command(about = "Tic-tac-toe and ultimate tic-tac-toe between two peers")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Host a room and wait for an opponent
    ///
    /// The room id is the address this peer listens on. A host that was
    /// interrupted mid-game reuses its previous address so the guest can
    /// find it again.
    ///
    /// Examples:
    ///   tictac host
    ///   tictac host --bind 0.0.0.0:7878 --mode ultimate
    Host {
        /// Address to listen on. Defaults to the previous room or the configured address
        #[arg(short, long)]
        bind: Option<String>,
        /// Game mode for the lobby: 'regular' or 'ultimate'
        #[arg(short, long)]
        mode: Option<String>,
    },

    /// Join a room hosted by someone else
    ///
    /// Examples:
    ///   tictac join 192.168.1.20:7878
    Join {
        /// Room id (the host's address)
        room: String,
        /// Local address to listen on
        #[arg(short, long, default_value = "127.0.0.1:0")]
        bind: String,
    },

    /// Persisted identity management
    Identity {
        #[command(subcommand)]
        command: IdentityCommand,
    },

    /// Configuration file helpers
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand)]
pub enum IdentityCommand {
    /// Show the remembered identity and host progress
    Show,
    /// Forget the remembered identity
    Reset,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Print the configuration file location
    Path,
    /// Print the active configuration
    Show,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_host_and_join() {
        let cli = Cli::try_parse_from(["tictac", "host", "--mode", "ultimate"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Host { bind: None, mode: Some(ref m) } if m == "ultimate"
        ));

        let cli = Cli::try_parse_from(["tictac", "join", "10.0.0.2:7878"]).unwrap();
        match cli.command {
            Commands::Join { room, bind } => {
                assert_eq!(room, "10.0.0.2:7878");
                assert_eq!(bind, "127.0.0.1:0");
            }
            _ => panic!("expected join"),
        }
    }

    #[test]
    fn test_join_requires_room() {
        assert!(Cli::try_parse_from(["tictac", "join"]).is_err());
    }
}
