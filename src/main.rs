use anyhow::Result;
use clap::Parser;
use tictac::cli::{App, Cli, Commands, Config, ConfigCommand, IdentityCommand};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so the board on stdout stays readable
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config {
            command: ConfigCommand::Path,
        } => {
            println!("{}", Config::default_config_file()?.display());
        }
        Commands::Config {
            command: ConfigCommand::Show,
        } => App::new()?.handle_config_show()?,
        Commands::Identity { command } => {
            let app = App::new()?;
            match command {
                IdentityCommand::Show => app.handle_identity_show()?,
                IdentityCommand::Reset => app.handle_identity_reset()?,
            }
        }
        Commands::Host { bind, mode } => App::new()?.handle_host(bind, mode).await?,
        Commands::Join { room, bind } => App::new()?.handle_join(room, bind).await?,
    }

    Ok(())
}
