use crate::cli::interactive::{Launch, Terminal};
use crate::game::GameMode;
use crate::network::{PeerSession, SessionConfig, TcpTransport, WireConfig};
use crate::room::{Coordinator, CoordinatorConfig};
use crate::storage::{Database, HostProgress, ProgressStore, DATA_DIR_ENV};
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Data directory for the SQLite store
    pub data_dir: PathBuf,
    /// Address a host listens on when none is given
    pub default_bind_addr: String,
    /// Delay between the transport opening and the session reporting ready
    pub ready_settle_ms: u64,
    /// Delay between rejoin attempts after losing the host
    pub retry_interval_ms: u64,
    /// Delay before a host offers its game to a reconnected guest
    pub host_recovery_delay_ms: u64,
    /// Largest accepted message, in bytes
    pub max_message_size: usize,
    /// How long a connecting peer has to introduce itself
    pub handshake_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = Self::default_data_dir().unwrap_or_else(|_| PathBuf::from("."));
        let session = SessionConfig::default();
        let room = CoordinatorConfig::default();
        let wire = WireConfig::default();
        Self {
            data_dir,
            default_bind_addr: "127.0.0.1:7878".to_string(),
            ready_settle_ms: session.ready_settle.as_millis() as u64,
            retry_interval_ms: room.retry_interval.as_millis() as u64,
            host_recovery_delay_ms: room.host_recovery_delay.as_millis() as u64,
            max_message_size: wire.max_message_size,
            handshake_timeout_ms: wire.handshake_timeout.as_millis() as u64,
        }
    }
}

impl Config {
    /// Get the default data directory
    pub fn default_data_dir() -> Result<PathBuf> {
        crate::storage::get_data_dir().context("Could not determine data directory")
    }

    /// Get the default config directory
    pub fn default_config_dir() -> Result<PathBuf> {
        ProjectDirs::from("dev", "tictac", "tictac")
            .map(|proj_dirs| proj_dirs.config_dir().to_path_buf())
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))
    }

    /// Get the default config file path
    pub fn default_config_file() -> Result<PathBuf> {
        Ok(Self::default_config_dir()?.join("config.toml"))
    }

    /// Load configuration from file, creating default if it doesn't exist
    pub fn load_or_create_default() -> Result<Self> {
        Self::load_or_create(&Self::default_config_file()?)
    }

    pub fn load_or_create(config_file: &Path) -> Result<Self> {
        let mut config = if config_file.exists() {
            let content = std::fs::read_to_string(config_file)
                .context("Failed to read configuration file")?;
            toml::from_str(&content).context("Failed to parse configuration file")?
        } else {
            let config = Config::default();
            config.save_to(config_file)?;
            config
        };
        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            config.data_dir = PathBuf::from(dir);
        }
        Ok(config)
    }

    pub fn save_to(&self, config_file: &Path) -> Result<()> {
        if let Some(parent) = config_file.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;
        std::fs::write(config_file, content).context("Failed to write configuration file")?;
        Ok(())
    }

    /// Get the database path
    pub fn database_path(&self) -> PathBuf {
        crate::storage::database_path_in(&self.data_dir)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            ready_settle: Duration::from_millis(self.ready_settle_ms),
            max_payload_size: self.max_message_size,
        }
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            retry_interval: Duration::from_millis(self.retry_interval_ms),
            host_recovery_delay: Duration::from_millis(self.host_recovery_delay_ms),
        }
    }

    pub fn wire_config(&self) -> WireConfig {
        WireConfig {
            max_message_size: self.max_message_size,
            handshake_timeout: Duration::from_millis(self.handshake_timeout_ms),
            ..WireConfig::default()
        }
    }
}

/// Main application state
pub struct App {
    pub config: Config,
    pub store: ProgressStore,
}

impl App {
    pub fn new() -> Result<Self> {
        let config =
            Config::load_or_create_default().context("Failed to initialize configuration")?;
        Self::with_config(config)
    }

    pub fn with_config(config: Config) -> Result<Self> {
        Self::ensure_data_dir(&config.data_dir).context("Failed to create data directory")?;
        let database = Database::open(&config.database_path())
            .context("Failed to initialize database")?;
        Ok(App {
            store: ProgressStore::new(Arc::new(database)),
            config,
        })
    }

    /// Ensure data directory exists and is writable
    pub fn ensure_data_dir(data_dir: &Path) -> Result<()> {
        if !data_dir.exists() {
            std::fs::create_dir_all(data_dir).with_context(|| {
                format!("Failed to create data directory: {}", data_dir.display())
            })?;
        }

        let test_file = data_dir.join(".write_test");
        std::fs::write(&test_file, "test")
            .with_context(|| format!("Data directory is not writable: {}", data_dir.display()))?;
        std::fs::remove_file(&test_file).context("Failed to clean up write test file")?;
        Ok(())
    }

    /// Address to host on: explicit, else the interrupted room, else the default
    pub fn host_bind_addr(&self, bind: Option<String>) -> Result<String> {
        if let Some(bind) = bind {
            return Ok(bind);
        }
        let progress = self.store.host_progress()?;
        match self.store.identity()? {
            Some(previous) if progress != HostProgress::NotStarted => {
                info!(%previous, %progress, "Reusing previous room address");
                Ok(previous)
            }
            _ => Ok(self.config.default_bind_addr.clone()),
        }
    }

    pub async fn handle_host(&self, bind: Option<String>, mode: Option<String>) -> Result<()> {
        let mode = mode
            .map(|m| m.parse::<GameMode>())
            .transpose()
            .context("Invalid game mode")?;
        let bind = self.host_bind_addr(bind)?;
        self.run(&bind, Launch::Host { mode }).await
    }

    pub async fn handle_join(&self, room: String, bind: String) -> Result<()> {
        self.run(&bind, Launch::Join { room: room.into() }).await
    }

    async fn run(&self, bind: &str, launch: Launch) -> Result<()> {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = TcpTransport::bind(bind, self.config.wire_config(), tx)
            .await
            .with_context(|| format!("Failed to listen on {}", bind))?;
        let session = PeerSession::new(Box::new(transport), self.config.session_config());
        let coordinator = Coordinator::new(
            session,
            self.store.clone(),
            self.config.coordinator_config(),
        );
        Terminal::new(coordinator, rx, launch).run().await
    }

    pub fn handle_identity_show(&self) -> Result<()> {
        match self.store.identity()? {
            Some(id) => println!("Identity: {}", id),
            None => println!("No identity remembered"),
        }
        println!("Host progress: {}", self.store.host_progress()?);
        Ok(())
    }

    pub fn handle_identity_reset(&self) -> Result<()> {
        self.store.clear()?;
        println!("Forgot the remembered identity");
        Ok(())
    }

    pub fn handle_config_show(&self) -> Result<()> {
        let content =
            toml::to_string_pretty(&self.config).context("Failed to serialize configuration")?;
        print!("{}", content);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_config(dir: &TempDir) -> Config {
        Config {
            data_dir: dir.path().join("data"),
            ..Config::default()
        }
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.default_bind_addr, "127.0.0.1:7878");
        assert_eq!(config.retry_interval_ms, 3000);
        assert_eq!(config.host_recovery_delay_ms, 500);
        assert_eq!(config.coordinator_config().retry_interval, Duration::from_secs(3));
    }

    #[test]
    fn test_config_roundtrip_and_partial_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("config.toml");
        let mut config = temp_config(&dir);
        config.retry_interval_ms = 100;
        config.save_to(&file).unwrap();
        let loaded: Config = toml::from_str(&std::fs::read_to_string(&file).unwrap()).unwrap();
        assert_eq!(loaded, config);

        let partial: Config = toml::from_str("default_bind_addr = \"0.0.0.0:9000\"").unwrap();
        assert_eq!(partial.default_bind_addr, "0.0.0.0:9000");
        assert_eq!(partial.ready_settle_ms, 1000);
    }

    #[test]
    fn test_ensure_data_dir() {
        let temp_dir = TempDir::new().unwrap();
        let data_dir = temp_dir.path().join("tictac_data");
        assert!(!data_dir.exists());
        App::ensure_data_dir(&data_dir).unwrap();
        assert!(data_dir.exists());
        App::ensure_data_dir(&data_dir).unwrap();
    }

    #[test]
    fn test_host_bind_addr_reuses_interrupted_room() {
        let dir = TempDir::new().unwrap();
        let app = App::with_config(temp_config(&dir)).unwrap();
        assert_eq!(app.host_bind_addr(None).unwrap(), "127.0.0.1:7878");
        assert_eq!(app.host_bind_addr(Some("1.2.3.4:5".into())).unwrap(), "1.2.3.4:5");

        app.store.set_identity("127.0.0.1:9999").unwrap();
        assert_eq!(app.host_bind_addr(None).unwrap(), "127.0.0.1:7878");
        app.store.set_host_progress(HostProgress::GameStarted).unwrap();
        assert_eq!(app.host_bind_addr(None).unwrap(), "127.0.0.1:9999");
    }
}
