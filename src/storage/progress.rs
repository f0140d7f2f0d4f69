use crate::storage::database::Database;
use crate::storage::errors::{Result, StorageError};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub const IDENTITY_KEY: &str = "identity";
pub const HOST_PROGRESS_KEY: &str = "host-progress";

/// How far a host got before the process went away
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum HostProgress {
    #[default]
    NotStarted,
    Hosting,
    GameStarted,
}

impl HostProgress {
    pub fn as_str(&self) -> &'static str {
        match self {
            HostProgress::NotStarted => "not-started",
            HostProgress::Hosting => "hosting",
            HostProgress::GameStarted => "game-started",
        }
    }
}

impl fmt::Display for HostProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for HostProgress {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "not-started" => Ok(HostProgress::NotStarted),
            "hosting" => Ok(HostProgress::Hosting),
            "game-started" => Ok(HostProgress::GameStarted),
            other => Err(StorageError::InvalidData(format!(
                "unknown host progress '{}'",
                other
            ))),
        }
    }
}

/// Typed view over the two persisted keys
#[derive(Clone)]
pub struct ProgressStore {
    db: Arc<Database>,
}

impl ProgressStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn in_memory() -> Result<Self> {
        Ok(Self::new(Arc::new(Database::open_in_memory()?)))
    }

    pub fn identity(&self) -> Result<Option<String>> {
        Ok(self.db.get(IDENTITY_KEY)?.filter(|id| !id.is_empty()))
    }

    pub fn set_identity(&self, id: &str) -> Result<()> {
        self.db.set(IDENTITY_KEY, id)
    }

    /// Stored progress; missing means `NotStarted`
    pub fn host_progress(&self) -> Result<HostProgress> {
        match self.db.get(HOST_PROGRESS_KEY)? {
            Some(value) => value.parse(),
            None => Ok(HostProgress::NotStarted),
        }
    }

    pub fn set_host_progress(&self, progress: HostProgress) -> Result<()> {
        self.db.set(HOST_PROGRESS_KEY, progress.as_str())
    }

    /// Forget everything
    pub fn clear(&self) -> Result<()> {
        self.db.clear().map(|_| ())
    }
}
