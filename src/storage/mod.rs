pub mod database;
pub mod errors;
pub mod progress;
pub mod schema;

// Re-export key types for easy access
pub use database::{database_path_in, get_data_dir, Database, DATA_DIR_ENV};
pub use errors::StorageError;
pub use progress::{HostProgress, ProgressStore};
