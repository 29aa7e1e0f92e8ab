//! Database module
//!
//! Models, the storage interface, and its Postgres and in-memory backends.

pub mod memory;
pub mod models;
pub mod operations;
pub mod store;

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub use memory::MemoryStore;
pub use models::{Message, Session, Tier, User, WindowState};
pub use operations::DbOperations;
pub use store::{MessageStore, SessionStore, Store, StoreResult, UsageStore, UserStore};

use crate::config::DatabaseConfig;
use crate::error::DatabaseError;

const MEMORY_URL_SCHEME: &str = "memory://";

/// Opens the backend named by `database.url`, running migrations for Postgres.
pub async fn connect(config: &DatabaseConfig) -> Result<Arc<dyn Store>, DatabaseError> {
    if config.url.starts_with(MEMORY_URL_SCHEME) {
        warn!("Using in-memory store; data will not survive a restart");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let db = DbOperations::new_with_options(
        &config.url,
        config.max_connections,
        Duration::from_secs(config.acquire_timeout_secs),
    )
    .await?;
    db.migrate().await?;
    info!(max_connections = config.max_connections, "Connected to Postgres");

    Ok(Arc::new(db))
}
