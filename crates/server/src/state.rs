//! Shared application state.
//!
//! Cloned into every handler. The conversation store is a trait object whose
//! backend is chosen by the `sqlite` / `inmemory` feature flags.

use std::sync::Arc;

use gemproxy_core::storage::ConversationRepository;
use gemproxy_webapi::{BackendFactory, ClientPool};
use tokio::sync::broadcast;

use crate::config::Config;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Pool of signed-in Gemini clients.
    pub pool: Arc<ClientPool>,
    /// Stored conversations, used to continue Gemini chats.
    pub conversations: Arc<dyn ConversationRepository>,
    /// Shutdown signal for SSE streams and the pool monitor.
    pub shutdown_tx: broadcast::Sender<()>,
}

impl AppState {
    /// Assembles the state from an already opened store.
    pub fn build(
        config: Config,
        factory: Arc<dyn BackendFactory>,
        conversations: Arc<dyn ConversationRepository>,
    ) -> anyhow::Result<Self> {
        let pool_config = config.pool_config()?;
        let pool = Arc::new(ClientPool::new(factory, config.credentials(), pool_config));
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            config: Arc::new(config),
            pool,
            conversations,
            shutdown_tx,
        })
    }

    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Notifies every subscriber that the server is stopping.
    pub fn signal_shutdown(&self) {
        // No receivers is fine.
        let _ = self.shutdown_tx.send(());
    }
}

// ============================================================================
// Store construction per backend
// ============================================================================

#[cfg(feature = "sqlite")]
mod sqlite_store {
    use super::*;
    use crate::storage::SqliteRepository;

    impl AppState {
        /// Opens the SQLite store at `storage.path` and builds the state.
        pub async fn new(config: Config, factory: Arc<dyn BackendFactory>) -> anyhow::Result<Self> {
            let repo = SqliteRepository::new(&config.storage.path).await?;
            Self::build(config, factory, Arc::new(repo))
        }
    }
}

#[cfg(all(feature = "inmemory", not(feature = "sqlite")))]
mod inmemory_store {
    use super::*;
    use crate::storage::InMemoryRepository;

    impl AppState {
        /// Builds the state with a process-local store.
        pub async fn new(config: Config, factory: Arc<dyn BackendFactory>) -> anyhow::Result<Self> {
            Self::build(config, factory, Arc::new(InMemoryRepository::new()))
        }
    }
}
