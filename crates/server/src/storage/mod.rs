//! Conversation store backends.
//!
//! The implementations of `gemproxy_core::storage::ConversationRepository`
//! are selected at compile time via feature flags.
//!
//! # Feature Flags
//!
//! - `sqlite` (default): SQLite storage using `rusqlite` and `tokio-rusqlite`
//! - `inmemory`: process-local storage, lost on restart
//!
//! These features are mutually exclusive.
//!
//! Build with the in-memory store:
//! ```bash
//! cargo build -p gemproxy --no-default-features --features inmemory
//! ```

#[cfg(all(feature = "sqlite", feature = "inmemory"))]
compile_error!(
    "Features 'sqlite' and 'inmemory' are mutually exclusive. \
    Enable only one storage backend at a time."
);

#[cfg(not(any(feature = "sqlite", feature = "inmemory")))]
compile_error!(
    "No storage backend selected. Enable 'sqlite' or 'inmemory' feature. \
    Example: cargo build -p gemproxy --features sqlite"
);

#[cfg(feature = "sqlite")]
pub mod sqlite;

// Tests use the in-memory store whatever the backend.
#[cfg(any(test, feature = "inmemory"))]
pub mod inmemory;

#[cfg(any(test, feature = "inmemory"))]
pub use inmemory::InMemoryRepository;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteRepository;

/// Name reported by `/health`.
#[cfg(feature = "sqlite")]
pub const BACKEND_NAME: &str = "sqlite";

#[cfg(not(feature = "sqlite"))]
pub const BACKEND_NAME: &str = "inmemory";
