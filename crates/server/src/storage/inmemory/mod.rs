//! In-memory conversation store.
//!
//! Records live in a `HashMap` behind `Arc<RwLock<_>>` and are lost when the
//! process exits.

mod repository;

pub use repository::InMemoryRepository;
