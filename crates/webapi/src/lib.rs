//! Gemini web client - Imperative Shell.
//!
//! This crate performs the network I/O around the pure protocol functions in
//! `gemproxy_core::gemini`, and keeps a bounded pool of signed-in clients.
//!
//! # Architecture
//!
//! - **Functional Core** (`gemproxy_core`): payload encoding, response
//!   parsing, pool policy
//! - **Imperative Shell** (this crate): reqwest transport, cookie refresh,
//!   client lifetimes
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use gemproxy_webapi::{ClientPool, Credential, WebClientConfig, WebClientFactory};
//!
//! let factory = Arc::new(WebClientFactory::new(WebClientConfig::default()));
//! let pool = Arc::new(ClientPool::new(factory, credentials, PoolConfig::default()));
//!
//! let lease = pool.acquire(None).await?;
//! let output = lease.backend.generate("Hello", &[], GeminiModel::Gemini25Flash, None).await?;
//! ```

mod backend;
mod client;
mod error;
mod pool;

pub use gemproxy_core::gemini::GeminiError;
pub use gemproxy_core::pool::PoolConfig;

pub use backend::{redact, BackendFactory, ChatBackend, Credential};
pub use client::{WebClient, WebClientConfig, WebClientFactory};
pub use error::{map_factory_error, Result};
pub use pool::{ClientPool, Lease, PoolStats};
