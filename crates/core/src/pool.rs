//! Client pool policy.
//!
//! The pool shell snapshots its clients and asks these functions what to do,
//! so every eviction rule is testable without a runtime or a network.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PoolConfigError {
    #[error("Pool max size must be at least 1")]
    InvalidMaxSize,

    #[error("Pool {0} must be greater than zero")]
    InvalidTimeout(&'static str),

    #[error("Pool max retries must be at least 1")]
    InvalidRetries,
}

/// Validated pool settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_size: usize,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
    pub health_check_interval: Duration,
    pub max_retries: u32,
}

impl PoolConfig {
    pub fn new(
        max_size: usize,
        idle_timeout: Duration,
        max_lifetime: Duration,
        health_check_interval: Duration,
        max_retries: u32,
    ) -> Result<Self, PoolConfigError> {
        if max_size == 0 {
            return Err(PoolConfigError::InvalidMaxSize);
        }
        if idle_timeout.is_zero() {
            return Err(PoolConfigError::InvalidTimeout("idle timeout"));
        }
        if max_lifetime.is_zero() {
            return Err(PoolConfigError::InvalidTimeout("max lifetime"));
        }
        if health_check_interval.is_zero() {
            return Err(PoolConfigError::InvalidTimeout("health check interval"));
        }
        if max_retries == 0 {
            return Err(PoolConfigError::InvalidRetries);
        }

        Ok(Self {
            max_size,
            idle_timeout,
            max_lifetime,
            health_check_interval,
            max_retries,
        })
    }
}

impl Default for PoolConfig {
    /// 3 clients, 15 minute idle timeout, 30 minute lifetime, checked every minute.
    fn default() -> Self {
        Self {
            max_size: 3,
            idle_timeout: Duration::from_secs(900),
            max_lifetime: Duration::from_secs(1800),
            health_check_interval: Duration::from_secs(60),
            max_retries: 3,
        }
    }
}

/// Point-in-time view of one pooled client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSnapshot {
    pub id: String,
    pub credential_id: String,
    pub running: bool,
    /// Time since the client was created.
    pub age: Duration,
    /// Time since the client was last handed out.
    pub idle: Duration,
}

/// What `acquire` should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolDecision {
    /// Hand out this existing client.
    Reuse(String),
    /// Create a new client; there is room.
    Create,
    /// Close this client, then create a new one.
    Replace(String),
    /// Every slot is taken by a client still being created.
    Wait,
}

/// Chooses how to satisfy an acquire.
///
/// A running client younger than `max_lifetime` is reused, most recently
/// used first. When `credential_id` is given only clients signed in with
/// that credential are reused. Otherwise a client is created while below
/// `max_size`, or the least recently used client is replaced. `pending`
/// counts clients being created outside the lock; they hold a slot too.
pub fn select(
    clients: &[ClientSnapshot],
    pending: usize,
    credential_id: Option<&str>,
    config: &PoolConfig,
) -> PoolDecision {
    let reusable = clients
        .iter()
        .filter(|c| c.running && c.age < config.max_lifetime)
        .filter(|c| credential_id.is_none_or(|id| c.credential_id == id))
        .min_by_key(|c| c.idle);

    if let Some(client) = reusable {
        return PoolDecision::Reuse(client.id.clone());
    }

    if clients.len() + pending < config.max_size {
        return PoolDecision::Create;
    }

    match clients.iter().max_by_key(|c| c.idle) {
        Some(oldest) => PoolDecision::Replace(oldest.id.clone()),
        None => PoolDecision::Wait,
    }
}

/// Ids of clients the health monitor should evict.
pub fn sweep_candidates(clients: &[ClientSnapshot], config: &PoolConfig) -> Vec<String> {
    clients
        .iter()
        .filter(|c| !c.running || c.idle > config.idle_timeout || c.age > config.max_lifetime)
        .map(|c| c.id.clone())
        .collect()
}
