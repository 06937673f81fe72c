//! Bounded pool of signed-in Gemini clients.
//!
//! Clients are created lazily, reused while healthy and evicted when idle,
//! stopped or past their lifetime. The eviction rules live in
//! `gemproxy_core::pool`; this module only keeps the clock and the map.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use gemproxy_core::gemini::GeminiError;
use gemproxy_core::pool::{select, sweep_candidates, ClientSnapshot, PoolConfig, PoolDecision};
use serde::Serialize;
use tokio::sync::{broadcast, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::backend::{BackendFactory, ChatBackend, Credential};
use crate::error::{map_factory_error, Result};

/// A pool slot held while a client signs in; released on drop.
struct Slot<'a> {
    pool: &'a ClientPool,
}

impl Drop for Slot<'_> {
    fn drop(&mut self) {
        self.pool.pending.fetch_sub(1, Ordering::SeqCst);
        self.pool.slot_freed.notify_waiters();
    }
}

struct PooledClient {
    backend: Arc<dyn ChatBackend>,
    credential_id: String,
    created_at: Instant,
    last_used: Instant,
}

/// A client handed out by [`ClientPool::acquire`].
#[derive(Clone)]
pub struct Lease {
    pub id: String,
    pub credential_id: String,
    pub backend: Arc<dyn ChatBackend>,
}

/// Pool counters reported by `/health`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub total: usize,
    pub healthy: usize,
    pub max_size: usize,
}

pub struct ClientPool {
    factory: Arc<dyn BackendFactory>,
    credentials: Vec<Credential>,
    config: PoolConfig,
    clients: Mutex<HashMap<String, PooledClient>>,
    /// Clients being signed in outside the lock.
    pending: AtomicUsize,
    slot_freed: Notify,
    next_credential: AtomicUsize,
    next_id: AtomicU64,
}

impl ClientPool {
    pub fn new(
        factory: Arc<dyn BackendFactory>,
        credentials: Vec<Credential>,
        config: PoolConfig,
    ) -> Self {
        Self {
            factory,
            credentials,
            config,
            clients: Mutex::new(HashMap::new()),
            pending: AtomicUsize::new(0),
            slot_freed: Notify::new(),
            next_credential: AtomicUsize::new(0),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Ids of every configured credential, in configuration order.
    pub fn credential_ids(&self) -> Vec<String> {
        self.credentials.iter().map(|c| c.id.clone()).collect()
    }

    fn snapshots(clients: &HashMap<String, PooledClient>, now: Instant) -> Vec<ClientSnapshot> {
        clients
            .iter()
            .map(|(id, c)| ClientSnapshot {
                id: id.clone(),
                credential_id: c.credential_id.clone(),
                running: c.backend.is_running(),
                age: now.duration_since(c.created_at),
                idle: now.duration_since(c.last_used),
            })
            .collect()
    }

    fn pick_credential(&self, credential_id: Option<&str>) -> Result<Credential> {
        if let Some(id) = credential_id {
            return self
                .credentials
                .iter()
                .find(|c| c.id == id)
                .cloned()
                .ok_or_else(|| GeminiError::Auth(format!("Unknown credential: {id}")));
        }

        if self.credentials.is_empty() {
            return Err(GeminiError::Auth(
                "No Gemini credentials configured. Set SECURE_1PSID or gemini.clients."
                    .to_string(),
            ));
        }

        let index = self.next_credential.fetch_add(1, Ordering::Relaxed) % self.credentials.len();
        Ok(self.credentials[index].clone())
    }

    /// Hands out a healthy client, creating or replacing one when needed.
    ///
    /// With `credential_id` the client must be signed in with that
    /// credential. A slot is reserved under the lock and the client is
    /// signed in after releasing it, so `max_size` holds while `stats` and
    /// reusing acquires never wait on the network.
    pub async fn acquire(&self, credential_id: Option<&str>) -> Result<Lease> {
        let (credential, _slot) = loop {
            let slot_freed = self.slot_freed.notified();
            let reserved = {
                let mut clients = self.clients.lock().await;
                let now = Instant::now();
                let pending = self.pending.load(Ordering::SeqCst);

                match select(&Self::snapshots(&clients, now), pending, credential_id, &self.config) {
                    PoolDecision::Reuse(id) => {
                        if let Some(client) = clients.get_mut(&id) {
                            client.last_used = now;
                            tracing::debug!(client = %id, "Reusing pooled client");
                            return Ok(Lease {
                                id,
                                credential_id: client.credential_id.clone(),
                                backend: Arc::clone(&client.backend),
                            });
                        }
                        continue;
                    }
                    PoolDecision::Wait => None,
                    PoolDecision::Create => {
                        let credential = self.pick_credential(credential_id)?;
                        Some((credential, self.reserve(), None))
                    }
                    PoolDecision::Replace(id) => {
                        let credential = self.pick_credential(credential_id)?;
                        let old = clients.remove(&id).map(|old| (id, old));
                        Some((credential, self.reserve(), old))
                    }
                }
            };

            match reserved {
                Some((credential, slot, old)) => {
                    if let Some((id, old)) = old {
                        tracing::info!(client = %id, "Pool full, replacing least recently used client");
                        old.backend.close().await;
                    }
                    break (credential, slot);
                }
                None => {
                    tracing::debug!("Pool slots all signing in, waiting");
                    slot_freed.await;
                }
            }
        };

        let backend = self
            .factory
            .create(&credential)
            .await
            .map_err(|e| {
                tracing::error!(credential = %credential.id, error = %e, "Failed to create Gemini client");
                map_factory_error(e)
            })?;

        let id = format!("client_{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        let now = Instant::now();
        let mut clients = self.clients.lock().await;
        clients.insert(
            id.clone(),
            PooledClient {
                backend: Arc::clone(&backend),
                credential_id: credential.id.clone(),
                created_at: now,
                last_used: now,
            },
        );

        tracing::info!(client = %id, credential = %credential.id, size = clients.len(), "Created Gemini client");

        Ok(Lease {
            id,
            credential_id: credential.id,
            backend,
        })
    }

    fn reserve(&self) -> Slot<'_> {
        self.pending.fetch_add(1, Ordering::SeqCst);
        Slot { pool: self }
    }

    /// Closes and removes a client. Unknown ids are ignored.
    pub async fn evict(&self, id: &str) {
        let removed = self.clients.lock().await.remove(id);
        if let Some(client) = removed {
            client.backend.close().await;
            tracing::info!(client = %id, "Evicted Gemini client");
        }
    }

    /// Evicts clients that are idle, stopped or too old. Returns how many.
    pub async fn sweep(&self) -> usize {
        let stale: Vec<PooledClient> = {
            let mut clients = self.clients.lock().await;
            let ids = sweep_candidates(&Self::snapshots(&clients, Instant::now()), &self.config);
            ids.iter().filter_map(|id| clients.remove(id)).collect()
        };

        for client in &stale {
            client.backend.close().await;
        }

        if !stale.is_empty() {
            tracing::info!(evicted = stale.len(), "Swept stale Gemini clients");
        }
        stale.len()
    }

    /// Runs [`sweep`](Self::sweep) every health check interval until shutdown.
    pub fn spawn_monitor(self: &Arc<Self>, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        let pool = Arc::clone(self);
        let interval = self.config.health_check_interval;

        tokio::spawn(async move {
            tracing::info!(interval_secs = interval.as_secs(), "Client health monitor started");
            loop {
                tokio::select! {
                    _ = shutdown.recv() => break,
                    _ = tokio::time::sleep(interval) => {
                        pool.sweep().await;
                    }
                }
            }
            tracing::info!("Client health monitor stopped");
        })
    }

    /// Closes every client.
    pub async fn close_all(&self) {
        let drained: Vec<(String, PooledClient)> = self.clients.lock().await.drain().collect();
        for (id, client) in drained {
            client.backend.close().await;
            tracing::debug!(client = %id, "Closed Gemini client");
        }
    }

    pub async fn stats(&self) -> PoolStats {
        let clients = self.clients.lock().await;
        PoolStats {
            total: clients.len(),
            healthy: clients.values().filter(|c| c.backend.is_running()).count(),
            max_size: self.config.max_size,
        }
    }
}
