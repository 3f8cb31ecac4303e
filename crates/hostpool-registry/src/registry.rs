//! Pool Registry - one bounded pool per destination
//!
//! Lookups and installs go through a sharded `DashMap`; no guard is ever held
//! across an `.await`, so a slow construction for one key never stalls others.
//!
//! Construction race:
//! - every caller that misses builds its own candidate pool, lock-free
//! - the candidate is published with an atomic insert-if-absent on the key
//! - losers release their candidate in the background and use the winner
//!
//! Each published entry gets a sweeper task that retires it after its
//! alive duration, whether or not it is in use.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use hostpool_core::{
    Closer, DestinationKey, Factory, PoolBuilder, PoolConfig, PoolError, PoolResult,
    PoolSettings, ResourceBinding, SharedPool,
};
use hostpool_pool::ChannelPoolBuilder;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::bindings::BindingTable;
use crate::sweeper;

/// Registry-wide counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    /// Entries currently published
    pub live_entries: usize,
    /// Entries ever published
    pub pools_created: u64,
    /// Candidates built during a construction race and thrown away
    pub candidates_discarded: u64,
    /// Entries retired by their sweeper
    pub pools_expired: u64,
    pub construction_failures: u64,
}

/// Snapshot of one published entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EntryInfo {
    pub entry_id: u64,
    pub age: Duration,
    pub alive_duration: Duration,
}

impl EntryInfo {
    /// Time left before the sweeper retires this entry
    pub fn expires_in(&self) -> Duration {
        self.alive_duration.saturating_sub(self.age)
    }
}

#[derive(Default)]
struct Counters {
    created: AtomicU64,
    discarded: AtomicU64,
    expired: AtomicU64,
    construction_failures: AtomicU64,
}

struct PoolEntry<C: Send + 'static> {
    id: u64,
    pool: SharedPool<C>,
    created_at: Instant,
    alive_duration: Duration,
    sweeper: AbortHandle,
}

impl<C: Send + 'static> PoolEntry<C> {
    /// Past its alive duration, whether or not the sweeper has run yet
    fn is_expired(&self) -> bool {
        self.created_at.elapsed() >= self.alive_duration
    }
}

enum Install<C: Send + 'static> {
    Won(u64),
    Lost(SharedPool<C>),
    Closed,
}

pub(crate) struct RegistryInner<C: Send + 'static> {
    entries: DashMap<DestinationKey, PoolEntry<C>>,
    bindings: BindingTable<C>,
    /// Defaults for pools built from now on; snapshotted per construction
    config: RwLock<PoolConfig>,
    builder: Arc<dyn PoolBuilder<C>>,
    next_entry_id: AtomicU64,
    closed: AtomicBool,
    counters: Counters,
}

impl<C: Send + 'static> RegistryInner<C> {
    /// Sweeper callback: retire `entry_id` if it still owns `key`
    pub(crate) async fn expire(&self, key: &DestinationKey, entry_id: u64) {
        let Some(entry) = self.take_expired(key, entry_id) else {
            debug!(key = %key, entry_id, "Entry already retired before expiry");
            return;
        };
        if let Err(e) = entry.pool.release().await {
            warn!(key = %key, entry_id, error = %e, "Failed to release expired pool");
        }
    }

    /// Unpublish `entry_id` for `key`. Only one caller ever gets it back, so
    /// the pool is released exactly once.
    fn take_expired(&self, key: &DestinationKey, entry_id: u64) -> Option<PoolEntry<C>> {
        let (_, entry) = self.entries.remove_if(key, |_, entry| entry.id == entry_id)?;
        self.record_expiry(key, &entry);
        Some(entry)
    }

    fn record_expiry(&self, key: &DestinationKey, entry: &PoolEntry<C>) {
        self.counters.expired.fetch_add(1, Ordering::Relaxed);
        info!(
            key = %key,
            entry_id = entry.id,
            age_ms = entry.created_at.elapsed().as_millis() as u64,
            "Pool entry expired, releasing"
        );
    }

    /// New entry for `candidate`, with its sweeper already running
    fn publish(
        self: &Arc<Self>,
        key: &DestinationKey,
        candidate: &SharedPool<C>,
        alive: Duration,
    ) -> PoolEntry<C> {
        let id = self.next_entry_id.fetch_add(1, Ordering::Relaxed);
        PoolEntry {
            id,
            pool: Arc::clone(candidate),
            created_at: Instant::now(),
            alive_duration: alive,
            sweeper: sweeper::spawn(Arc::downgrade(self), key.clone(), id, alive),
        }
    }

    /// Live pool for `key`. An entry past its alive duration is retired on
    /// the spot instead of waiting for its sweeper.
    fn lookup(&self, key: &DestinationKey) -> Option<SharedPool<C>> {
        let entry_id = {
            let entry = self.entries.get(key)?;
            if !entry.is_expired() {
                return Some(Arc::clone(&entry.pool));
            }
            entry.id
        };

        if let Some(entry) = self.take_expired(key, entry_id) {
            entry.sweeper.abort();
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                release_in_background(&runtime, key.clone(), entry.pool, "expired on lookup");
            }
        }
        None
    }
}

impl<C: Send + 'static> Drop for RegistryInner<C> {
    fn drop(&mut self) {
        let runtime = tokio::runtime::Handle::try_current().ok();
        for (key, entry) in std::mem::take(&mut self.entries) {
            entry.sweeper.abort();
            if let Some(runtime) = &runtime {
                release_in_background(runtime, key, entry.pool, "registry dropped");
            }
        }
    }
}

fn release_in_background<C: Send + 'static>(
    runtime: &tokio::runtime::Handle,
    key: DestinationKey,
    pool: SharedPool<C>,
    reason: &'static str,
) {
    runtime.spawn(async move {
        if let Err(e) = pool.release().await {
            warn!(key = %key, reason, error = %e, "Failed to release discarded pool");
        }
    });
}

/// Per-destination pool registry
///
/// Cheap to clone; clones share the same entries and bindings.
pub struct PoolRegistry<C: Send + 'static> {
    inner: Arc<RegistryInner<C>>,
}

impl<C: Send + 'static> PoolRegistry<C> {
    /// Registry backed by `ChannelPool`s with the default configuration
    pub fn new() -> Self {
        Self::with_config(PoolConfig::default())
    }

    pub fn with_config(config: PoolConfig) -> Self {
        Self::with_builder(config, ChannelPoolBuilder)
    }

    /// Registry that constructs its pools through `builder`
    pub fn with_builder<B: PoolBuilder<C>>(config: PoolConfig, builder: B) -> Self {
        Self::with_shared_builder(config, Arc::new(builder))
    }

    pub fn with_shared_builder(config: PoolConfig, builder: Arc<dyn PoolBuilder<C>>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                entries: DashMap::new(),
                bindings: BindingTable::new(),
                config: RwLock::new(config),
                builder,
                next_entry_id: AtomicU64::new(1),
                closed: AtomicBool::new(false),
                counters: Counters::default(),
            }),
        }
    }

    // =========================================================================
    // Bindings
    // =========================================================================

    /// Register the factory and closer for `key`, replacing any previous pair.
    ///
    /// Takes effect the next time a pool is constructed for `key`; a live
    /// entry keeps the binding it was built with until it expires.
    pub fn set_func(&self, key: DestinationKey, factory: Factory<C>, closer: Closer<C>) {
        debug!(key = %key, "Registering connection binding");
        self.inner.bindings.set_func(key, factory, closer);
    }

    pub fn set_binding(&self, key: DestinationKey, binding: ResourceBinding<C>) {
        debug!(key = %key, "Registering connection binding");
        self.inner.bindings.set(key, binding);
    }

    pub fn set_factory(&self, key: DestinationKey, factory: Factory<C>) {
        self.inner.bindings.set_factory(key, factory);
    }

    pub fn set_closer(&self, key: DestinationKey, closer: Closer<C>) {
        self.inner.bindings.set_closer(key, closer);
    }

    pub fn remove_binding(&self, key: &DestinationKey) -> bool {
        self.inner.bindings.remove(key)
    }

    pub fn has_binding(&self, key: &DestinationKey) -> bool {
        self.inner.bindings.contains(key)
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    /// Current defaults for pools constructed from now on
    pub fn config(&self) -> PoolConfig {
        *self.inner.config.read()
    }

    pub fn set_config(&self, config: PoolConfig) {
        *self.inner.config.write() = config;
    }

    pub fn set_idle_timeout(&self, timeout: Duration) {
        self.inner.config.write().idle_timeout = Some(timeout);
    }

    pub fn set_alive_duration(&self, alive: Duration) {
        self.inner.config.write().alive_duration = Some(alive);
    }

    pub fn set_initial_capacity(&self, capacity: usize) {
        self.inner.config.write().initial_capacity = Some(capacity);
    }

    pub fn set_max_capacity(&self, capacity: usize) {
        self.inner.config.write().max_capacity = Some(capacity);
    }

    pub fn set_acquire_timeout(&self, timeout: Duration) {
        self.inner.config.write().acquire_timeout = Some(timeout);
    }

    // =========================================================================
    // Connections
    // =========================================================================

    /// Take a connection for `key`, constructing its pool on first use
    pub async fn get(&self, key: &DestinationKey) -> PoolResult<C> {
        self.ensure_open()?;
        let pool = self.resolve(key).await?;
        pool.get().await
    }

    /// Hand a connection back to the pool for `key`.
    ///
    /// If the entry has expired in the meantime a fresh pool is constructed,
    /// provided `key` still has a binding; otherwise this fails with
    /// `PoolNotFound`. The fresh pool adopts `conn`, so it only keeps it while
    /// under its ceiling.
    pub async fn put(&self, key: &DestinationKey, conn: C) -> PoolResult<()> {
        self.ensure_open()?;
        if let Some(pool) = self.inner.lookup(key) {
            return pool.put(conn).await;
        }
        if !self.inner.bindings.contains(key) {
            return Err(PoolError::PoolNotFound(key.clone()));
        }
        self.resolve(key).await?.adopt(conn).await
    }

    fn ensure_open(&self) -> PoolResult<()> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(PoolError::RegistryClosed);
        }
        Ok(())
    }

    async fn resolve(&self, key: &DestinationKey) -> PoolResult<SharedPool<C>> {
        if let Some(pool) = self.inner.lookup(key) {
            trace!(key = %key, "Reusing pooled destination");
            return Ok(pool);
        }

        let binding = self.inner.bindings.resolve(key)?;
        let config = self.config();
        let alive = config.effective_alive_duration();
        let settings = PoolSettings::from_config(&config, binding);

        debug!(key = %key, "No pool for destination, constructing one");
        let candidate = match self.inner.builder.build(key, settings).await {
            Ok(pool) => pool,
            Err(e) => {
                self.inner
                    .counters
                    .construction_failures
                    .fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, error = %e, "Pool construction failed");
                return Err(PoolError::ConstructionFailed {
                    key: key.clone(),
                    source: Box::new(e),
                });
            }
        };

        self.install(key, candidate, alive)
    }

    /// Publish `candidate` unless another caller got there first
    fn install(
        &self,
        key: &DestinationKey,
        candidate: SharedPool<C>,
        alive: Duration,
    ) -> PoolResult<SharedPool<C>> {
        let inner = &self.inner;
        let runtime = tokio::runtime::Handle::current();
        let outcome = match inner.entries.entry(key.clone()) {
            Entry::Occupied(existing) if !existing.get().is_expired() => {
                Install::Lost(Arc::clone(&existing.get().pool))
            }
            // Checked under the shard lock so shutdown's drain cannot miss us
            _ if inner.closed.load(Ordering::SeqCst) => Install::Closed,
            Entry::Occupied(mut existing) => {
                // Expired but not yet swept; the candidate takes its place
                let entry = inner.publish(key, &candidate, alive);
                let id = entry.id;
                let stale = existing.insert(entry);
                stale.sweeper.abort();
                inner.record_expiry(key, &stale);
                release_in_background(&runtime, key.clone(), stale.pool, "expired on install");
                Install::Won(id)
            }
            Entry::Vacant(slot) => {
                let entry = inner.publish(key, &candidate, alive);
                let id = entry.id;
                slot.insert(entry);
                Install::Won(id)
            }
        };

        match outcome {
            Install::Won(entry_id) => {
                inner.counters.created.fetch_add(1, Ordering::Relaxed);
                info!(
                    key = %key,
                    entry_id,
                    alive_secs = alive.as_secs(),
                    "Pool entry created"
                );
                Ok(candidate)
            }
            Install::Lost(winner) => {
                inner.counters.discarded.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "Lost construction race, releasing candidate pool");
                release_in_background(&runtime, key.clone(), candidate, "lost construction race");
                Ok(winner)
            }
            Install::Closed => {
                release_in_background(&runtime, key.clone(), candidate, "registry shut down");
                Err(PoolError::RegistryClosed)
            }
        }
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Whether `key` has a published entry that has not yet expired
    pub fn contains(&self, key: &DestinationKey) -> bool {
        self.inner
            .entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired())
    }

    /// Number of unexpired entries
    pub fn len(&self) -> usize {
        self.inner
            .entries
            .iter()
            .filter(|entry| !entry.is_expired())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys with an unexpired entry
    pub fn keys(&self) -> Vec<DestinationKey> {
        self.inner
            .entries
            .iter()
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn entry_info(&self, key: &DestinationKey) -> Option<EntryInfo> {
        let entry = self.inner.entries.get(key)?;
        if entry.is_expired() {
            return None;
        }
        Some(EntryInfo {
            entry_id: entry.id,
            age: entry.created_at.elapsed(),
            alive_duration: entry.alive_duration,
        })
    }

    pub fn stats(&self) -> RegistryStats {
        let counters = &self.inner.counters;
        RegistryStats {
            live_entries: self.len(),
            pools_created: counters.created.load(Ordering::Relaxed),
            candidates_discarded: counters.discarded.load(Ordering::Relaxed),
            pools_expired: counters.expired.load(Ordering::Relaxed),
            construction_failures: counters.construction_failures.load(Ordering::Relaxed),
        }
    }

    /// Release every entry and refuse further `get`/`put` calls.
    ///
    /// Returns the first release error; all of them are logged.
    pub async fn shutdown(&self) -> PoolResult<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        // Expired entries the sweeper has not reached yet are released too
        let keys: Vec<DestinationKey> = self
            .inner
            .entries
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        info!(entries = keys.len(), "Shutting down pool registry");

        let mut first_error = None;
        for key in keys {
            let Some((_, entry)) = self.inner.entries.remove(&key) else {
                continue;
            };
            entry.sweeper.abort();
            if let Err(e) = entry.pool.release().await {
                warn!(key = %key, error = %e, "Failed to release pool during shutdown");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

impl<C: Send + 'static> Clone for PoolRegistry<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Send + 'static> Default for PoolRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Send + 'static> fmt::Debug for PoolRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolRegistry")
            .field("entries", &self.inner.entries.len())
            .field("bindings", &self.inner.bindings.len())
            .field("config", &self.config())
            .finish()
    }
}
