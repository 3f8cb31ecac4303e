//! Bounded pool contract
//!
//! The registry never looks inside a pool. It builds one per destination via a
//! [`PoolBuilder`] and afterwards only calls `get`, `put`, `adopt` and `release`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::binding::ResourceBinding;
use crate::config::PoolConfig;
use crate::error::PoolResult;
use crate::key::DestinationKey;

/// Shared handle to a type-erased pool
pub type SharedPool<C> = Arc<dyn BoundedPool<C>>;

/// Capacity-bounded holder of reusable connections
#[async_trait]
pub trait BoundedPool<C: Send + 'static>: Send + Sync {
    /// Hand out an idle connection, dialing or waiting as needed
    async fn get(&self) -> PoolResult<C>;

    /// Return a connection obtained from `get`
    async fn put(&self, conn: C) -> PoolResult<()>;

    /// Take in a connection this pool never handed out, such as one from an
    /// expired pool for the same destination.
    ///
    /// Pools that bound their live count should only keep it if there is
    /// room. The default treats it like a returned connection.
    async fn adopt(&self, conn: C) -> PoolResult<()> {
        self.put(conn).await
    }

    /// Close every held connection; the pool refuses further `get`s
    async fn release(&self) -> PoolResult<()>;
}

/// Everything a builder needs to construct one pool, defaults already applied
#[derive(Debug, Clone)]
pub struct PoolSettings<C> {
    pub initial_capacity: usize,
    pub max_capacity: usize,
    pub idle_timeout: Duration,
    pub acquire_timeout: Option<Duration>,
    pub binding: ResourceBinding<C>,
}

impl<C> PoolSettings<C> {
    /// Resolve a config snapshot against the defaults
    pub fn from_config(config: &PoolConfig, binding: ResourceBinding<C>) -> Self {
        Self {
            initial_capacity: config.effective_initial_capacity(),
            max_capacity: config.effective_max_capacity(),
            idle_timeout: config.effective_idle_timeout(),
            acquire_timeout: config.effective_acquire_timeout(),
            binding,
        }
    }
}

/// Constructs pools for the registry
#[async_trait]
pub trait PoolBuilder<C: Send + 'static>: Send + Sync + 'static {
    /// Build a pool for `key`. May dial seed connections.
    async fn build(
        &self,
        key: &DestinationKey,
        settings: PoolSettings<C>,
    ) -> PoolResult<SharedPool<C>>;
}
