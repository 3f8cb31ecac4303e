//! # Hostpool Core
//!
//! Shared types for the hostpool workspace.
//!
//! ## Modules
//!
//! - `key` - `DestinationKey`, the (proxy, scheme, address) identity of a pool
//! - `config` - `PoolConfig` defaults, overrides and environment lookup
//! - `binding` - per-key connection factory/closer pairs
//! - `error` - `PoolError`, the single error type surfaced to callers
//! - `pool` - the `BoundedPool` / `PoolBuilder` traits the registry consumes
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                       PoolRegistry                         │
//! │   DashMap<DestinationKey, PoolEntry>   BindingTable        │
//! │        │                                   │               │
//! │        │ build(key, PoolSettings) ◄────────┘               │
//! │        ▼                                                   │
//! │   Arc<dyn BoundedPool<C>>  (get / put / release)           │
//! └────────────────────────────────────────────────────────────┘
//! ```

pub mod binding;
pub mod config;
pub mod error;
pub mod key;
pub mod pool;

pub use binding::{closer_fn, factory_fn, BoxError, Closer, Factory, ResourceBinding};
pub use config::{
    PoolConfig, DEFAULT_ALIVE_DURATION, DEFAULT_IDLE_TIMEOUT, DEFAULT_INITIAL_CAPACITY,
    DEFAULT_MAX_CAPACITY,
};
pub use error::{PoolError, PoolResult};
pub use key::DestinationKey;
pub use pool::{BoundedPool, PoolBuilder, PoolSettings, SharedPool};
