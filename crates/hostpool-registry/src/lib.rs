//! # Hostpool Registry
//!
//! Keeps one bounded connection pool per destination and hands out
//! connections from it.
//!
//! This crate provides:
//! - `PoolRegistry`: lazy, exactly-once-per-key pool construction
//! - `BindingTable`: per-key factory/closer registrations
//! - the expiry sweeper that retires each pool after its alive duration
//!
//! ## Usage
//!
//! ```rust,ignore
//! use hostpool_core::DestinationKey;
//! use hostpool_pool::tcp_binding;
//! use hostpool_registry::PoolRegistry;
//!
//! let registry = PoolRegistry::new();
//! let key = DestinationKey::direct("tcp", "localhost:9000");
//! registry.set_binding(key.clone(), tcp_binding(&key));
//!
//! let stream = registry.get(&key).await?;
//! // ... use the stream ...
//! registry.put(&key, stream).await?;
//! ```

pub mod bindings;
pub mod registry;
mod sweeper;

pub use bindings::BindingTable;
pub use registry::{EntryInfo, PoolRegistry, RegistryStats};

// Re-export the core vocabulary so callers need a single dependency
pub use hostpool_core::{
    closer_fn, factory_fn, BoundedPool, BoxError, Closer, DestinationKey, Factory, PoolBuilder,
    PoolConfig, PoolError, PoolSettings, ResourceBinding, SharedPool,
};
