//! # Hostpool Pool
//!
//! Concrete connection pooling for one destination.
//!
//! This crate provides:
//! - `ChannelPool`: bounded, FIFO idle queue with idle-timeout eviction
//! - `ChannelPoolBuilder`: the default `PoolBuilder` used by the registry
//! - `tcp_binding`: factory/closer pair for plain TCP destinations

pub mod channel;
pub mod tcp;

pub use channel::{ChannelPool, ChannelPoolBuilder, ChannelPoolStats};
pub use tcp::tcp_binding;
