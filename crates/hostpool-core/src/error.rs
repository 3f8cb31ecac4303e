//! Error type shared by the registry and the bounded pools

use std::time::Duration;

use thiserror::Error;

use crate::binding::BoxError;
use crate::key::DestinationKey;

pub type PoolResult<T> = Result<T, PoolError>;

/// Errors surfaced by `PoolRegistry` and `BoundedPool` implementations
#[derive(Debug, Error)]
pub enum PoolError {
    /// No connection factory registered for the key
    #[error("no connection factory registered for {0}")]
    FactoryMissing(DestinationKey),

    /// No connection closer registered for the key
    #[error("no connection closer registered for {0}")]
    CloserMissing(DestinationKey),

    /// `put` on a key with neither a live pool nor a binding
    #[error("connection pool not found for {0}")]
    PoolNotFound(DestinationKey),

    /// The pool builder failed; nothing was published for the key
    #[error("failed to construct pool for {key}")]
    ConstructionFailed {
        key: DestinationKey,
        #[source]
        source: Box<PoolError>,
    },

    #[error("invalid pool capacity: initial {initial} exceeds max {max}")]
    InvalidCapacity { initial: usize, max: usize },

    /// Every slot stayed busy for the whole acquire timeout
    #[error("all {max} connections busy after waiting {waited:?}")]
    MaxCapacityExceeded { max: usize, waited: Duration },

    #[error("failed to dial connection: {0}")]
    ConnectionDialFailed(#[source] BoxError),

    #[error("failed to close connection: {0}")]
    CloseFailed(#[source] BoxError),

    /// The pool was released and no longer hands out connections
    #[error("connection pool is closed")]
    PoolClosed,

    #[error("pool registry has been shut down")]
    RegistryClosed,
}

impl PoolError {
    /// True when the key had no usable factory/closer binding
    pub fn is_binding_missing(&self) -> bool {
        matches!(
            self,
            PoolError::FactoryMissing(_) | PoolError::CloserMissing(_) | PoolError::PoolNotFound(_)
        )
    }

    /// Strip a `ConstructionFailed` wrapper, returning the builder's own error
    pub fn root(&self) -> &PoolError {
        match self {
            PoolError::ConstructionFailed { source, .. } => source.root(),
            other => other,
        }
    }
}
