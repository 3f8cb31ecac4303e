//! Channel Pool - bounded connection pool for a single destination
//!
//! Idle connections sit in a FIFO queue. `get` hands out the oldest idle
//! connection that is still within the idle timeout, dials a new one while the
//! live count is below `max_capacity`, and otherwise waits for a `put`.
//!
//! Live connections are `idle + checked_out`, never more than `max_capacity`:
//! - a slot is reserved before dialing and returned if the dial fails or the
//!   caller is cancelled mid-dial
//! - `put` settles one checkout; with nothing checked out the connection is
//!   treated as adopted
//! - `adopt` takes a connection this pool never handed out (one from an
//!   expired predecessor) only if there is room, and closes it otherwise

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hostpool_core::{
    BoundedPool, BoxError, DestinationKey, PoolBuilder, PoolError, PoolSettings,
    ResourceBinding, SharedPool,
};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

struct IdleConn<C> {
    conn: C,
    since: Instant,
}

impl<C> IdleConn<C> {
    fn new(conn: C) -> Self {
        Self {
            conn,
            since: Instant::now(),
        }
    }
}

struct PoolState<C> {
    idle: VecDeque<IdleConn<C>>,
    /// Handed out by `get` (or reserved for a dial) and not yet returned
    checked_out: usize,
    closed: bool,
}

/// Point-in-time view of a channel pool
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelPoolStats {
    pub idle: usize,
    pub live: usize,
    pub closed: bool,
}

enum Checkout<C> {
    Ready(C),
    Dial,
    Wait,
}

/// Bounded pool of connections to one destination
pub struct ChannelPool<C> {
    key: DestinationKey,
    max_capacity: usize,
    idle_timeout: Duration,
    acquire_timeout: Option<Duration>,
    binding: ResourceBinding<C>,
    state: Mutex<PoolState<C>>,
    /// Signalled when a connection is returned, a slot frees up or the pool closes
    available: Notify,
}

/// Reserved live slot; handed back on drop unless the dial succeeded
struct Reservation<'a, C> {
    pool: &'a ChannelPool<C>,
    armed: bool,
}

impl<C> Reservation<'_, C> {
    fn keep(mut self) {
        self.armed = false;
    }
}

impl<C> Drop for Reservation<'_, C> {
    fn drop(&mut self) {
        if self.armed {
            self.pool.free_slot();
        }
    }
}

impl<C> ChannelPool<C> {
    fn free_slot(&self) {
        {
            let mut state = self.state.lock();
            state.checked_out = state.checked_out.saturating_sub(1);
        }
        self.available.notify_one();
    }
}

impl<C: Send + 'static> ChannelPool<C> {
    /// Build a pool and dial `initial_capacity` connections up front.
    ///
    /// If any seed dial fails, the connections already opened are closed and
    /// the dial error is returned.
    pub async fn new(key: DestinationKey, settings: PoolSettings<C>) -> Result<Self, PoolError> {
        let PoolSettings {
            initial_capacity,
            max_capacity,
            idle_timeout,
            acquire_timeout,
            binding,
        } = settings;

        if max_capacity == 0 || initial_capacity > max_capacity {
            return Err(PoolError::InvalidCapacity {
                initial: initial_capacity,
                max: max_capacity,
            });
        }

        let pool = Self {
            key,
            max_capacity,
            idle_timeout,
            acquire_timeout,
            binding,
            state: Mutex::new(PoolState {
                idle: VecDeque::with_capacity(max_capacity),
                checked_out: 0,
                closed: false,
            }),
            available: Notify::new(),
        };

        for _ in 0..initial_capacity {
            match pool.binding.dial().await {
                Ok(conn) => {
                    pool.state.lock().idle.push_back(IdleConn::new(conn));
                }
                Err(e) => {
                    if let Err(close_err) = pool.drain().await {
                        warn!(
                            key = %pool.key,
                            error = %close_err,
                            "Failed to close seed connections after dial error"
                        );
                    }
                    return Err(PoolError::ConnectionDialFailed(e));
                }
            }
        }

        debug!(
            key = %pool.key,
            seeded = initial_capacity,
            max = max_capacity,
            "Channel pool ready"
        );
        Ok(pool)
    }

    pub fn stats(&self) -> ChannelPoolStats {
        let state = self.state.lock();
        ChannelPoolStats {
            idle: state.idle.len(),
            live: state.idle.len() + state.checked_out,
            closed: state.closed,
        }
    }

    /// Decide what `get` does next. Stale idle connections are handed back for
    /// closing outside the lock.
    fn checkout(&self) -> Result<(Checkout<C>, Vec<C>), PoolError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(PoolError::PoolClosed);
        }

        let mut stale = Vec::new();
        while let Some(idle) = state.idle.pop_front() {
            if idle.since.elapsed() > self.idle_timeout {
                stale.push(idle.conn);
                continue;
            }
            state.checked_out += 1;
            return Ok((Checkout::Ready(idle.conn), stale));
        }

        if state.checked_out < self.max_capacity {
            state.checked_out += 1;
            return Ok((Checkout::Dial, stale));
        }
        Ok((Checkout::Wait, stale))
    }

    async fn close_each(&self, conns: Vec<C>, reason: &'static str) -> Option<BoxError> {
        let mut first_error = None;
        for conn in conns {
            if let Err(e) = self.binding.close(conn).await {
                warn!(key = %self.key, error = %e, reason, "Failed to close pooled connection");
                first_error.get_or_insert(e);
            }
        }
        first_error
    }

    async fn acquire(&self) -> Result<C, PoolError> {
        let deadline = self.acquire_timeout.map(|limit| Instant::now() + limit);

        loop {
            let available = self.available.notified();
            tokio::pin!(available);
            available.as_mut().enable();

            let (checkout, stale) = self.checkout()?;
            if !stale.is_empty() {
                debug!(key = %self.key, evicted = stale.len(), "Evicting idle connections past timeout");
                self.close_each(stale, "idle timeout").await;
                self.available.notify_waiters();
            }

            match checkout {
                Checkout::Ready(conn) => return Ok(conn),
                Checkout::Dial => {
                    let reservation = Reservation {
                        pool: self,
                        armed: true,
                    };
                    let conn = self
                        .binding
                        .dial()
                        .await
                        .map_err(PoolError::ConnectionDialFailed)?;
                    reservation.keep();
                    return Ok(conn);
                }
                Checkout::Wait => {
                    trace!(key = %self.key, max = self.max_capacity, "All connections busy, waiting");
                    match deadline {
                        Some(deadline) => {
                            if tokio::time::timeout_at(deadline, available).await.is_err() {
                                return Err(PoolError::MaxCapacityExceeded {
                                    max: self.max_capacity,
                                    waited: self.acquire_timeout.unwrap_or_default(),
                                });
                            }
                        }
                        None => available.await,
                    }
                }
            }
        }
    }

    /// Close the pool and every idle connection it holds. Idempotent.
    async fn drain(&self) -> Result<(), PoolError> {
        let drained: Vec<C> = {
            let mut state = self.state.lock();
            if state.closed {
                return Ok(());
            }
            state.closed = true;
            state.idle.drain(..).map(|idle| idle.conn).collect()
        };
        self.available.notify_waiters();

        debug!(key = %self.key, closing = drained.len(), "Releasing channel pool");
        match self.close_each(drained, "release").await {
            Some(e) => Err(PoolError::CloseFailed(e)),
            None => Ok(()),
        }
    }

    /// Queue `conn` as idle. A return settles one checkout; anything else
    /// needs a free slot under the ceiling.
    async fn admit(&self, conn: C, returning: bool) -> Result<(), PoolError> {
        let rejected = {
            let mut state = self.state.lock();
            let settles_checkout = returning && state.checked_out > 0;
            if settles_checkout {
                state.checked_out -= 1;
            }

            if state.closed {
                Some((conn, "pool released"))
            } else if !settles_checkout
                && state.idle.len() + state.checked_out >= self.max_capacity
            {
                Some((conn, "pool at capacity"))
            } else {
                state.idle.push_back(IdleConn::new(conn));
                None
            }
        };

        match rejected {
            None => {
                self.available.notify_one();
                Ok(())
            }
            Some((conn, reason)) => {
                debug!(key = %self.key, reason, "Closing handed-in connection instead of pooling it");
                self.binding.close(conn).await.map_err(PoolError::CloseFailed)
            }
        }
    }
}

#[async_trait]
impl<C: Send + 'static> BoundedPool<C> for ChannelPool<C> {
    async fn get(&self) -> Result<C, PoolError> {
        self.acquire().await
    }

    async fn put(&self, conn: C) -> Result<(), PoolError> {
        self.admit(conn, true).await
    }

    async fn adopt(&self, conn: C) -> Result<(), PoolError> {
        self.admit(conn, false).await
    }

    async fn release(&self) -> Result<(), PoolError> {
        self.drain().await
    }
}

impl<C> fmt::Debug for ChannelPool<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelPool")
            .field("key", &self.key)
            .field("max_capacity", &self.max_capacity)
            .field("idle_timeout", &self.idle_timeout)
            .finish_non_exhaustive()
    }
}

/// Default builder used by `PoolRegistry`
#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelPoolBuilder;

#[async_trait]
impl<C: Send + 'static> PoolBuilder<C> for ChannelPoolBuilder {
    async fn build(
        &self,
        key: &DestinationKey,
        settings: PoolSettings<C>,
    ) -> Result<SharedPool<C>, PoolError> {
        let pool = ChannelPool::new(key.clone(), settings).await?;
        Ok(Arc::new(pool))
    }
}
