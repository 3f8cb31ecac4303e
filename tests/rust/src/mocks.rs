//! Mock pools, builders and bindings for testing
//!
//! `RecordingBuilder` hands out `MockPool`s and remembers every build, so tests
//! can assert on the settings the registry resolved and on which candidates
//! were released.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Barrier;

use hostpool_core::{
    closer_fn, factory_fn, BoundedPool, Closer, DestinationKey, Factory, PoolBuilder, PoolError,
    PoolSettings, ResourceBinding, SharedPool,
};

// ============================================================================
// MockPool
// ============================================================================

/// Connection handed out by a `MockPool`; tagged with the pool that made it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MockConn {
    pub pool_id: usize,
    pub serial: usize,
}

/// Unbounded in-memory pool that counts its calls
#[derive(Debug, Default)]
pub struct MockPool {
    pub id: usize,
    idle: Mutex<VecDeque<MockConn>>,
    next_serial: AtomicUsize,
    gets: AtomicUsize,
    puts: AtomicUsize,
    releases: AtomicUsize,
}

impl MockPool {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn idle(&self) -> usize {
        self.idle.lock().len()
    }
}

#[async_trait]
impl BoundedPool<MockConn> for MockPool {
    async fn get(&self) -> Result<MockConn, PoolError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if self.releases() > 0 {
            return Err(PoolError::PoolClosed);
        }
        if let Some(conn) = self.idle.lock().pop_front() {
            return Ok(conn);
        }
        Ok(MockConn {
            pool_id: self.id,
            serial: self.next_serial.fetch_add(1, Ordering::SeqCst),
        })
    }

    async fn put(&self, conn: MockConn) -> Result<(), PoolError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.idle.lock().push_back(conn);
        Ok(())
    }

    async fn release(&self) -> Result<(), PoolError> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        self.idle.lock().clear();
        Ok(())
    }
}

// ============================================================================
// RecordingBuilder
// ============================================================================

/// One call to `RecordingBuilder::build`
#[derive(Debug, Clone)]
pub struct RecordedBuild {
    pub key: DestinationKey,
    pub settings: PoolSettings<MockConn>,
    pub pool: Arc<MockPool>,
}

/// Builder that produces `MockPool`s and records every construction
#[derive(Clone, Default)]
pub struct RecordingBuilder {
    builds: Arc<Mutex<Vec<RecordedBuild>>>,
    barrier: Option<Arc<Barrier>>,
    fail_next: Arc<AtomicBool>,
}

impl RecordingBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every build until `parties` builds are in flight
    pub fn with_barrier(mut self, parties: usize) -> Self {
        self.barrier = Some(Arc::new(Barrier::new(parties)));
        self
    }

    /// Make the next build fail with a dial error
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn builds(&self) -> Vec<RecordedBuild> {
        self.builds.lock().clone()
    }

    pub fn build_count(&self) -> usize {
        self.builds.lock().len()
    }

    pub fn pool(&self, index: usize) -> Arc<MockPool> {
        Arc::clone(&self.builds.lock()[index].pool)
    }

    pub fn last_settings(&self) -> Option<PoolSettings<MockConn>> {
        self.builds.lock().last().map(|b| b.settings.clone())
    }
}

#[async_trait]
impl PoolBuilder<MockConn> for RecordingBuilder {
    async fn build(
        &self,
        key: &DestinationKey,
        settings: PoolSettings<MockConn>,
    ) -> Result<SharedPool<MockConn>, PoolError> {
        if let Some(barrier) = &self.barrier {
            barrier.wait().await;
        }
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(PoolError::ConnectionDialFailed("refused".into()));
        }

        let pool = {
            let mut builds = self.builds.lock();
            let pool = Arc::new(MockPool::new(builds.len()));
            builds.push(RecordedBuild {
                key: key.clone(),
                settings,
                pool: Arc::clone(&pool),
            });
            pool
        };
        Ok(pool)
    }
}

/// Binding for registries backed by `RecordingBuilder`; never dialed
pub fn mock_binding() -> ResourceBinding<MockConn> {
    ResourceBinding::from_fns(
        || async { Ok::<_, io::Error>(MockConn { pool_id: usize::MAX, serial: 0 }) },
        |_conn: MockConn| async { Ok::<_, io::Error>(()) },
    )
}

// ============================================================================
// CountingBinding
// ============================================================================

/// Factory/closer pair over `usize` connections that counts dials and closes
#[derive(Clone, Default)]
pub struct CountingBinding {
    dialed: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
}

impl CountingBinding {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dialed(&self) -> usize {
        self.dialed.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Make every dial fail with `ConnectionRefused` until reset
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn factory(&self) -> Factory<usize> {
        let dialed = Arc::clone(&self.dialed);
        let failing = Arc::clone(&self.failing);
        factory_fn(move || {
            let refuse = failing.load(Ordering::SeqCst);
            let n = if refuse {
                0
            } else {
                dialed.fetch_add(1, Ordering::SeqCst) + 1
            };
            async move {
                if refuse {
                    return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"));
                }
                Ok(n)
            }
        })
    }

    pub fn closer(&self) -> Closer<usize> {
        let closed = Arc::clone(&self.closed);
        closer_fn(move |_conn: usize| {
            closed.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, io::Error>(()) }
        })
    }

    pub fn binding(&self) -> ResourceBinding<usize> {
        ResourceBinding::new(self.factory(), self.closer())
    }
}
