//! Expiry sweeper
//!
//! One task per installed entry. It sleeps for the entry's alive duration,
//! then retires the entry if it is still the one it was spawned for. Activity
//! on the key does not reset the timer.
//!
//! The task only holds a `Weak` to the registry while sleeping, so a dropped
//! registry is never kept alive by its timers.

use std::sync::Weak;
use std::time::Duration;

use hostpool_core::DestinationKey;
use tokio::task::AbortHandle;
use tracing::trace;

use crate::registry::RegistryInner;

pub(crate) fn spawn<C: Send + 'static>(
    registry: Weak<RegistryInner<C>>,
    key: DestinationKey,
    entry_id: u64,
    alive: Duration,
) -> AbortHandle {
    tokio::spawn(async move {
        tokio::time::sleep(alive).await;

        let Some(registry) = registry.upgrade() else {
            trace!(key = %key, entry_id, "Registry dropped before entry expired");
            return;
        };
        registry.expire(&key, entry_id).await;
    })
    .abort_handle()
}
