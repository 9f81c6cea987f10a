//! Expiry Sweep Task
//!
//! Background task that periodically removes expired elements from the
//! caches of an engine manager. Reads already skip expired elements; the
//! sweep only bounds how long they occupy memory.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::engine::{EngineManager, EngineStatus};

/// Spawns a task sweeping `manager` every `interval_secs` seconds.
///
/// The task ends on its own once the manager is no longer alive. The
/// returned handle can also be aborted during shutdown.
///
/// # Example
/// ```ignore
/// let handle = spawn_expiry_task(Arc::clone(&engine_manager), 1);
/// // Later, during shutdown:
/// handle.abort();
/// ```
pub fn spawn_expiry_task(manager: Arc<EngineManager>, interval_secs: u64) -> JoinHandle<()> {
    let interval = Duration::from_secs(interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            "Starting expiry sweep for manager '{}' every {} second(s)",
            manager.name(),
            interval.as_secs()
        );

        loop {
            tokio::time::sleep(interval).await;

            if manager.status() != EngineStatus::Alive {
                info!("Manager '{}' shut down, stopping expiry sweep", manager.name());
                break;
            }

            let removed = manager.evict_expired();
            if removed > 0 {
                info!("Expiry sweep: removed {} expired element(s)", removed);
            } else {
                debug!("Expiry sweep: no expired elements found");
            }
        }
    })
}
