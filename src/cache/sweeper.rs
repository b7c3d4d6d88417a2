// Periodic expiry sweep.
// Runs `CacheEngine::sweep_expired` on a tokio interval until stopped.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::engine::{CacheEngine, SweepReport};
use super::store::PersistentStore;

/// Shortest period a sweep task will run at.
const MIN_PERIOD: Duration = Duration::from_secs(1);

/// Handle for a running background sweep. Dropping it also stops the sweep.
pub struct SweepHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl SweepHandle {
    /// Spawn a task that sweeps `engine` every `period`. The first sweep runs
    /// one full period after start. Periods under one second are raised to
    /// one second.
    pub fn spawn<S>(engine: Arc<CacheEngine<S>>, period: Duration) -> Self
    where
        S: PersistentStore + 'static,
    {
        let period = if period < MIN_PERIOD {
            warn!(?period, "sweep period too short, using {:?}", MIN_PERIOD);
            MIN_PERIOD
        } else {
            period
        };
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // Skip the first tick (immediate)
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let SweepReport { memory_purged, persisted_purged } = engine.sweep_expired();
                        debug!(memory_purged, persisted_purged, "periodic sweep finished");
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
        });

        Self { shutdown_tx, task }
    }

    /// Stop sweeping and wait for the task to exit.
    pub async fn stop(mut self) {
        let _ = self.shutdown_tx.send(()).await;
        let _ = (&mut self.task).await;
    }

    /// True once the sweep task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for SweepHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl<S: PersistentStore + 'static> CacheEngine<S> {
    /// Start the periodic sweep at the configured interval.
    pub fn start_sweeping(self: &Arc<Self>) -> SweepHandle {
        SweepHandle::spawn(Arc::clone(self), self.config().sweep_interval())
    }
}
