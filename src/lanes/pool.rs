//! Lane Pool
//!
//! Fixed pool of single-threaded lanes. Every task for a key runs on the
//! lane picked by hashing the key, so tasks for one key start in submission
//! order and never run in parallel with each other.

use std::collections::hash_map::DefaultHasher;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::sync::mpsc;
use std::thread::{self, JoinHandle, ThreadId};

use tokio::runtime::{Builder, Handle};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::error::{CacheError, Result};

// == Lane ==
/// One dedicated thread driving a current-thread tokio runtime.
///
/// Tasks on a lane interleave only at await points, so a pending data
/// source call never holds the lane.
struct Lane {
    handle: Handle,
    thread_id: ThreadId,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl Lane {
    fn spawn(index: usize) -> Result<Self> {
        let (handle_tx, handle_rx) = mpsc::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let thread = thread::Builder::new()
            .name(format!("cache-lane-{index}"))
            .spawn(move || {
                let runtime = match Builder::new_current_thread().enable_all().build() {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        let _ = handle_tx.send(Err(e));
                        return;
                    }
                };
                let _ = handle_tx.send(Ok(runtime.handle().clone()));
                // Park the lane until shutdown; spawned tasks run meanwhile
                runtime.block_on(async {
                    let _ = shutdown_rx.await;
                });
                debug!(lane = index, "lane stopped");
            })
            .map_err(|e| CacheError::Configuration(format!("failed to start lane {index}: {e}")))?;

        let handle = handle_rx
            .recv()
            .map_err(|_| CacheError::Configuration(format!("lane {index} exited during startup")))?
            .map_err(|e| {
                CacheError::Configuration(format!("failed to create runtime for lane {index}: {e}"))
            })?;

        Ok(Self {
            handle,
            thread_id: thread.thread().id(),
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        })
    }

    fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(thread) = self.thread.take() {
            // A lane cannot wait for itself
            if thread::current().id() == self.thread_id {
                return;
            }
            if thread.join().is_err() {
                warn!("lane thread panicked during shutdown");
            }
        }
    }
}

// == Lane Pool ==
pub struct LanePool {
    lanes: Vec<Lane>,
}

impl LanePool {
    // == Constructor ==
    /// Starts `size` lanes.
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(CacheError::Configuration(
                "lane pool needs at least one lane".to_string(),
            ));
        }
        let lanes = (0..size).map(Lane::spawn).collect::<Result<Vec<_>>>()?;
        info!(lanes = size, "lane pool started");
        Ok(Self { lanes })
    }

    pub fn len(&self) -> usize {
        self.lanes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lanes.is_empty()
    }

    // == Lane For ==
    /// Deterministic lane index for `key`.
    pub fn lane_for<K: Hash + ?Sized>(&self, key: &K) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.lanes.len() as u64) as usize
    }

    // == Submit ==
    /// Queues `task` on the lane owning `key`.
    ///
    /// The task is queued immediately, before the returned future is polled,
    /// so submission order is call order. The returned future resolves with
    /// the task's own result.
    pub fn submit<K, F, T>(
        &self,
        key: &K,
        task: F,
    ) -> impl Future<Output = Result<T>> + Send + 'static
    where
        K: Hash + ?Sized,
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let lane = self.lane_for(key);
        let handle = self.lanes[lane].handle.spawn(task);
        async move {
            handle
                .await
                .map_err(|e| CacheError::Internal(format!("lane {lane} task failed: {e}")))?
        }
    }
}

impl Drop for LanePool {
    fn drop(&mut self) {
        for lane in &mut self.lanes {
            lane.stop();
        }
    }
}

impl std::fmt::Debug for LanePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LanePool")
            .field("lanes", &self.lanes.len())
            .finish()
    }
}
