/// Serial operation queue
///
/// Runs persistence tasks one at a time in submission order. The queue is a
/// two-state machine: while `Running` it accepts and drains tasks; once
/// `Halted` it discards whatever has not started yet and rejects every later
/// submission. A halted queue is never resumed; a new editor session creates a
/// new queue.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

/// Opaque unit of asynchronous work
pub type QueueTask = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'static>>;

/// Lifecycle of the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueStatus {
    Running,
    Halted,
}

/// Reason a task was not admitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("operation queue is halted; task was not enqueued")]
    Halted,
}

/// FIFO runner guaranteeing at most one in-flight task
///
/// Cloning is cheap and every clone drives the same queue.
#[derive(Clone, Default)]
pub struct OperationQueue {
    inner: Arc<QueueInner>,
}

#[derive(Default)]
struct QueueInner {
    state: Mutex<QueueState>,
    /// Signalled whenever the drain loop exits
    idle: Notify,
}

struct QueueState {
    status: QueueStatus,
    pending: VecDeque<QueueTask>,
    /// A drain loop is currently spawned
    draining: bool,
    /// A task has been dequeued and has not finished yet
    in_flight: bool,
    completed: u64,
}

impl Default for QueueState {
    fn default() -> Self {
        Self {
            status: QueueStatus::Running,
            pending: VecDeque::new(),
            draining: false,
            in_flight: false,
            completed: 0,
        }
    }
}

impl std::fmt::Debug for OperationQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("OperationQueue")
            .field("status", &state.status)
            .field("pending", &state.pending.len())
            .field("in_flight", &state.in_flight)
            .field("completed", &state.completed)
            .finish()
    }
}

impl OperationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a task
    ///
    /// Must be called from within a tokio runtime: the first task submitted to
    /// an idle queue spawns the drain loop. Returns `QueueError::Halted` (and
    /// drops the task unpolled) once the queue has been halted.
    pub fn add<F>(&self, task: F) -> Result<(), QueueError>
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let spawn_drain = {
            let mut state = self.lock();
            if state.status == QueueStatus::Halted {
                tracing::warn!("⛔ Rejected task: operation queue is halted");
                return Err(QueueError::Halted);
            }
            state.pending.push_back(Box::pin(task));
            tracing::debug!("📥 Task enqueued ({} pending)", state.pending.len());

            if state.draining {
                false
            } else {
                state.draining = true;
                true
            }
        };

        if spawn_drain {
            tokio::spawn(self.clone().drain());
        }
        Ok(())
    }

    /// Pending plus in-flight task count
    pub fn size(&self) -> usize {
        let state = self.lock();
        state.pending.len() + usize::from(state.in_flight)
    }

    /// Tasks waiting to start, excluding the one in flight
    pub fn pending(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn status(&self) -> QueueStatus {
        self.lock().status
    }

    pub fn is_halted(&self) -> bool {
        self.status() == QueueStatus::Halted
    }

    /// Number of tasks that ran to completion (successfully or not)
    pub fn completed(&self) -> u64 {
        self.lock().completed
    }

    /// Stop the queue for good
    ///
    /// Queued-but-unstarted tasks are dropped without being polled; a task
    /// already in flight is not cancelled. Returns how many tasks were
    /// discarded.
    pub fn halt(&self) -> usize {
        let mut state = self.lock();
        let discarded = state.pending.len();
        state.pending.clear();
        if state.status != QueueStatus::Halted {
            state.status = QueueStatus::Halted;
            tracing::warn!("🛑 Operation queue halted, discarded {} pending tasks", discarded);
        }
        discarded
    }

    /// Wait until no task is pending or in flight
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if !self.lock().draining {
                return;
            }
            notified.await;
        }
    }

    async fn drain(self) {
        loop {
            let task = {
                let mut state = self.lock();
                if state.in_flight {
                    state.in_flight = false;
                    state.completed += 1;
                }
                let next = match state.status {
                    QueueStatus::Running => state.pending.pop_front(),
                    QueueStatus::Halted => None,
                };
                match next {
                    Some(task) => {
                        state.in_flight = true;
                        task
                    }
                    None => {
                        state.draining = false;
                        break;
                    }
                }
            };

            // Each task runs in its own tokio task so a panic is contained to it.
            match tokio::spawn(task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!("⚠️ Queued task failed: {:#}", e);
                }
                Err(e) => {
                    tracing::error!("❌ Queued task aborted: {}", e);
                }
            }
        }

        self.inner.idle.notify_waiters();
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
