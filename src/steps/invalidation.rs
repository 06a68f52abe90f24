/// Realtime invalidation of step outputs
///
/// Listens to realtime step notifications for the open flow and evicts the
/// matching cached output and queries, so the editor refetches instead of
/// showing output from before a test ran elsewhere. It only ever evicts and
/// runs independently of the operation queue.

use crate::backend::realtime::RealtimeEvent;
use crate::steps::cache::StepOutputCache;
use crate::steps::queries::{QueryInvalidator, StepQueryKey};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Evicts cache entries for one flow in response to realtime events
#[derive(Clone)]
pub struct StepInvalidationListener {
    flow_id: String,
    step_cache: StepOutputCache,
    queries: Arc<dyn QueryInvalidator>,
}

impl StepInvalidationListener {
    pub fn new(
        flow_id: impl Into<String>,
        step_cache: StepOutputCache,
        queries: Arc<dyn QueryInvalidator>,
    ) -> Self {
        Self {
            flow_id: flow_id.into(),
            step_cache,
            queries,
        }
    }

    /// Apply one event; returns false when it concerns another flow
    pub fn handle(&self, event: &RealtimeEvent) -> bool {
        if event.flow_id != self.flow_id {
            tracing::debug!(
                "⏭️ Ignoring {:?} for flow {} (listening to {})",
                event.kind,
                event.flow_id,
                self.flow_id
            );
            return false;
        }

        match &event.step_id {
            Some(step_id) => {
                self.step_cache.clear_step(step_id);
                self.step_cache.mark_stale(step_id);
                self.queries
                    .invalidate(&StepQueryKey::new(event.flow_version_id.clone(), step_id.clone()));
                tracing::info!("🔄 {:?}: step {} output invalidated", event.kind, step_id);
            }
            None => {
                self.queries.invalidate_version(&event.flow_version_id);
                tracing::info!(
                    "🔄 {:?}: all step queries of version {} invalidated",
                    event.kind,
                    event.flow_version_id
                );
            }
        }
        true
    }

    /// Apply events from `events` in delivery order until cancelled or the
    /// channel closes
    pub fn spawn(
        self,
        mut events: broadcast::Receiver<RealtimeEvent>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::debug!("👂 Realtime invalidation listening for flow {}", self.flow_id);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    received = events.recv() => match received {
                        Ok(event) => {
                            self.handle(&event);
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(
                                "⚠️ Realtime listener for flow {} lagged, {} events lost",
                                self.flow_id,
                                skipped
                            );
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
            tracing::debug!("🔇 Realtime invalidation stopped for flow {}", self.flow_id);
        })
    }
}
