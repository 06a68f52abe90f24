/// Editor session lifecycle
///
/// An [`EditorSession`] owns everything one open editor needs: its store, a
/// fresh operation queue, the step output cache and the realtime invalidation
/// listener. Mounting registers the store with the [`SessionRegistry`];
/// dropping the session stops the listener and unmounts it again.

use crate::backend::persistence::FlowPersistence;
use crate::backend::realtime::RealtimeChannel;
use crate::editor::registry::SessionRegistry;
use crate::editor::store::{EditorSessionState, EditorStore};
use crate::editor::updater::{FlowUpdater, FlowVersionUpdate};
use crate::flow::mutation::{GraphMutator, MutationError};
use crate::flow::operations::FlowOperationRequest;
use crate::flow::types::{Flow, FlowVersion};
use crate::runtime::queue::OperationQueue;
use crate::steps::cache::StepOutputCache;
use crate::steps::invalidation::StepInvalidationListener;
use crate::steps::queries::QueryInvalidator;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Application-wide collaborators shared by every session
#[derive(Clone)]
pub struct EditorServices {
    pub persistence: Arc<dyn FlowPersistence>,
    pub mutator: Arc<dyn GraphMutator>,
    pub realtime: RealtimeChannel,
    pub queries: Arc<dyn QueryInvalidator>,
}

/// One mounted editor
pub struct EditorSession {
    registry: SessionRegistry,
    store: EditorStore,
    updater: FlowUpdater,
    step_cache: StepOutputCache,
    /// Stops the realtime invalidation listener
    cancel: CancellationToken,
}

impl EditorSession {
    /// Open `version` of `flow` and make it the active session
    ///
    /// Must be called from within a tokio runtime.
    pub fn mount(
        registry: &SessionRegistry,
        flow: Flow,
        version: FlowVersion,
        services: &EditorServices,
    ) -> Self {
        let flow_id = flow.id.clone();
        let read_only = version.is_locked();
        let mut initial = EditorSessionState::new(flow, version);
        initial.read_only = read_only;

        let store = EditorStore::new(initial);
        let step_cache = StepOutputCache::new();
        let updater = FlowUpdater::new(
            store.clone(),
            OperationQueue::new(),
            Arc::clone(&services.persistence),
            Arc::clone(&services.mutator),
            step_cache.clone(),
        );

        let cancel = CancellationToken::new();
        StepInvalidationListener::new(
            flow_id.clone(),
            step_cache.clone(),
            Arc::clone(&services.queries),
        )
        .spawn(services.realtime.subscribe(), cancel.clone());

        registry.mount(&store);
        tracing::info!("🧭 Editor opened for flow {} (session {})", flow_id, store.id());

        Self {
            registry: registry.clone(),
            store,
            updater,
            step_cache,
            cancel,
        }
    }

    pub fn store(&self) -> &EditorStore {
        &self.store
    }

    pub fn state(&self) -> EditorSessionState {
        self.store.get_state()
    }

    pub fn step_cache(&self) -> &StepOutputCache {
        &self.step_cache
    }

    pub fn queue(&self) -> &OperationQueue {
        self.updater.queue()
    }

    /// See [`FlowUpdater::update_flow_version`]
    pub fn update_flow_version(
        &self,
        operation: FlowOperationRequest,
        on_error: impl FnOnce(anyhow::Error) + Send + 'static,
    ) -> Result<FlowVersionUpdate, MutationError> {
        self.updater.update_flow_version(operation, on_error)
    }

    /// Apply an operation, leaving persistence failures to `save_error` and
    /// the log
    pub fn apply(&self, operation: FlowOperationRequest) -> Result<FlowVersionUpdate, MutationError> {
        self.updater.update_flow_version(operation, |_| {})
    }

    /// Wait until every queued persistence call has settled
    pub async fn wait_for_saves(&self) {
        self.updater.queue().wait_idle().await;
    }
}

impl std::fmt::Debug for EditorSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditorSession")
            .field("store", &self.store)
            .field("queue", self.updater.queue())
            .finish()
    }
}

impl Drop for EditorSession {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.registry.unmount(&self.store);
        tracing::info!("🚪 Editor session {} closed", self.store.id());
    }
}
