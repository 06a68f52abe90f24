/// Update orchestrator
///
/// Turns one [`FlowOperationRequest`] into an optimistic local edit plus a
/// queued persistence call:
///
/// 1. compute the next version with the graph mutator
/// 2. run the operation's side effects against the pre-mutation state
///    (cache eviction, selection changes)
/// 3. enqueue the persistence call and publish the new version with
///    `saving = true`; on success the server-assigned id, state and timestamp
///    are merged into whatever version the store holds by then, on failure
///    the queue halts and the caller's error callback fires
///
/// Steps 1 to 3 run under the store's write lock, so a reconcile finishing on
/// another worker can neither be overwritten by a stale read nor observe a
/// queued edit with `saving = false`. The new version is returned as soon as
/// step 3 is done; nothing waits on the network.

use crate::backend::persistence::{FlowPersistence, PersistedFlow};
use crate::editor::store::{EditorSessionState, EditorStore, RightSidebar};
use crate::flow::mutation::{GraphMutator, MutationError};
use crate::flow::operations::FlowOperationRequest;
use crate::flow::types::FlowVersion;
use crate::runtime::queue::{OperationQueue, QueueError};
use crate::steps::cache::StepOutputCache;
use std::collections::HashSet;
use std::sync::Arc;

/// Result of an optimistic update
#[derive(Debug, Clone)]
pub struct FlowVersionUpdate {
    /// Version now held by the store
    pub flow_version: FlowVersion,
    /// Whether the persistence call was admitted to the queue
    pub enqueued: Result<(), QueueError>,
}

/// Orchestrates optimistic edits for one editor session
#[derive(Clone)]
pub struct FlowUpdater {
    store: EditorStore,
    queue: OperationQueue,
    persistence: Arc<dyn FlowPersistence>,
    mutator: Arc<dyn GraphMutator>,
    step_cache: StepOutputCache,
}

impl FlowUpdater {
    pub fn new(
        store: EditorStore,
        queue: OperationQueue,
        persistence: Arc<dyn FlowPersistence>,
        mutator: Arc<dyn GraphMutator>,
        step_cache: StepOutputCache,
    ) -> Self {
        Self {
            store,
            queue,
            persistence,
            mutator,
            step_cache,
        }
    }

    pub fn queue(&self) -> &OperationQueue {
        &self.queue
    }

    /// Apply `operation` locally and schedule its persistence
    ///
    /// Must be called from within a tokio runtime. A malformed operation is
    /// rejected with [`MutationError`] before anything changes. Persistence
    /// failures never surface here: they halt the queue, land in
    /// `save_error` and are handed to `on_error`.
    pub fn update_flow_version(
        &self,
        operation: FlowOperationRequest,
        on_error: impl FnOnce(anyhow::Error) + Send + 'static,
    ) -> Result<FlowVersionUpdate, MutationError> {
        self.store.try_set_state(move |state| {
            let flow_version = self.mutator.apply(&state.flow_version, &operation)?;
            tracing::info!(
                "✏️ Applied {} to flow {}",
                operation.type_name(),
                state.flow.id
            );

            let (selected_step, right_sidebar) = self.run_side_effects(state, &flow_version, &operation);
            state.flow_version = flow_version.clone();
            state.selected_step = selected_step;
            state.right_sidebar = right_sidebar;
            state.enforce_selection();

            let enqueued = self.enqueue_persistence(state.flow.id.clone(), operation, on_error);
            if enqueued.is_ok() {
                state.saving = true;
            }
            Ok(FlowVersionUpdate {
                flow_version,
                enqueued,
            })
        })
    }

    /// Cache eviction and selection changes, computed from the state before
    /// the operation was applied
    fn run_side_effects(
        &self,
        before: &EditorSessionState,
        after: &FlowVersion,
        operation: &FlowOperationRequest,
    ) -> (Option<String>, RightSidebar) {
        let mut selected_step = before.selected_step.clone();
        let mut right_sidebar = before.right_sidebar;

        match operation {
            FlowOperationRequest::DeleteAction(request) => {
                let removed: HashSet<String> = request
                    .names
                    .iter()
                    .filter_map(|name| before.flow_version.get_action(name))
                    .flat_map(|action| action.subtree_names())
                    .collect();
                for name in &removed {
                    self.step_cache.clear_step(name);
                }
                if selected_step.as_ref().is_some_and(|step| removed.contains(step)) {
                    tracing::debug!("🗑️ Selected step deleted, clearing selection");
                    selected_step = None;
                    right_sidebar = RightSidebar::None;
                }
            }
            FlowOperationRequest::DuplicateAction(request) => {
                let copy = after
                    .get_action(&request.step_name)
                    .and_then(|original| original.next_action.as_deref());
                if let Some(copy) = copy {
                    selected_step = Some(copy.name.clone());
                    right_sidebar = RightSidebar::StepSettings;
                }
            }
            FlowOperationRequest::ChangeName(_)
            | FlowOperationRequest::UpdateTrigger(_)
            | FlowOperationRequest::AddAction(_)
            | FlowOperationRequest::UpdateAction(_)
            | FlowOperationRequest::MoveAction(_)
            | FlowOperationRequest::PasteActions(_)
            | FlowOperationRequest::SetSkipAction(_)
            | FlowOperationRequest::LockFlow => {}
        }

        (selected_step, right_sidebar)
    }

    fn enqueue_persistence(
        &self,
        flow_id: String,
        operation: FlowOperationRequest,
        on_error: impl FnOnce(anyhow::Error) + Send + 'static,
    ) -> Result<(), QueueError> {
        let store = self.store.clone();
        let queue = self.queue.clone();
        let persistence = Arc::clone(&self.persistence);
        let kind = operation.type_name();

        let enqueued = self.queue.add(async move {
            match persistence.persist(&flow_id, &operation).await {
                Ok(persisted) => {
                    reconcile(&store, &queue, persisted);
                    tracing::info!("💾 Persisted {} for flow {}", kind, flow_id);
                }
                Err(e) => {
                    let discarded = queue.halt();
                    tracing::error!(
                        "❌ Failed to persist {} for flow {} ({} later edits dropped): {:#}",
                        kind,
                        flow_id,
                        discarded,
                        e
                    );
                    let message = format!("{:#}", e);
                    store.set_state(|state| state.save_error = Some(message));
                    on_error(e);
                }
            }
            Ok(())
        });

        if enqueued.is_err() {
            tracing::warn!("⛔ {} applied locally but not persisted: queue is halted", kind);
        }
        enqueued
    }
}

/// Merge the server-confirmed fields into the store's current version
///
/// Edits applied after this operation may already be in the store, so only
/// the identifiers and timestamp are replaced. The queue is read under the
/// store lock: updates enqueue while holding it too.
fn reconcile(store: &EditorStore, queue: &OperationQueue, persisted: PersistedFlow) {
    store.set_state(|state| {
        state.flow_version.id = persisted.version.id;
        state.flow_version.state = persisted.version.state;
        state.flow_version.updated = persisted.version.updated;
        state.saving = queue.pending() > 0;
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::persistence::PersistedVersion;
    use crate::editor::store::fixtures::flow;
    use crate::flow::mutation::FlowOperationApplier;
    use crate::flow::operations::{SetSkipActionRequest, UpdateActionRequest};
    use crate::flow::types::fixtures::{code, looping, version};
    use crate::flow::types::{ActionKind, FlowVersionState};
    use crate::steps::cache::StepOutput;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct ScriptedPersistence {
        calls: Mutex<Vec<&'static str>>,
        fail_call: Option<usize>,
    }

    #[async_trait]
    impl FlowPersistence for ScriptedPersistence {
        async fn persist(
            &self,
            _flow_id: &str,
            operation: &FlowOperationRequest,
        ) -> anyhow::Result<PersistedFlow> {
            let call = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(operation.type_name());
                calls.len()
            };
            tokio::time::sleep(Duration::from_millis(20)).await;
            if self.fail_call == Some(call) {
                anyhow::bail!("server unavailable");
            }
            Ok(PersistedFlow {
                version: PersistedVersion {
                    id: format!("version-{}", call + 1),
                    state: FlowVersionState::Draft,
                    updated: Utc::now(),
                },
            })
        }
    }

    fn updater(
        actions: Vec<crate::flow::types::Action>,
        persistence: Arc<ScriptedPersistence>,
    ) -> (FlowUpdater, EditorStore, StepOutputCache) {
        let store = EditorStore::new(EditorSessionState::new(flow(), version(actions)));
        let cache = StepOutputCache::new();
        let updater = FlowUpdater::new(
            store.clone(),
            OperationQueue::new(),
            persistence,
            Arc::new(FlowOperationApplier::new()),
            cache.clone(),
        );
        (updater, store, cache)
    }

    fn ignore_errors(_: anyhow::Error) {}

    fn skip(name: &str) -> FlowOperationRequest {
        FlowOperationRequest::SetSkipAction(SetSkipActionRequest {
            names: vec![name.to_string()],
            skip: true,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn update_is_visible_before_persistence_settles() {
        let persistence = Arc::new(ScriptedPersistence::default());
        let (updater, store, _) = updater(vec![code("step_1")], Arc::clone(&persistence));

        let expected = FlowOperationApplier::new()
            .apply(&store.get_state().flow_version, &skip("step_1"))
            .unwrap();
        let update = updater.update_flow_version(skip("step_1"), ignore_errors).unwrap();

        assert_eq!(update.flow_version, expected);
        assert_eq!(update.enqueued, Ok(()));
        let state = store.get_state();
        assert!(state.saving);
        assert!(state.flow_version.get_action("step_1").unwrap().skip);
        assert!(persistence.calls.lock().unwrap().is_empty());

        updater.queue().wait_idle().await;

        let state = store.get_state();
        assert!(!state.saving);
        assert_eq!(state.flow_version.id, "version-2");
        assert!(state.flow_version.get_action("step_1").unwrap().skip);
    }

    #[tokio::test(start_paused = true)]
    async fn reconcile_keeps_later_local_edits() {
        let persistence = Arc::new(ScriptedPersistence::default());
        let (updater, store, _) = updater(vec![code("step_1"), code("step_2")], persistence);

        updater.update_flow_version(skip("step_1"), ignore_errors).unwrap();
        updater.update_flow_version(skip("step_2"), ignore_errors).unwrap();
        updater.queue().wait_idle().await;

        let state = store.get_state();
        assert!(state.flow_version.get_action("step_1").unwrap().skip);
        assert!(state.flow_version.get_action("step_2").unwrap().skip);
        assert_eq!(state.flow_version.id, "version-3");
        assert!(!state.saving);
    }

    #[tokio::test]
    async fn deleting_selected_step_clears_selection_and_panel() {
        let persistence = Arc::new(ScriptedPersistence::default());
        let (updater, store, _) = updater(vec![code("step_1"), code("step_2")], persistence);

        store.select_step(Some("step_1")).unwrap();
        updater
            .update_flow_version(FlowOperationRequest::delete(["step_2"]), ignore_errors)
            .unwrap();
        let state = store.get_state();
        assert_eq!(state.selected_step.as_deref(), Some("step_1"));
        assert_eq!(state.right_sidebar, RightSidebar::StepSettings);

        updater
            .update_flow_version(FlowOperationRequest::delete(["step_1"]), ignore_errors)
            .unwrap();
        let state = store.get_state();
        assert_eq!(state.selected_step, None);
        assert_eq!(state.right_sidebar, RightSidebar::None);
    }

    #[tokio::test]
    async fn deleting_a_loop_evicts_nested_outputs_and_selection() {
        let persistence = Arc::new(ScriptedPersistence::default());
        let (updater, store, cache) = updater(
            vec![looping("step_1", vec![code("step_2")]), code("step_3")],
            persistence,
        );
        for step in ["step_1", "step_2", "step_3"] {
            cache.set_step_data(step, StepOutput::succeeded(serde_json::json!(step)));
        }
        cache.set_expanded("step_2.items", true);
        store.select_step(Some("step_2")).unwrap();

        updater
            .update_flow_version(FlowOperationRequest::delete(["step_1"]), ignore_errors)
            .unwrap();

        assert!(cache.get_step_data("step_1").is_none());
        assert!(cache.get_step_data("step_2").is_none());
        assert!(!cache.get_expanded("step_2.items"));
        assert!(cache.get_step_data("step_3").is_some());
        assert_eq!(store.get_state().selected_step, None);
    }

    #[tokio::test]
    async fn duplicate_selects_the_copy() {
        let persistence = Arc::new(ScriptedPersistence::default());
        let (updater, store, _) = updater(vec![code("step_1")], persistence);

        let update = updater
            .update_flow_version(FlowOperationRequest::duplicate("step_1"), ignore_errors)
            .unwrap();

        let state = store.get_state();
        assert_eq!(state.selected_step.as_deref(), Some("step_2"));
        assert_eq!(state.right_sidebar, RightSidebar::StepSettings);
        assert!(update.flow_version.contains_step("step_2"));
    }

    #[tokio::test]
    async fn malformed_operation_changes_nothing() {
        let persistence = Arc::new(ScriptedPersistence::default());
        let (updater, store, _) = updater(vec![code("step_1")], Arc::clone(&persistence));
        let before = store.get_state().flow_version;

        let err = updater
            .update_flow_version(
                FlowOperationRequest::UpdateAction(UpdateActionRequest {
                    name: "step_9".to_string(),
                    display_name: "Missing".to_string(),
                    kind: ActionKind::Code,
                    settings: serde_json::Value::Null,
                    valid: true,
                    skip: None,
                }),
                ignore_errors,
            )
            .unwrap_err();

        assert_eq!(err, MutationError::StepNotFound { name: "step_9".to_string() });
        assert_eq!(store.get_state().flow_version, before);
        assert!(!store.get_state().saving);
        assert_eq!(updater.queue().size(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn persistence_failure_halts_and_reports() {
        let persistence = Arc::new(ScriptedPersistence {
            fail_call: Some(1),
            ..Default::default()
        });
        let (updater, store, _) = updater(vec![code("step_1"), code("step_2")], Arc::clone(&persistence));
        let reported = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&reported);
        updater
            .update_flow_version(skip("step_1"), move |e| {
                sink.lock().unwrap().push(e.to_string())
            })
            .unwrap();
        updater.update_flow_version(skip("step_2"), ignore_errors).unwrap();
        updater.queue().wait_idle().await;

        assert_eq!(*persistence.calls.lock().unwrap(), vec!["SET_SKIP_ACTION"]);
        assert_eq!(*reported.lock().unwrap(), vec!["server unavailable".to_string()]);
        let state = store.get_state();
        assert!(state.saving);
        assert_eq!(state.save_error.as_deref(), Some("server unavailable"));

        // still applied locally, never persisted
        let late = updater
            .update_flow_version(FlowOperationRequest::delete(["step_2"]), ignore_errors)
            .unwrap();
        assert_eq!(late.enqueued, Err(QueueError::Halted));
        assert!(!store.get_state().flow_version.contains_step("step_2"));
        assert_eq!(persistence.calls.lock().unwrap().len(), 1);
    }
}
