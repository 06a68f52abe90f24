/// Shared editor store
///
/// One store per open editor session. It is the single source of truth for
/// session state: every change goes through [`EditorStore::set_state`] (or one
/// of the helpers built on it), and subscribers are notified after each change
/// with a fresh snapshot, in the order the changes were committed.

use crate::flow::types::{Flow, FlowVersion};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use uuid::Uuid;

/// Right-hand panel of the builder
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RightSidebar {
    #[default]
    None,
    StepSettings,
}

/// Left-hand panel of the builder
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeftSidebar {
    #[default]
    None,
    RunDetails,
    Versions,
}

/// Callback that inserts a data mention into whichever input currently has focus
#[derive(Clone)]
pub struct MentionHandler(Arc<dyn Fn(&str) + Send + Sync>);

impl MentionHandler {
    pub fn new(handler: impl Fn(&str) + Send + Sync + 'static) -> Self {
        Self(Arc::new(handler))
    }

    pub fn insert(&self, mention: &str) {
        (self.0)(mention)
    }
}

impl fmt::Debug for MentionHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MentionHandler(..)")
    }
}

/// Aggregate state of one editor session
#[derive(Debug, Clone)]
pub struct EditorSessionState {
    pub flow: Flow,
    pub flow_version: FlowVersion,
    /// Selected step; always names a step present in `flow_version`
    pub selected_step: Option<String>,
    /// True while any persistence task is queued or in flight
    pub saving: bool,
    pub right_sidebar: RightSidebar,
    pub left_sidebar: LeftSidebar,
    pub read_only: bool,
    /// Last persistence failure, shown to the user as a toast
    pub save_error: Option<String>,
    pub insert_mention_handler: Option<MentionHandler>,
}

impl EditorSessionState {
    pub fn new(flow: Flow, flow_version: FlowVersion) -> Self {
        Self {
            flow,
            flow_version,
            selected_step: None,
            saving: false,
            right_sidebar: RightSidebar::None,
            left_sidebar: LeftSidebar::None,
            read_only: false,
            save_error: None,
            insert_mention_handler: None,
        }
    }

    /// Drop the selection if it no longer names a step in the current version
    pub(crate) fn enforce_selection(&mut self) {
        let missing = self
            .selected_step
            .as_deref()
            .is_some_and(|name| !self.flow_version.contains_step(name));
        if missing {
            self.selected_step = None;
            self.right_sidebar = RightSidebar::None;
        }
    }
}

/// Error returned when selecting a step the current version does not contain
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("step '{0}' does not exist in the current flow version")]
pub struct SelectionError(pub String);

/// Handle returned by `subscribe`; the listener is removed when it is dropped
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub(crate) fn new(unsubscribe: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// Remove the listener now
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}

pub type StoreListener = Arc<dyn Fn(&EditorSessionState) + Send + Sync>;

/// Ordered listener list shared by the store and the session registry
pub(crate) struct ListenerSet<L> {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(u64, L)>>,
}

impl<L: Clone> ListenerSet<L> {
    pub(crate) fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn insert(&self, listener: L) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().push((id, listener));
        id
    }

    pub(crate) fn remove(&self, id: u64) {
        self.lock().retain(|(listener_id, _)| *listener_id != id);
    }

    /// Copy of the current listeners, so callbacks run without the lock held
    pub(crate) fn snapshot(&self) -> Vec<L> {
        self.lock().iter().map(|(_, listener)| listener.clone()).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(u64, L)>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Mutable container of one session's [`EditorSessionState`]
///
/// Cloning yields another handle to the same store.
#[derive(Clone)]
pub struct EditorStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    id: Uuid,
    state: RwLock<EditorSessionState>,
    listeners: ListenerSet<StoreListener>,
    delivery: Mutex<Delivery>,
}

/// Committed snapshots waiting for their listeners
#[derive(Default)]
struct Delivery {
    pending: VecDeque<EditorSessionState>,
    /// Some caller is already draining `pending`
    active: bool,
}

/// Releases the delivery flag if a listener panics mid-drain
struct DeliveryTurn<'a> {
    inner: &'a StoreInner,
    finished: bool,
}

impl Drop for DeliveryTurn<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.inner.lock_delivery().active = false;
        }
    }
}

impl StoreInner {
    fn lock_delivery(&self) -> MutexGuard<'_, Delivery> {
        self.delivery.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hand queued snapshots to the listeners, oldest first
    ///
    /// Only one caller drains at a time. A change committed meanwhile (from
    /// another thread, or by a listener) is queued and delivered by the
    /// caller already draining.
    fn deliver(&self) {
        {
            let mut delivery = self.lock_delivery();
            if delivery.active {
                return;
            }
            delivery.active = true;
        }
        let mut turn = DeliveryTurn {
            inner: self,
            finished: false,
        };
        loop {
            let next = {
                let mut delivery = self.lock_delivery();
                match delivery.pending.pop_front() {
                    Some(snapshot) => snapshot,
                    None => {
                        // cleared under the same lock a new push takes
                        delivery.active = false;
                        turn.finished = true;
                        return;
                    }
                }
            };
            for listener in self.listeners.snapshot() {
                listener(&next);
            }
        }
    }
}

impl fmt::Debug for EditorStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EditorStore")
            .field("id", &self.inner.id)
            .field("listeners", &self.inner.listeners.len())
            .finish()
    }
}

impl EditorStore {
    pub fn new(initial: EditorSessionState) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                id: Uuid::new_v4(),
                state: RwLock::new(initial),
                listeners: ListenerSet::new(),
                delivery: Mutex::new(Delivery::default()),
            }),
        }
    }

    /// Session identifier, stable for the lifetime of the store
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Snapshot of the current state
    pub fn get_state(&self) -> EditorSessionState {
        self.inner
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Read a projection of the state without cloning all of it
    pub fn with_state<R>(&self, read: impl FnOnce(&EditorSessionState) -> R) -> R {
        let state = self.inner.state.read().unwrap_or_else(PoisonError::into_inner);
        read(&state)
    }

    /// Apply a change and notify subscribers
    ///
    /// The updater runs under the store's write lock and the post-change
    /// snapshot is returned. Listeners run after the lock is released and see
    /// snapshots in commit order.
    pub fn set_state(&self, update: impl FnOnce(&mut EditorSessionState)) -> EditorSessionState {
        let committed: Result<_, std::convert::Infallible> = self.try_set_state(|state| {
            update(state);
            Ok(state.clone())
        });
        match committed {
            Ok(snapshot) => snapshot,
            Err(never) => match never {},
        }
    }

    /// Read, decide and write under a single write lock
    ///
    /// When `update` returns `Err` it must leave the state untouched; nothing
    /// is published in that case.
    pub fn try_set_state<R, E>(
        &self,
        update: impl FnOnce(&mut EditorSessionState) -> Result<R, E>,
    ) -> Result<R, E> {
        let result = {
            let mut state = self.inner.state.write().unwrap_or_else(PoisonError::into_inner);
            let result = update(&mut state)?;
            // queued while the write lock is held, so queue order is commit order
            self.inner.lock_delivery().pending.push_back(state.clone());
            result
        };
        self.inner.deliver();
        Ok(result)
    }

    /// Register a listener called after every state change
    pub fn subscribe(
        &self,
        listener: impl Fn(&EditorSessionState) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.inner.listeners.insert(Arc::new(listener));
        let store: Weak<StoreInner> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(store) = store.upgrade() {
                store.listeners.remove(id);
            }
        })
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.listeners.len()
    }

    /// Select a step (or clear the selection with `None`)
    ///
    /// Selecting a step opens its settings panel.
    pub fn select_step(&self, step: Option<&str>) -> Result<(), SelectionError> {
        if let Some(name) = step {
            let exists = self.with_state(|state| state.flow_version.contains_step(name));
            if !exists {
                return Err(SelectionError(name.to_string()));
            }
        }
        self.set_state(|state| {
            state.selected_step = step.map(str::to_string);
            state.right_sidebar = match step {
                Some(_) => RightSidebar::StepSettings,
                None => RightSidebar::None,
            };
        });
        Ok(())
    }

    pub fn set_insert_mention_handler(&self, handler: Option<MentionHandler>) {
        self.set_state(|state| state.insert_mention_handler = handler);
    }

    /// Forward a mention to the registered handler; false when none is set
    pub fn insert_mention(&self, mention: &str) -> bool {
        let handler = self.with_state(|state| state.insert_mention_handler.clone());
        match handler {
            Some(handler) => {
                handler.insert(mention);
                true
            }
            None => false,
        }
    }

    pub(crate) fn ptr_eq(&self, other: &EditorStore) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::flow::types::fixtures::{code, version};
    use crate::flow::types::FlowStatus;

    pub fn flow() -> Flow {
        Flow {
            id: "flow-1".to_string(),
            project_id: "project-1".to_string(),
            folder_id: None,
            status: FlowStatus::Disabled,
            published_version_id: None,
        }
    }

    pub fn store() -> EditorStore {
        EditorStore::new(EditorSessionState::new(
            flow(),
            version(vec![code("step_1"), code("step_2")]),
        ))
    }
}
