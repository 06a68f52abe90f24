/// Active session registry
///
/// Some consumers (floating assistant panels, the local HTTP API) live outside
/// the component tree that owns an editor session but still need to read and
/// follow its state. The registry holds a single atomic slot pointing at the
/// currently active store, swapped with ArcSwap on mount/unmount, plus a set
/// of listeners told whenever the slot changes.
///
/// One registry is built per application and handed to whoever needs
/// cross-tree access; there is no process-wide global.

use crate::editor::store::{EditorSessionState, EditorStore, ListenerSet, Subscription};
use arc_swap::ArcSwapOption;
use std::sync::{Arc, Mutex, PoisonError, Weak};

pub type RegistryListener = Arc<dyn Fn(Option<&EditorStore>) + Send + Sync>;

/// Lock-free single-slot registry of the active editor store
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    /// Currently active store; `None` when no editor is open
    active: ArcSwapOption<EditorStore>,
    listeners: ListenerSet<RegistryListener>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("active", &self.active().map(|store| store.id()))
            .field("listeners", &self.inner.listeners.len())
            .finish()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                active: ArcSwapOption::empty(),
                listeners: ListenerSet::new(),
            }),
        }
    }

    /// Make `store` the active session
    ///
    /// Supersedes whatever was active before; the previous session does not
    /// need to hand off.
    pub fn mount(&self, store: &EditorStore) {
        let previous = self.inner.active.swap(Some(Arc::new(store.clone())));
        match previous {
            Some(previous) if !previous.ptr_eq(store) => {
                tracing::info!(
                    "🔀 Editor session {} superseded by {}",
                    previous.id(),
                    store.id()
                );
            }
            _ => tracing::info!("📌 Editor session {} mounted", store.id()),
        }
        self.notify(Some(store));
    }

    /// Clear the slot if `store` is still the active session
    ///
    /// Returns false (and notifies nobody) when another session has already
    /// superseded it.
    pub fn unmount(&self, store: &EditorStore) -> bool {
        let previous = self.inner.active.rcu(|current| match current {
            Some(active) if active.ptr_eq(store) => None,
            other => other.clone(),
        });

        let unmounted = previous.as_ref().is_some_and(|active| active.ptr_eq(store));
        if unmounted {
            tracing::info!("📤 Editor session {} unmounted", store.id());
            self.notify(None);
        } else {
            tracing::debug!("⏭️ Editor session {} was not active, nothing to unmount", store.id());
        }
        unmounted
    }

    /// Resolve the active store (lock-free read)
    pub fn active(&self) -> Option<EditorStore> {
        self.inner.active.load_full().map(|store| (*store).clone())
    }

    /// Snapshot of the active session's state
    pub fn active_state(&self) -> Option<EditorSessionState> {
        self.active().map(|store| store.get_state())
    }

    /// Register a listener called with the new active store on every mount
    /// and unmount
    pub fn on_change(
        &self,
        listener: impl Fn(Option<&EditorStore>) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.inner.listeners.insert(Arc::new(listener));
        let registry: Weak<RegistryInner> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(registry) = registry.upgrade() {
                registry.listeners.remove(id);
            }
        })
    }

    /// Follow whichever session is active
    ///
    /// `listener` is called immediately with the current state (or `None`),
    /// then with every state change of the active store, and again whenever a
    /// session mounts or unmounts. Switching sessions moves the underlying
    /// store subscription to the new store.
    pub fn observe(
        &self,
        listener: impl Fn(Option<&EditorSessionState>) + Send + Sync + 'static,
    ) -> ActiveSessionObserver {
        let listener: Arc<dyn Fn(Option<&EditorSessionState>) + Send + Sync> = Arc::new(listener);
        let store_subscription: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let attach = {
            let listener = Arc::clone(&listener);
            let store_subscription = Arc::clone(&store_subscription);
            Arc::new(move |store: Option<&EditorStore>| {
                let replaced = {
                    let mut slot = store_subscription
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner);
                    let next = store.map(|store| {
                        let forward = Arc::clone(&listener);
                        store.subscribe(move |state| forward(Some(state)))
                    });
                    std::mem::replace(&mut *slot, next)
                };
                // Unsubscribe from the previous store outside the slot lock.
                drop(replaced);

                match store {
                    Some(store) => listener(Some(&store.get_state())),
                    None => listener(None),
                }
            })
        };

        attach(self.active().as_ref());
        let registry_subscription = {
            let attach = Arc::clone(&attach);
            self.on_change(move |store| attach(store))
        };

        ActiveSessionObserver {
            registry: self.clone(),
            _registry_subscription: registry_subscription,
            _store_subscription: store_subscription,
        }
    }

    fn notify(&self, store: Option<&EditorStore>) {
        for listener in self.inner.listeners.snapshot() {
            listener(store);
        }
    }
}

/// Subscription following the active session across mounts
///
/// Dropping it detaches from both the registry and the current store.
pub struct ActiveSessionObserver {
    registry: SessionRegistry,
    _registry_subscription: Subscription,
    _store_subscription: Arc<Mutex<Option<Subscription>>>,
}

impl ActiveSessionObserver {
    /// Resolve the active session now; `None` when no editor is open
    pub fn current(&self) -> Option<EditorSessionState> {
        self.registry.active_state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::store::fixtures::store;

    fn recorder() -> (
        Arc<Mutex<Vec<Option<Option<String>>>>>,
        impl Fn(Option<&EditorSessionState>) + Send + Sync + 'static,
    ) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let listener = move |state: Option<&EditorSessionState>| {
            sink.lock()
                .unwrap()
                .push(state.map(|state| state.selected_step.clone()));
        };
        (seen, listener)
    }

    #[test]
    fn observer_follows_mount_updates_and_unmount() {
        let registry = SessionRegistry::new();
        let (seen, listener) = recorder();
        let observer = registry.observe(listener);
        assert!(observer.current().is_none());

        let session = store();
        registry.mount(&session);
        session.select_step(Some("step_1")).unwrap();
        assert_eq!(
            observer.current().and_then(|state| state.selected_step),
            Some("step_1".to_string())
        );

        assert!(registry.unmount(&session));
        session.select_step(Some("step_2")).unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                None,
                Some(None),
                Some(Some("step_1".to_string())),
                None,
            ]
        );
        assert!(observer.current().is_none());
        // the observer let go of the unmounted store
        assert_eq!(session.subscriber_count(), 0);
    }

    #[test]
    fn mounting_supersedes_previous_session() {
        let registry = SessionRegistry::new();
        let first = store();
        let second = store();

        registry.mount(&first);
        registry.mount(&second);
        assert_eq!(registry.active().map(|s| s.id()), Some(second.id()));

        // a late unmount from the superseded session leaves the new one active
        assert!(!registry.unmount(&first));
        assert_eq!(registry.active().map(|s| s.id()), Some(second.id()));
    }

    #[test]
    fn observer_moves_subscription_to_new_session() {
        let registry = SessionRegistry::new();
        let first = store();
        let second = store();
        let (seen, listener) = recorder();

        registry.mount(&first);
        let _observer = registry.observe(listener);
        registry.mount(&second);

        first.select_step(Some("step_1")).unwrap();
        second.select_step(Some("step_2")).unwrap();

        assert_eq!(first.subscriber_count(), 0);
        assert_eq!(second.subscriber_count(), 1);
        assert_eq!(
            seen.lock().unwrap().last().cloned(),
            Some(Some(Some("step_2".to_string())))
        );
    }

    #[test]
    fn dropping_observer_detaches_everything() {
        let registry = SessionRegistry::new();
        let session = store();
        registry.mount(&session);

        let (_, listener) = recorder();
        let observer = registry.observe(listener);
        assert_eq!(session.subscriber_count(), 1);

        drop(observer);
        assert_eq!(session.subscriber_count(), 0);
        assert_eq!(registry.inner.listeners.len(), 0);
    }
}
