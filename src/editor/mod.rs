/// Editor session layer
///
/// This module holds the state of an open editor and the pipeline that edits it:
/// - Observable per-session store
/// - Registry of the active session for out-of-tree consumers
/// - Update orchestrator (optimistic apply + queued persistence)
/// - Session mount/unmount wiring

// Observable session state container
pub mod store;

// Single-slot active session registry using ArcSwap
pub mod registry;

// Optimistic update orchestration
pub mod updater;

// Session lifecycle
pub mod session;

// Re-export commonly used types
pub use registry::{ActiveSessionObserver, SessionRegistry};
pub use session::{EditorServices, EditorSession};
pub use store::{EditorSessionState, EditorStore, LeftSidebar, RightSidebar, Subscription};
pub use updater::{FlowUpdater, FlowVersionUpdate};
