/// flowedit: flow-version mutation pipeline for a visual workflow editor
///
/// This library applies structural edits to a workflow graph optimistically,
/// persists them through a strictly ordered operation queue and keeps cached
/// step output fresh through realtime invalidation.

// Core configuration and setup
pub mod config;

// Flow model - type definitions, operation catalogue and graph mutation
pub mod flow;

// Runtime primitives - serial operation queue
pub mod runtime;

// Editor sessions - store, active-session registry, update orchestration
pub mod editor;

// Step output cache and realtime invalidation
pub mod steps;

// Flows backend - persistence client and realtime channel
pub mod backend;

// HTTP API layer - local session endpoints and realtime push
pub mod api;

// Server setup and initialization
pub mod server;

// Re-export commonly used types for external consumers
pub use editor::{EditorServices, EditorSession, EditorStore, SessionRegistry};
pub use flow::{FlowOperationRequest, FlowVersion, GraphMutator};
pub use runtime::OperationQueue;
pub use server::start_server;
pub use steps::StepOutputCache;
