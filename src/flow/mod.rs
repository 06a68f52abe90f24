/// Flow model and graph mutation
///
/// Everything about the shape of a workflow graph and how operations change it:
/// - Type definitions (Flow, FlowVersion, Trigger, Action)
/// - The tagged operation catalogue sent to the backend
/// - The pure graph mutator applying an operation to a version

// Flow and step type definitions with traversal helpers
pub mod types;

// Tagged operation requests (one variant per edit kind)
pub mod operations;

// Pure version -> version mutation
pub mod mutation;

// Re-export commonly used types
pub use mutation::{FlowOperationApplier, GraphMutator, MutationError};
pub use operations::{FlowOperationRequest, StepLocation};
pub use types::{Action, ActionKind, Flow, FlowVersion, FlowVersionState, Trigger, TriggerKind};
