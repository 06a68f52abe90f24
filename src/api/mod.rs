/// HTTP API Layer
///
/// This module exposes the editor pipeline to a local UI. It handles:
/// - Opening and closing the editor session
/// - Reading the active session through the registry
/// - Submitting operations and selection changes
/// - Realtime step notifications pushed by the backend

// Session and operation endpoints
pub mod session;

// Realtime push endpoint
pub mod realtime;

// Re-export router builders
pub use realtime::create_realtime_routes;
pub use session::{create_session_routes, AppState};
