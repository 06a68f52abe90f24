/// Backend integration
///
/// The two channels the editor shares with the flows backend:
/// - Persistence of operations over HTTP (reqwest)
/// - Realtime step notifications fanned out over a broadcast channel

// Operation persistence client
pub mod persistence;

// Realtime notification hub
pub mod realtime;

pub use persistence::{FlowPersistence, HttpFlowPersistence, PersistedFlow, PersistedVersion};
pub use realtime::{RealtimeChannel, RealtimeEvent, RealtimeEventKind};
