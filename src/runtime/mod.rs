/// Runtime primitives
///
/// Background execution support for the editor. Currently the serial
/// operation queue that lands persistence calls in submission order.

// FIFO single-flight task queue with fail-stop halting
pub mod queue;

// Re-export main types
pub use queue::{OperationQueue, QueueError, QueueStatus, QueueTask};
