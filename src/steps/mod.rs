/// Step output caching
///
/// Test-run output lives outside the editor store and is kept fresh by
/// realtime invalidation.

pub mod cache;

pub mod queries;

// Realtime listener evicting cache entries
pub mod invalidation;

pub use cache::{StepOutput, StepOutputCache, StepRunStatus};
pub use invalidation::StepInvalidationListener;
pub use queries::{QueryInvalidator, StepQueryCache, StepQueryKey};
