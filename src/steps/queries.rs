/// Step query cache
///
/// Sample-data queries fetched for a step are keyed by the flow version and
/// step they belong to. Realtime invalidation drops those entries so the next
/// read refetches instead of showing output from before a background test run.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Key of a step-scoped query
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StepQueryKey {
    pub flow_version_id: String,
    pub step_id: String,
}

impl StepQueryKey {
    pub fn new(flow_version_id: impl Into<String>, step_id: impl Into<String>) -> Self {
        Self {
            flow_version_id: flow_version_id.into(),
            step_id: step_id.into(),
        }
    }
}

/// Anything holding step-scoped query results that can be invalidated
pub trait QueryInvalidator: Send + Sync {
    /// Drop the result of one `(flow_version_id, step_id)` query
    fn invalidate(&self, key: &StepQueryKey);

    /// Drop every query of a flow version
    fn invalidate_version(&self, flow_version_id: &str);
}

/// In-memory query result cache
#[derive(Debug, Clone, Default)]
pub struct StepQueryCache {
    entries: Arc<RwLock<HashMap<StepQueryKey, Value>>>,
}

impl StepQueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &StepQueryKey) -> Option<Value> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn insert(&self, key: StepQueryKey, value: Value) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, value);
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl QueryInvalidator for StepQueryCache {
    fn invalidate(&self, key: &StepQueryKey) {
        let removed = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        if removed.is_some() {
            tracing::debug!(
                "♻️ Invalidated query for step {} in version {}",
                key.step_id,
                key.flow_version_id
            );
        }
    }

    fn invalidate_version(&self, flow_version_id: &str) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|key, _| key.flow_version_id != flow_version_id);
    }
}
