/// Step output cache
///
/// Test-run output arrives at a much higher rate than structural edits, so it
/// is kept out of the editor store: updating it never notifies store
/// subscribers. The cache is eventually consistent with the store and is never
/// authoritative for graph structure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Outcome of the last test run of a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepRunStatus {
    Succeeded,
    Failed,
}

/// Last known test output of a step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepOutput {
    pub status: StepRunStatus,
    #[serde(default)]
    pub input: Value,
    #[serde(default)]
    pub output: Value,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    pub tested_at: DateTime<Utc>,
}

impl StepOutput {
    pub fn succeeded(output: Value) -> Self {
        Self {
            status: StepRunStatus::Succeeded,
            input: Value::Null,
            output,
            duration_ms: None,
            tested_at: Utc::now(),
        }
    }
}

#[derive(Debug, Default)]
struct CacheState {
    data: HashMap<String, StepOutput>,
    /// Expansion flags keyed by step id or by a nested node key under it
    /// (e.g. `step_1.items[0]`)
    expanded: HashMap<String, bool>,
    stale_steps: HashSet<String>,
}

/// Shared in-memory step output cache
///
/// Cloning yields another handle to the same cache.
#[derive(Debug, Clone, Default)]
pub struct StepOutputCache {
    inner: Arc<RwLock<CacheState>>,
}

impl StepOutputCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_step_data(&self, step_id: &str) -> Option<StepOutput> {
        self.read().data.get(step_id).cloned()
    }

    /// Store fresh output; the step is no longer stale
    pub fn set_step_data(&self, step_id: &str, output: StepOutput) {
        let mut state = self.write();
        state.data.insert(step_id.to_string(), output);
        state.stale_steps.remove(step_id);
    }

    /// Forget a step's output and every expansion flag keyed under it
    pub fn clear_step(&self, step_id: &str) {
        let mut state = self.write();
        state.data.remove(step_id);
        state.expanded.retain(|key, _| !belongs_to_step(key, step_id));
        tracing::debug!("🧹 Cleared cached output for step: {}", step_id);
    }

    /// Expansion flag of a node; collapsed unless set
    pub fn get_expanded(&self, key: &str) -> bool {
        self.read().expanded.get(key).copied().unwrap_or(false)
    }

    pub fn set_expanded(&self, key: &str, expanded: bool) {
        self.write().expanded.insert(key.to_string(), expanded);
    }

    /// Collapse everything under a step while keeping its output
    pub fn reset_expanded_for_step(&self, step_id: &str) {
        self.write()
            .expanded
            .retain(|key, _| !belongs_to_step(key, step_id));
    }

    /// Flag a step's output as needing a refetch without fetching now
    pub fn mark_stale(&self, step_id: &str) {
        self.write().stale_steps.insert(step_id.to_string());
    }

    pub fn is_stale(&self, step_id: &str) -> bool {
        self.read().stale_steps.contains(step_id)
    }

    pub fn stale_steps(&self) -> Vec<String> {
        let mut steps: Vec<String> = self.read().stale_steps.iter().cloned().collect();
        steps.sort();
        steps
    }

    pub fn clear_all(&self) {
        let mut state = self.write();
        state.data.clear();
        state.expanded.clear();
        state.stale_steps.clear();
    }

    pub fn len(&self) -> usize {
        self.read().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> RwLockReadGuard<'_, CacheState> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, CacheState> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// True when `key` is the step itself or a node nested under it
///
/// Step ids are identifiers (`step_1`), so a nested key continues with a
/// separator such as `.`, `/` or `[`. Requiring the separator keeps `step_1`
/// from matching `step_10`.
fn belongs_to_step(key: &str, step_id: &str) -> bool {
    match key.strip_prefix(step_id) {
        Some("") => true,
        Some(rest) => rest
            .chars()
            .next()
            .is_some_and(|c| !(c.is_alphanumeric() || c == '_' || c == '-')),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn clear_step_evicts_data_and_nested_expansions_only() {
        let cache = StepOutputCache::new();
        cache.set_step_data("a", StepOutput::succeeded(json!({ "x": 1 })));
        cache.set_step_data("b", StepOutput::succeeded(json!({ "y": 2 })));
        cache.set_expanded("a", true);
        cache.set_expanded("a.child", true);
        cache.set_expanded("a.child.grandchild", true);
        cache.set_expanded("b", true);

        cache.clear_step("a");

        assert!(cache.get_step_data("a").is_none());
        assert!(!cache.get_expanded("a"));
        assert!(!cache.get_expanded("a.child"));
        assert!(!cache.get_expanded("a.child.grandchild"));
        assert!(cache.get_step_data("b").is_some());
        assert!(cache.get_expanded("b"));
    }

    #[test]
    fn clear_step_does_not_touch_steps_sharing_a_name_prefix() {
        let cache = StepOutputCache::new();
        cache.set_step_data("step_10", StepOutput::succeeded(json!(10)));
        cache.set_expanded("step_10.output", true);
        cache.set_expanded("step_1[0]", true);

        cache.clear_step("step_1");

        assert!(cache.get_step_data("step_10").is_some());
        assert!(cache.get_expanded("step_10.output"));
        assert!(!cache.get_expanded("step_1[0]"));
    }

    #[test]
    fn reset_expanded_keeps_output() {
        let cache = StepOutputCache::new();
        cache.set_step_data("a", StepOutput::succeeded(json!([1, 2])));
        cache.set_expanded("a", true);
        cache.set_expanded("a/0", true);

        cache.reset_expanded_for_step("a");

        assert!(cache.get_step_data("a").is_some());
        assert!(!cache.get_expanded("a"));
        assert!(!cache.get_expanded("a/0"));
    }

    #[test]
    fn fresh_data_clears_stale_mark() {
        let cache = StepOutputCache::new();
        cache.mark_stale("a");
        cache.mark_stale("b");
        assert_eq!(cache.stale_steps(), vec!["a".to_string(), "b".to_string()]);

        cache.set_step_data("a", StepOutput::succeeded(json!(null)));
        assert!(!cache.is_stale("a"));
        assert!(cache.is_stale("b"));

        cache.clear_all();
        assert!(cache.is_empty());
        assert!(cache.stale_steps().is_empty());
    }
}
