//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use flowedit::backend::persistence::{FlowPersistence, PersistedFlow, PersistedVersion};
use flowedit::backend::realtime::RealtimeChannel;
use flowedit::editor::session::EditorServices;
use flowedit::flow::mutation::FlowOperationApplier;
use flowedit::flow::operations::FlowOperationRequest;
use flowedit::flow::types::{
    Action, ActionKind, Flow, FlowStatus, FlowVersion, FlowVersionState, Trigger, TriggerKind,
};
use flowedit::steps::queries::StepQueryCache;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One observed persistence call
#[derive(Debug, Clone, PartialEq)]
pub struct PersistCall {
    pub flow_id: String,
    pub kind: &'static str,
    pub started_at: tokio::time::Instant,
    pub finished_at: Option<tokio::time::Instant>,
}

/// Persistence double that records calls, waits `delay` and can fail one call
#[derive(Default)]
pub struct RecordingPersistence {
    pub calls: Mutex<Vec<PersistCall>>,
    pub delay: Duration,
    /// 1-based index of the call that fails
    pub fail_call: Option<usize>,
}

impl RecordingPersistence {
    pub fn delayed(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            ..Default::default()
        })
    }

    pub fn failing_on(call: usize, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            fail_call: Some(call),
            ..Default::default()
        })
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().iter().map(|call| call.kind).collect()
    }

    pub fn calls(&self) -> Vec<PersistCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl FlowPersistence for RecordingPersistence {
    async fn persist(
        &self,
        flow_id: &str,
        operation: &FlowOperationRequest,
    ) -> anyhow::Result<PersistedFlow> {
        let index = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(PersistCall {
                flow_id: flow_id.to_string(),
                kind: operation.type_name(),
                started_at: tokio::time::Instant::now(),
                finished_at: None,
            });
            calls.len()
        };

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.calls.lock().unwrap()[index - 1].finished_at = Some(tokio::time::Instant::now());

        if self.fail_call == Some(index) {
            anyhow::bail!("backend returned 500 for call {index}");
        }
        Ok(PersistedFlow {
            version: PersistedVersion {
                id: format!("v{index}"),
                state: FlowVersionState::Draft,
                updated: Utc::now(),
            },
        })
    }
}

pub fn services(persistence: Arc<RecordingPersistence>) -> EditorServices {
    EditorServices {
        persistence,
        mutator: Arc::new(FlowOperationApplier::new()),
        realtime: RealtimeChannel::new(16),
        queries: Arc::new(StepQueryCache::new()),
    }
}

pub fn flow() -> Flow {
    Flow {
        id: "flow-1".to_string(),
        project_id: "project-1".to_string(),
        folder_id: None,
        status: FlowStatus::Disabled,
        published_version_id: None,
    }
}

/// Draft version with a webhook trigger followed by code steps named `names`
pub fn version(names: &[&str]) -> FlowVersion {
    let chain = names.iter().rev().fold(None, |next, name| {
        let mut action = Action::new(*name, format!("Code {name}"), ActionKind::Code);
        action.next_action = next;
        Some(Box::new(action))
    });

    FlowVersion {
        id: "v0".to_string(),
        flow_id: "flow-1".to_string(),
        display_name: "Untitled".to_string(),
        trigger: Trigger {
            name: "trigger".to_string(),
            display_name: "Catch Webhook".to_string(),
            kind: TriggerKind::Webhook,
            settings: serde_json::json!({}),
            valid: true,
            next_action: chain,
        },
        valid: true,
        state: FlowVersionState::Draft,
        updated: Utc::now(),
    }
}
