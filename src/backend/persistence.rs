/// Remote persistence of flow operations
///
/// Every structural edit is replayed against the backend, which stores it and
/// answers with the identifiers and timestamp of the resulting version. The
/// editor only merges those fields; the graph itself stays the locally
/// mutated one.

use crate::flow::operations::FlowOperationRequest;
use crate::flow::types::FlowVersionState;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Server-confirmed fields of the persisted version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedVersion {
    pub id: String,
    pub state: FlowVersionState,
    pub updated: DateTime<Utc>,
}

/// Backend response to a persisted operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedFlow {
    pub version: PersistedVersion,
}

/// Anything able to persist a flow operation
#[async_trait]
pub trait FlowPersistence: Send + Sync {
    async fn persist(&self, flow_id: &str, operation: &FlowOperationRequest) -> Result<PersistedFlow>;
}

/// reqwest-backed client for the flows API
#[derive(Debug, Clone)]
pub struct HttpFlowPersistence {
    client: reqwest::Client,
    api_url: String,
    api_token: Option<String>,
}

impl HttpFlowPersistence {
    /// Build a client for `api_url` (e.g. `http://localhost:3000/api`)
    ///
    /// Without a timeout a started call is never abandoned.
    pub fn new(
        api_url: impl Into<String>,
        api_token: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            api_token,
        })
    }

    fn flow_url(&self, flow_id: &str) -> String {
        format!("{}/v1/flows/{}", self.api_url, flow_id)
    }
}

#[async_trait]
impl FlowPersistence for HttpFlowPersistence {
    async fn persist(&self, flow_id: &str, operation: &FlowOperationRequest) -> Result<PersistedFlow> {
        let url = self.flow_url(flow_id);
        tracing::debug!("🌍 POST {} ({})", url, operation.type_name());

        let mut request = self.client.post(&url).json(operation);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to send {} to {}", operation.type_name(), url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "Backend rejected {} for flow {}: {} {}",
                operation.type_name(),
                flow_id,
                status,
                body
            );
        }

        let persisted = response
            .json::<PersistedFlow>()
            .await
            .context("Failed to decode persisted flow response")?;

        tracing::debug!(
            "💾 Flow {} persisted as version {}",
            flow_id,
            persisted.version.id
        );
        Ok(persisted)
    }
}
