/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! REST implementation of [`ComputeApi`] against the Azure Resource
//! Manager snapshot endpoints
//!
//! Long-running create/update calls are resolved by polling the resource
//! until its provisioning state settles; only the terminal
//! [`OperationOutcome`] is surfaced to callers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header::AUTHORIZATION, header::RETRY_AFTER, Method, Response, StatusCode};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::debug;

use crate::auth::{AccessToken, TokenCredential};
use crate::compute::{ComputeApi, OperationOutcome};
use crate::error::{LifecycleError, Result};
use crate::snapshot::{CopyRequest, ProvisioningState, Snapshot};

const DEFAULT_ENDPOINT: &str = "https://management.azure.com";
const API_VERSION: &str = "2023-04-02";
const POLL_INTERVAL: Duration = Duration::from_secs(10);
/// Upper bound on polling a single long-running operation (~1 hour).
const MAX_POLL_ATTEMPTS: u32 = 360;

/// Authenticated client for the resource manager's snapshot API.
#[derive(Debug)]
pub struct ArmComputeClient {
    http: reqwest::Client,
    credential: Arc<dyn TokenCredential>,
    subscription_id: String,
    endpoint: String,
    token: RwLock<Option<AccessToken>>,
}

#[derive(Debug, Deserialize)]
struct SnapshotList {
    #[serde(default)]
    value: Vec<Snapshot>,
    #[serde(rename = "nextLink", default)]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ArmErrorBody {
    error: Option<ArmErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ArmErrorDetail {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

impl ArmComputeClient {
    /// Create a client for one subscription.
    pub fn new(
        subscription_id: impl Into<String>,
        credential: Arc<dyn TokenCredential>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            http,
            credential,
            subscription_id: subscription_id.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            token: RwLock::new(None),
        })
    }

    /// Override the management endpoint (sovereign clouds, tests).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    /// Acquire and cache a token, verifying the credential works.
    pub async fn authenticate(&self) -> Result<()> {
        self.bearer().await.map(|_| ())
    }

    fn collection_url(&self, resource_group: &str) -> String {
        format!(
            "{}/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Compute/snapshots?api-version={}",
            self.endpoint, self.subscription_id, resource_group, API_VERSION
        )
    }

    fn snapshot_url(&self, resource_group: &str, name: &str) -> String {
        format!(
            "{}/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Compute/snapshots/{}?api-version={}",
            self.endpoint, self.subscription_id, resource_group, name, API_VERSION
        )
    }

    async fn bearer(&self) -> Result<String> {
        {
            let cached = self.token.read().await;
            if let Some(token) = cached.as_ref().filter(|token| token.is_fresh()) {
                return Ok(token.token.clone());
            }
        }

        let fresh = self.credential.get_token(&self.http).await?;
        let value = fresh.token.clone();
        *self.token.write().await = Some(fresh);
        Ok(value)
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<serde_json::Value>,
    ) -> Result<Response> {
        let bearer = self.bearer().await?;
        let mut request = self
            .http
            .request(method, url)
            .header(AUTHORIZATION, format!("Bearer {bearer}"));

        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(api_error(response).await)
        }
    }

    /// Poll a snapshot until its provisioning state settles. Gives up
    /// after [`MAX_POLL_ATTEMPTS`] and reports the last observed state.
    async fn wait_for_terminal_state(
        &self,
        resource_group: &str,
        name: &str,
    ) -> Result<OperationOutcome> {
        let mut attempt = 0u32;
        loop {
            let snapshot = self.get_snapshot(resource_group, name).await?;
            let state = snapshot
                .properties
                .provisioning_state
                .clone()
                .unwrap_or_else(|| ProvisioningState::Other("Unknown".to_string()));

            if state.is_terminal() || attempt >= MAX_POLL_ATTEMPTS {
                return Ok(OperationOutcome {
                    state,
                    snapshot: Some(snapshot),
                });
            }

            debug!(snapshot = name, state = %state, attempt, "operation still in flight");
            attempt += 1;
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl ComputeApi for ArmComputeClient {
    async fn list_snapshots(&self, resource_group: &str) -> Result<Vec<Snapshot>> {
        let mut url = self.collection_url(resource_group);
        let mut snapshots = Vec::new();

        loop {
            let page: SnapshotList = self.send(Method::GET, &url, None).await?.json().await?;
            snapshots.extend(page.value);
            match page.next_link {
                Some(next) if !next.is_empty() => url = next,
                _ => break,
            }
        }

        Ok(snapshots)
    }

    async fn get_snapshot(&self, resource_group: &str, name: &str) -> Result<Snapshot> {
        let url = self.snapshot_url(resource_group, name);
        Ok(self.send(Method::GET, &url, None).await?.json().await?)
    }

    async fn copy_snapshot(
        &self,
        resource_group: &str,
        name: &str,
        request: CopyRequest,
    ) -> Result<OperationOutcome> {
        let url = self.snapshot_url(resource_group, name);
        let body = serde_json::to_value(&request)?;

        let response = self.send(Method::PUT, &url, Some(body)).await?;
        if let Some(delay) = retry_after(&response) {
            tokio::time::sleep(delay).await;
        }

        self.wait_for_terminal_state(resource_group, name).await
    }

    async fn update_tags(
        &self,
        resource_group: &str,
        name: &str,
        tags: HashMap<String, String>,
    ) -> Result<OperationOutcome> {
        let url = self.snapshot_url(resource_group, name);
        let body = serde_json::json!({ "tags": tags });

        let response = self.send(Method::PATCH, &url, Some(body)).await?;
        if let Some(delay) = retry_after(&response) {
            tokio::time::sleep(delay).await;
        }

        self.wait_for_terminal_state(resource_group, name).await
    }

    async fn delete_snapshot(&self, resource_group: &str, name: &str) -> Result<()> {
        let url = self.snapshot_url(resource_group, name);
        let response = self.send(Method::DELETE, &url, None).await?;
        debug!(snapshot = name, status = %response.status(), "delete dispatched");
        Ok(())
    }
}

fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

async fn api_error(response: Response) -> LifecycleError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    let (code, message) = serde_json::from_str::<ArmErrorBody>(&text)
        .ok()
        .and_then(|body| body.error)
        .map(|detail| (detail.code, detail.message))
        .unwrap_or_else(|| ("Unknown".to_string(), text));

    if status == StatusCode::UNAUTHORIZED {
        LifecycleError::auth(format!("management API rejected the token: {message}"))
    } else {
        LifecycleError::Api {
            status: status.as_u16(),
            code,
            message,
        }
    }
}
