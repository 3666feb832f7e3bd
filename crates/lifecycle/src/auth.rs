/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Token credentials for the management API
//!
//! Two strategies mirror the usual operator setups: an explicit service
//! principal (client-credentials grant) and an ambient discovery chain
//! (environment triplet, then the `az` CLI, then the instance metadata
//! service).

use std::fmt;
use std::process::Stdio;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use crate::error::{LifecycleError, Result};

const AUTHORITY: &str = "https://login.microsoftonline.com";
const MANAGEMENT_RESOURCE: &str = "https://management.azure.com";
const MANAGEMENT_SCOPE: &str = "https://management.azure.com/.default";
const IMDS_TOKEN_URL: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
const IMDS_API_VERSION: &str = "2018-02-01";

/// Tokens are refreshed this long before their reported expiry.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// A bearer token with its expiry time.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_on: DateTime<Utc>,
}

impl AccessToken {
    /// Whether the token is still usable, with a safety margin.
    pub fn is_fresh(&self) -> bool {
        self.expires_on - Duration::seconds(EXPIRY_MARGIN_SECS) > Utc::now()
    }
}

/// Source of bearer tokens for the management API
#[async_trait]
pub trait TokenCredential: Send + Sync + std::fmt::Debug {
    /// Acquire a token scoped to the management API.
    async fn get_token(&self, http: &reqwest::Client) -> Result<AccessToken>;
}

/// Service-principal credential using the client-credentials grant.
#[derive(Clone)]
pub struct ClientSecretCredential {
    tenant_id: String,
    client_id: String,
    client_secret: String,
}

impl ClientSecretCredential {
    pub fn new(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }
}

impl fmt::Debug for ClientSecretCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSecretCredential")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Deserialize)]
struct OauthTokenResponse {
    access_token: String,
    expires_in: i64,
}

#[async_trait]
impl TokenCredential for ClientSecretCredential {
    async fn get_token(&self, http: &reqwest::Client) -> Result<AccessToken> {
        let url = format!("{AUTHORITY}/{}/oauth2/v2.0/token", self.tenant_id);
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", MANAGEMENT_SCOPE),
        ];

        let response = http.post(&url).form(&params).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LifecycleError::auth(format!(
                "token request failed with {status}: {body}"
            )));
        }

        let token: OauthTokenResponse = response.json().await?;
        Ok(AccessToken {
            token: token.access_token,
            expires_on: Utc::now() + Duration::seconds(token.expires_in),
        })
    }
}

/// Ambient credential discovery: environment, `az` CLI, then IMDS.
#[derive(Debug, Default)]
pub struct DefaultCredential;

#[derive(Deserialize)]
struct AzCliTokenResponse {
    #[serde(rename = "accessToken")]
    access_token: String,
    #[serde(rename = "expires_on", default)]
    expires_on: Option<i64>,
}

#[derive(Deserialize)]
struct ImdsTokenResponse {
    access_token: String,
    // IMDS reports expiry as a string, other endpoints as a number
    expires_in: serde_json::Value,
}

impl DefaultCredential {
    fn from_env() -> Option<ClientSecretCredential> {
        let tenant_id = std::env::var("AZURE_TENANT_ID").ok()?;
        let client_id = std::env::var("AZURE_CLIENT_ID").ok()?;
        let client_secret = std::env::var("AZURE_CLIENT_SECRET").ok()?;
        Some(ClientSecretCredential::new(tenant_id, client_id, client_secret))
    }

    async fn from_azure_cli() -> Result<AccessToken> {
        let output = Command::new("az")
            .args([
                "account",
                "get-access-token",
                "--resource",
                MANAGEMENT_RESOURCE,
                "--output",
                "json",
            ])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|err| LifecycleError::auth(format!("failed to invoke the Azure CLI: {err}")))?;

        if !output.status.success() {
            return Err(LifecycleError::auth(format!(
                "Azure CLI exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let token: AzCliTokenResponse = serde_json::from_slice(&output.stdout)?;
        let expires_on = token
            .expires_on
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .unwrap_or_else(|| Utc::now() + Duration::minutes(45));

        Ok(AccessToken {
            token: token.access_token,
            expires_on,
        })
    }

    async fn from_imds(http: &reqwest::Client) -> Result<AccessToken> {
        let response = http
            .get(IMDS_TOKEN_URL)
            .query(&[
                ("api-version", IMDS_API_VERSION),
                ("resource", MANAGEMENT_RESOURCE),
            ])
            .header("Metadata", "true")
            .timeout(std::time::Duration::from_secs(5))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(LifecycleError::auth(format!(
                "instance metadata service returned {}",
                response.status()
            )));
        }

        let token: ImdsTokenResponse = response.json().await?;
        let expires_in = expiry_seconds(&token.expires_in);
        Ok(AccessToken {
            token: token.access_token,
            expires_on: Utc::now() + Duration::seconds(expires_in),
        })
    }
}

#[async_trait]
impl TokenCredential for DefaultCredential {
    async fn get_token(&self, http: &reqwest::Client) -> Result<AccessToken> {
        if let Some(credential) = Self::from_env() {
            debug!("using service principal from environment");
            return credential.get_token(http).await;
        }

        match Self::from_azure_cli().await {
            Ok(token) => {
                debug!("using token from the Azure CLI");
                return Ok(token);
            }
            Err(err) => debug!(error = %err, "Azure CLI credential unavailable"),
        }

        match Self::from_imds(http).await {
            Ok(token) => {
                debug!("using token from the instance metadata service");
                return Ok(token);
            }
            Err(err) => debug!(error = %err, "managed identity credential unavailable"),
        }

        Err(LifecycleError::auth("no credential source yielded a token"))
    }
}

fn expiry_seconds(value: &serde_json::Value) -> i64 {
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|raw| raw.parse().ok()))
        .unwrap_or(3600)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_freshness() {
        let fresh = AccessToken {
            token: "t".to_string(),
            expires_on: Utc::now() + Duration::minutes(10),
        };
        assert!(fresh.is_fresh());

        // Inside the refresh margin counts as stale
        let expiring = AccessToken {
            token: "t".to_string(),
            expires_on: Utc::now() + Duration::seconds(30),
        };
        assert!(!expiring.is_fresh());

        let expired = AccessToken {
            token: "t".to_string(),
            expires_on: Utc::now() - Duration::minutes(1),
        };
        assert!(!expired.is_fresh());
    }

    #[test]
    fn test_azure_cli_token_parsing() {
        let token: AzCliTokenResponse = serde_json::from_str(
            r#"{
                "accessToken": "cli-token",
                "expiresOn": "2024-05-01 11:30:00.000000",
                "expires_on": 1714563000,
                "subscription": "sub",
                "tenant": "tenant",
                "tokenType": "Bearer"
            }"#,
        )
        .unwrap();
        assert_eq!(token.access_token, "cli-token");
        assert_eq!(token.expires_on, Some(1714563000));
    }

    #[test]
    fn test_imds_expiry_is_string_or_number() {
        assert_eq!(expiry_seconds(&serde_json::json!("3599")), 3599);
        assert_eq!(expiry_seconds(&serde_json::json!(3599)), 3599);
        assert_eq!(expiry_seconds(&serde_json::json!(null)), 3600);
    }

    #[test]
    fn test_client_secret_is_redacted_in_debug() {
        let credential = ClientSecretCredential::new("tenant", "client", "hunter2");
        let rendered = format!("{credential:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }
}
