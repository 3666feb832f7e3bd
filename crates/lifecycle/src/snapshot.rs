/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Resource model for managed-disk snapshots
//!
//! Wire names follow the management API's camelCase payloads; absent
//! fields (tags in particular) deserialize to `None` rather than failing,
//! since an untagged snapshot is the normal never-copied state.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// SKU name pinned for copies; the only redundancy type accepted by every
/// region.
pub const COPY_SKU_NAME: &str = "Standard_LRS";

/// Create option requesting an asynchronous copy from a source snapshot.
pub const CREATE_OPTION_COPY_START: &str = "CopyStart";

/// Terminal (or last observed) provisioning state of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ProvisioningState {
    Succeeded,
    Failed,
    Other(String),
}

impl ProvisioningState {
    /// Whether the remote operation has finished, successfully or not.
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            Self::Other(raw) if matches!(raw.as_str(), "Creating" | "Updating" | "Pending" | "Deleting")
        )
    }
}

impl From<String> for ProvisioningState {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "Succeeded" => Self::Succeeded,
            "Failed" => Self::Failed,
            _ => Self::Other(raw),
        }
    }
}

impl From<ProvisioningState> for String {
    fn from(state: ProvisioningState) -> Self {
        match state {
            ProvisioningState::Succeeded => "Succeeded".to_string(),
            ProvisioningState::Failed => "Failed".to_string(),
            ProvisioningState::Other(raw) => raw,
        }
    }
}

impl fmt::Display for ProvisioningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => f.write_str("Succeeded"),
            Self::Failed => f.write_str("Failed"),
            Self::Other(raw) => f.write_str(raw),
        }
    }
}

/// A managed-disk snapshot as returned by the management API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Fully qualified resource id
    #[serde(default)]
    pub id: String,
    /// Name, unique within its resource group
    pub name: String,
    /// Region the snapshot lives in
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<Sku>,
    #[serde(default)]
    pub properties: SnapshotProperties,
}

impl Snapshot {
    /// Look up a tag value, treating an absent tag map as empty.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .as_ref()
            .and_then(|tags| tags.get(key))
            .map(String::as_str)
    }
}

/// Storage tier information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sku {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
}

/// Snapshot resource properties
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_created: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<ProvisioningState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incremental: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_data: Option<CreationData>,
}

/// How a snapshot was (or is to be) created
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreationData {
    pub create_option: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_resource_id: Option<String>,
}

/// Request body for a cross-region snapshot copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyRequest {
    pub location: String,
    pub sku: Sku,
    pub properties: CopyProperties,
}

/// Properties section of a [`CopyRequest`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyProperties {
    pub creation_data: CreationData,
    pub incremental: bool,
}

impl CopyRequest {
    /// Incremental copy of `source` into `region`.
    ///
    /// The SKU tier is carried over from the source; the SKU name is
    /// pinned to [`COPY_SKU_NAME`] since some regions restrict the choice.
    pub fn incremental_copy(source: &Snapshot, region: &str) -> Self {
        Self {
            location: region.to_string(),
            sku: Sku {
                name: Some(COPY_SKU_NAME.to_string()),
                tier: source.sku.as_ref().and_then(|sku| sku.tier.clone()),
            },
            properties: CopyProperties {
                creation_data: CreationData {
                    create_option: CREATE_OPTION_COPY_START.to_string(),
                    source_resource_id: Some(source.id.clone()),
                },
                incremental: true,
            },
        }
    }
}
