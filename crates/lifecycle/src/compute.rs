/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Remote compute-management surface used by the lifecycle passes

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;
use crate::snapshot::{CopyRequest, ProvisioningState, Snapshot};

/// Terminal result of a long-running snapshot operation.
///
/// Callers only ever see a settled state; no polling handle crosses this
/// boundary.
#[derive(Debug, Clone)]
pub struct OperationOutcome {
    pub state: ProvisioningState,
    pub snapshot: Option<Snapshot>,
}

impl OperationOutcome {
    pub fn succeeded(&self) -> bool {
        self.state == ProvisioningState::Succeeded
    }
}

/// Compute-management operations consumed by the lifecycle manager
#[async_trait]
pub trait ComputeApi: Send + Sync + std::fmt::Debug {
    /// List every snapshot in a resource group.
    async fn list_snapshots(&self, resource_group: &str) -> Result<Vec<Snapshot>>;

    /// Fetch a single snapshot by name.
    async fn get_snapshot(&self, resource_group: &str, name: &str) -> Result<Snapshot>;

    /// Create or update a snapshot as a copy and wait until it reaches a
    /// terminal provisioning state.
    async fn copy_snapshot(
        &self,
        resource_group: &str,
        name: &str,
        request: CopyRequest,
    ) -> Result<OperationOutcome>;

    /// Replace a snapshot's tag set and wait for the terminal state.
    async fn update_tags(
        &self,
        resource_group: &str,
        name: &str,
        tags: HashMap<String, String>,
    ) -> Result<OperationOutcome>;

    /// Dispatch a delete without waiting for completion.
    async fn delete_snapshot(&self, resource_group: &str, name: &str) -> Result<()>;
}
