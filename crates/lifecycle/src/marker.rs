/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Idempotency record for copied snapshots
//!
//! The remote resource is the only durable state, so the record of "this
//! snapshot was already copied" lives on the source snapshot itself as a
//! pair of tags.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::compute::ComputeApi;
use crate::error::Result;
use crate::snapshot::Snapshot;

/// Tag key recording that a snapshot has been copied cross-region.
pub const CROSS_REGION_COPY_TAG: &str = "CrossRegionCopy";
/// Tag key recording which region received the copy.
pub const COPIED_REGION_TAG: &str = "CopiedRegion";
/// Value marking a confirmed copy.
pub const COPY_SUCCESS: &str = "Success";

/// Where confirmed copies are recorded and looked up
#[async_trait]
pub trait CopyMarker: Send + Sync + std::fmt::Debug {
    /// Whether this snapshot was already copied.
    fn is_copied(&self, snapshot: &Snapshot) -> bool;

    /// Record a confirmed copy for the named source snapshot.
    async fn mark_copied(&self, snapshot_name: &str) -> Result<()>;
}

/// Marker stored as resource tags on the source snapshot.
#[derive(Debug)]
pub struct TagMarker {
    api: Arc<dyn ComputeApi>,
    resource_group: String,
    marker_tags: HashMap<String, String>,
}

impl TagMarker {
    pub fn new(
        api: Arc<dyn ComputeApi>,
        resource_group: impl Into<String>,
        destination_region: impl Into<String>,
    ) -> Self {
        let marker_tags = HashMap::from([
            (CROSS_REGION_COPY_TAG.to_string(), COPY_SUCCESS.to_string()),
            (COPIED_REGION_TAG.to_string(), destination_region.into()),
        ]);

        Self {
            api,
            resource_group: resource_group.into(),
            marker_tags,
        }
    }
}

#[async_trait]
impl CopyMarker for TagMarker {
    fn is_copied(&self, snapshot: &Snapshot) -> bool {
        snapshot.tag(CROSS_REGION_COPY_TAG) == Some(COPY_SUCCESS)
    }

    async fn mark_copied(&self, snapshot_name: &str) -> Result<()> {
        // Re-fetch right before mutating so concurrent tag changes are not
        // overwritten with stale data.
        let snapshot = self
            .api
            .get_snapshot(&self.resource_group, snapshot_name)
            .await?;

        let mut tags = snapshot.tags.unwrap_or_default();
        for (key, value) in &self.marker_tags {
            tags.insert(key.clone(), value.clone());
        }

        let outcome = self
            .api
            .update_tags(&self.resource_group, snapshot_name, tags)
            .await?;

        if outcome.succeeded() {
            info!(snapshot = snapshot_name, "copy marker tags applied");
        } else {
            warn!(
                snapshot = snapshot_name,
                state = %outcome.state,
                "tag update finished in unexpected state"
            );
        }

        Ok(())
    }
}
