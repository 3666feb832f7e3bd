/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Snapshot lifecycle passes
//!
//! Two sequential passes over the remote state: copy everything not yet
//! marked as copied, then delete destination snapshots past the retention
//! window. Per-snapshot copy failures are logged and skipped; the run
//! only aborts on listing or authentication failures.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::compute::ComputeApi;
use crate::config::LifecycleConfig;
use crate::error::Result;
use crate::marker::{CopyMarker, TagMarker, COPIED_REGION_TAG};
use crate::snapshot::CopyRequest;

/// Orchestrates the copy and retention passes for one run.
#[derive(Debug)]
pub struct SnapshotManager {
    api: Arc<dyn ComputeApi>,
    marker: Arc<dyn CopyMarker>,
    config: LifecycleConfig,
}

impl SnapshotManager {
    /// Manager with the default tag-based idempotency marker.
    pub fn new(api: Arc<dyn ComputeApi>, config: LifecycleConfig) -> Self {
        let marker: Arc<dyn CopyMarker> = Arc::new(TagMarker::new(
            api.clone(),
            config.resource_group.clone(),
            config.destination_region.clone(),
        ));
        Self::with_marker(api, marker, config)
    }

    /// Manager with a custom idempotency store.
    pub fn with_marker(
        api: Arc<dyn ComputeApi>,
        marker: Arc<dyn CopyMarker>,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            api,
            marker,
            config,
        }
    }

    /// Run the copy pass, then the deletion pass unless configured off.
    pub async fn run(&self) -> Result<()> {
        self.copy_snapshots().await?;

        if self.config.skip_deletion {
            info!("skipping deletion of expired snapshots");
            return Ok(());
        }

        self.delete_snapshots().await
    }

    /// Copy every not-yet-copied source snapshot to the destination
    /// resource group and mark confirmed copies on the source.
    pub async fn copy_snapshots(&self) -> Result<()> {
        info!(
            resource_group = %self.config.resource_group,
            "fetching disk snapshots to copy"
        );
        let snapshots = self.api.list_snapshots(&self.config.resource_group).await?;

        if snapshots.is_empty() {
            info!(
                resource_group = %self.config.resource_group,
                "no snapshots found"
            );
            return Ok(());
        }

        for snapshot in snapshots {
            if self.marker.is_copied(&snapshot) {
                info!(
                    snapshot = %snapshot.name,
                    region = snapshot.tag(COPIED_REGION_TAG).unwrap_or("unknown"),
                    "snapshot already copied"
                );
                continue;
            }

            let destination_name =
                format!("{}{}", self.config.snapshot_name_prefix, snapshot.name);
            info!(
                snapshot = %snapshot.name,
                destination = %destination_name,
                resource_group = %self.config.destination_resource_group,
                region = %self.config.destination_region,
                "beginning incremental copy"
            );

            let request = CopyRequest::incremental_copy(&snapshot, &self.config.destination_region);
            let outcome = self
                .api
                .copy_snapshot(
                    &self.config.destination_resource_group,
                    &destination_name,
                    request,
                )
                .await;

            match outcome {
                Ok(outcome) if outcome.succeeded() => {
                    info!(
                        snapshot = %destination_name,
                        region = %self.config.destination_region,
                        "snapshot provisioned"
                    );
                    if let Err(err) = self.marker.mark_copied(&snapshot.name).await {
                        warn!(
                            snapshot = %snapshot.name,
                            error = %err,
                            "failed to record copy marker"
                        );
                    }
                }
                Ok(outcome) => {
                    warn!(
                        snapshot = %destination_name,
                        state = %outcome.state,
                        "copy finished in non-succeeded state"
                    );
                }
                Err(err) => {
                    warn!(snapshot = %destination_name, error = %err, "copy failed");
                }
            }
        }

        Ok(())
    }

    /// Delete destination snapshots older than the retention window.
    ///
    /// Deletes are dispatched without waiting for completion.
    pub async fn delete_snapshots(&self) -> Result<()> {
        let cutoff = Utc::now() - Duration::days(self.config.expire_days);
        self.delete_snapshots_before(cutoff).await
    }

    /// Delete destination snapshots created at or before `cutoff`.
    pub async fn delete_snapshots_before(&self, cutoff: DateTime<Utc>) -> Result<()> {
        info!(
            resource_group = %self.config.destination_resource_group,
            "fetching disk snapshots to delete"
        );
        let snapshots = self
            .api
            .list_snapshots(&self.config.destination_resource_group)
            .await?;

        for snapshot in snapshots {
            match snapshot.properties.time_created {
                Some(created) if created <= cutoff => {
                    info!(
                        snapshot = %snapshot.name,
                        created = %created,
                        resource_group = %self.config.destination_resource_group,
                        "deleting expired snapshot"
                    );
                    self.api
                        .delete_snapshot(&self.config.destination_resource_group, &snapshot.name)
                        .await?;
                }
                Some(created) => {
                    info!(
                        snapshot = %snapshot.name,
                        created = %created,
                        "snapshot not expired"
                    );
                }
                None => {
                    debug!(snapshot = %snapshot.name, "snapshot has no creation time, keeping");
                }
            }
        }

        Ok(())
    }
}
