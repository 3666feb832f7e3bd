/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Configuration for a lifecycle run

use serde::{Deserialize, Serialize};

/// Immutable configuration for one lifecycle run.
///
/// Built once at startup from the command line and environment, then
/// passed by value into the manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Subscription holding both resource groups
    pub subscription_id: String,
    /// Resource group whose snapshots are copied
    pub resource_group: String,
    /// Resource group receiving the copies
    pub destination_resource_group: String,
    /// Region receiving the copies
    pub destination_region: String,
    /// Name prefix for newly copied snapshots
    pub snapshot_name_prefix: String,
    /// Destination snapshots older than this many days are deleted
    pub expire_days: i64,
    /// Skip the deletion pass entirely
    pub skip_deletion: bool,
}

impl LifecycleConfig {
    /// Default retention window in days.
    pub const DEFAULT_EXPIRE_DAYS: i64 = 30;
    /// Default name prefix for copied snapshots.
    pub const DEFAULT_NAME_PREFIX: &'static str = "copy-";
}
