/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! # Snapshot Lifecycle
//!
//! Cross-region lifecycle management for managed-disk snapshots:
//!
//! - Incremental copies from a source resource group to a destination
//!   resource group and region
//! - Tag-based idempotency markers on source snapshots, so re-runs never
//!   re-copy confirmed snapshots
//! - Retention-based deletion of aged destination copies
//!
//! All durable state lives in the remote provider as resource tags and
//! timestamps; a run is a sequential pass over that state.

pub mod auth;
pub mod azure;
pub mod compute;
pub mod config;
pub mod error;
pub mod manager;
pub mod marker;
pub mod snapshot;

pub use auth::{AccessToken, ClientSecretCredential, DefaultCredential, TokenCredential};
pub use azure::ArmComputeClient;
pub use compute::{ComputeApi, OperationOutcome};
pub use config::LifecycleConfig;
pub use error::{LifecycleError, Result};
pub use manager::SnapshotManager;
pub use marker::{CopyMarker, TagMarker};
pub use snapshot::{CopyRequest, ProvisioningState, Snapshot};
