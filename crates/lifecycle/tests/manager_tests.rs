/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Lifecycle pass tests against a recording in-memory compute API

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

use snapshot_lifecycle::error::Result;
use snapshot_lifecycle::{
    ComputeApi, CopyRequest, LifecycleConfig, LifecycleError, OperationOutcome,
    ProvisioningState, Snapshot, SnapshotManager,
};

/// In-memory compute API that records every issued call.
#[derive(Debug)]
struct RecordingApi {
    groups: Mutex<HashMap<String, Vec<Snapshot>>>,
    copies: Mutex<Vec<(String, String, CopyRequest)>>,
    tag_updates: Mutex<Vec<(String, String, HashMap<String, String>)>>,
    deletes: Mutex<Vec<(String, String)>>,
    copy_state: ProvisioningState,
    tag_state: ProvisioningState,
    fail_copy: bool,
}

impl RecordingApi {
    fn new(groups: &[(&str, Vec<Snapshot>)]) -> Self {
        Self {
            groups: Mutex::new(
                groups
                    .iter()
                    .map(|(rg, snapshots)| (rg.to_string(), snapshots.clone()))
                    .collect(),
            ),
            copies: Mutex::new(Vec::new()),
            tag_updates: Mutex::new(Vec::new()),
            deletes: Mutex::new(Vec::new()),
            copy_state: ProvisioningState::Succeeded,
            tag_state: ProvisioningState::Succeeded,
            fail_copy: false,
        }
    }

    fn with_copy_state(mut self, state: ProvisioningState) -> Self {
        self.copy_state = state;
        self
    }

    fn with_tag_state(mut self, state: ProvisioningState) -> Self {
        self.tag_state = state;
        self
    }

    fn with_failing_copies(mut self) -> Self {
        self.fail_copy = true;
        self
    }

    fn tags_of(&self, resource_group: &str, name: &str) -> Option<HashMap<String, String>> {
        self.groups
            .lock()
            .unwrap()
            .get(resource_group)?
            .iter()
            .find(|snapshot| snapshot.name == name)?
            .tags
            .clone()
    }

    fn copy_count(&self) -> usize {
        self.copies.lock().unwrap().len()
    }

    fn deleted_names(&self) -> Vec<String> {
        self.deletes
            .lock()
            .unwrap()
            .iter()
            .map(|(_, name)| name.clone())
            .collect()
    }
}

#[async_trait]
impl ComputeApi for RecordingApi {
    async fn list_snapshots(&self, resource_group: &str) -> Result<Vec<Snapshot>> {
        Ok(self
            .groups
            .lock()
            .unwrap()
            .get(resource_group)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_snapshot(&self, resource_group: &str, name: &str) -> Result<Snapshot> {
        self.groups
            .lock()
            .unwrap()
            .get(resource_group)
            .and_then(|snapshots| snapshots.iter().find(|snapshot| snapshot.name == name))
            .cloned()
            .ok_or_else(|| LifecycleError::unexpected(format!("no snapshot named {name}")))
    }

    async fn copy_snapshot(
        &self,
        resource_group: &str,
        name: &str,
        request: CopyRequest,
    ) -> Result<OperationOutcome> {
        self.copies
            .lock()
            .unwrap()
            .push((resource_group.to_string(), name.to_string(), request));

        if self.fail_copy {
            return Err(LifecycleError::unexpected("copy request refused"));
        }

        Ok(OperationOutcome {
            state: self.copy_state.clone(),
            snapshot: None,
        })
    }

    async fn update_tags(
        &self,
        resource_group: &str,
        name: &str,
        tags: HashMap<String, String>,
    ) -> Result<OperationOutcome> {
        if self.tag_state == ProvisioningState::Succeeded {
            if let Some(snapshots) = self.groups.lock().unwrap().get_mut(resource_group) {
                if let Some(snapshot) = snapshots
                    .iter_mut()
                    .find(|snapshot| snapshot.name == name)
                {
                    snapshot.tags = Some(tags.clone());
                }
            }
        }

        self.tag_updates
            .lock()
            .unwrap()
            .push((resource_group.to_string(), name.to_string(), tags));

        Ok(OperationOutcome {
            state: self.tag_state.clone(),
            snapshot: None,
        })
    }

    async fn delete_snapshot(&self, resource_group: &str, name: &str) -> Result<()> {
        self.deletes
            .lock()
            .unwrap()
            .push((resource_group.to_string(), name.to_string()));
        Ok(())
    }
}

fn snapshot(name: &str, tags: &[(&str, &str)], created: Option<DateTime<Utc>>) -> Snapshot {
    let mut value = serde_json::json!({
        "id": format!(
            "/subscriptions/sub/resourceGroups/source-rg/providers/Microsoft.Compute/snapshots/{name}"
        ),
        "name": name,
        "location": "westeurope",
        "sku": { "name": "Standard_ZRS" },
        "properties": { "provisioningState": "Succeeded" }
    });

    if !tags.is_empty() {
        value["tags"] = serde_json::json!(tags
            .iter()
            .map(|(key, val)| (key.to_string(), val.to_string()))
            .collect::<HashMap<_, _>>());
    }
    if let Some(created) = created {
        value["properties"]["timeCreated"] = serde_json::json!(created.to_rfc3339());
    }

    serde_json::from_value(value).unwrap()
}

fn config(skip_deletion: bool) -> LifecycleConfig {
    LifecycleConfig {
        subscription_id: "sub".to_string(),
        resource_group: "source-rg".to_string(),
        destination_resource_group: "dest-rg".to_string(),
        destination_region: "germanynorth".to_string(),
        snapshot_name_prefix: "copy-".to_string(),
        expire_days: 30,
        skip_deletion,
    }
}

#[tokio::test]
async fn untagged_snapshot_is_copied_and_marked() {
    let api = Arc::new(RecordingApi::new(&[
        (
            "source-rg",
            vec![
                snapshot("snap-a", &[("env", "prod")], None),
                snapshot(
                    "snap-b",
                    &[("CrossRegionCopy", "Success"), ("CopiedRegion", "westus")],
                    None,
                ),
            ],
        ),
        ("dest-rg", Vec::new()),
    ]));

    let manager = SnapshotManager::new(api.clone(), config(true));
    manager.run().await.unwrap();

    {
        let copies = api.copies.lock().unwrap();
        assert_eq!(copies.len(), 1);
        let (resource_group, name, request) = &copies[0];
        assert_eq!(resource_group, "dest-rg");
        assert_eq!(name, "copy-snap-a");
        assert_eq!(request.location, "germanynorth");
        assert_eq!(request.sku.name.as_deref(), Some("Standard_LRS"));
        assert_eq!(request.properties.creation_data.create_option, "CopyStart");
        assert!(request
            .properties
            .creation_data
            .source_resource_id
            .as_deref()
            .unwrap()
            .ends_with("/snap-a"));
        assert!(request.properties.incremental);
    }

    // Marker applied to the source snapshot, preserving unrelated tags
    let tags = api.tags_of("source-rg", "snap-a").unwrap();
    assert_eq!(tags.get("CrossRegionCopy").map(String::as_str), Some("Success"));
    assert_eq!(
        tags.get("CopiedRegion").map(String::as_str),
        Some("germanynorth")
    );
    assert_eq!(tags.get("env").map(String::as_str), Some("prod"));

    // The already-copied snapshot got neither a copy nor a tag update
    let tag_updates = api.tag_updates.lock().unwrap();
    assert_eq!(tag_updates.len(), 1);
    assert_eq!(tag_updates[0].1, "snap-a");
}

#[tokio::test]
async fn already_copied_snapshots_are_skipped() {
    let api = Arc::new(RecordingApi::new(&[
        (
            "source-rg",
            vec![snapshot(
                "snap-a",
                &[("CrossRegionCopy", "Success"), ("CopiedRegion", "germanynorth")],
                None,
            )],
        ),
        ("dest-rg", Vec::new()),
    ]));

    let manager = SnapshotManager::new(api.clone(), config(true));
    manager.run().await.unwrap();

    assert_eq!(api.copy_count(), 0);
    assert!(api.tag_updates.lock().unwrap().is_empty());
}

#[tokio::test]
async fn failed_copy_leaves_source_tags_untouched() {
    let api = Arc::new(
        RecordingApi::new(&[
            ("source-rg", vec![snapshot("snap-a", &[], None)]),
            ("dest-rg", Vec::new()),
        ])
        .with_copy_state(ProvisioningState::Failed),
    );

    let manager = SnapshotManager::new(api.clone(), config(true));
    manager.run().await.unwrap();

    assert_eq!(api.copy_count(), 1);
    assert!(api.tag_updates.lock().unwrap().is_empty());
    assert_eq!(api.tags_of("source-rg", "snap-a"), None);
}

#[tokio::test]
async fn copy_errors_do_not_abort_the_run() {
    let api = Arc::new(
        RecordingApi::new(&[
            (
                "source-rg",
                vec![snapshot("snap-a", &[], None), snapshot("snap-b", &[], None)],
            ),
            ("dest-rg", Vec::new()),
        ])
        .with_failing_copies(),
    );

    let manager = SnapshotManager::new(api.clone(), config(true));
    manager.run().await.unwrap();

    // Both copies were attempted despite the first one failing
    assert_eq!(api.copy_count(), 2);
    assert!(api.tag_updates.lock().unwrap().is_empty());
}

#[tokio::test]
async fn tag_update_failure_does_not_abort_the_run() {
    let api = Arc::new(
        RecordingApi::new(&[
            (
                "source-rg",
                vec![snapshot("snap-a", &[], None), snapshot("snap-b", &[], None)],
            ),
            ("dest-rg", Vec::new()),
        ])
        .with_tag_state(ProvisioningState::Failed),
    );

    let manager = SnapshotManager::new(api.clone(), config(true));
    manager.run().await.unwrap();

    assert_eq!(api.copy_count(), 2);
    assert_eq!(api.tag_updates.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn empty_source_group_is_a_normal_run() {
    let api = Arc::new(RecordingApi::new(&[
        ("source-rg", Vec::new()),
        ("dest-rg", Vec::new()),
    ]));

    let manager = SnapshotManager::new(api.clone(), config(false));
    manager.run().await.unwrap();

    assert_eq!(api.copy_count(), 0);
    assert!(api.tag_updates.lock().unwrap().is_empty());
    assert!(api.deleted_names().is_empty());
}

#[tokio::test]
async fn expired_destination_snapshots_are_deleted() {
    let api = Arc::new(RecordingApi::new(&[
        ("source-rg", Vec::new()),
        (
            "dest-rg",
            vec![
                snapshot("copy-old", &[], Some(Utc::now() - Duration::days(40))),
                snapshot("copy-new", &[], Some(Utc::now() - Duration::days(10))),
            ],
        ),
    ]));

    let manager = SnapshotManager::new(api.clone(), config(false));
    manager.run().await.unwrap();

    assert_eq!(api.deleted_names(), vec!["copy-old".to_string()]);
}

#[tokio::test]
async fn snapshot_exactly_at_the_cutoff_is_deleted() {
    let cutoff = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let api = Arc::new(RecordingApi::new(&[
        ("source-rg", Vec::new()),
        (
            "dest-rg",
            vec![
                snapshot("copy-edge", &[], Some(cutoff)),
                snapshot("copy-after", &[], Some(cutoff + Duration::seconds(1))),
            ],
        ),
    ]));

    let manager = SnapshotManager::new(api.clone(), config(false));
    manager.delete_snapshots_before(cutoff).await.unwrap();

    // The boundary is inclusive: created == cutoff is expired
    assert_eq!(api.deleted_names(), vec!["copy-edge".to_string()]);
}

#[tokio::test]
async fn skip_deletion_suppresses_all_deletes() {
    let api = Arc::new(RecordingApi::new(&[
        ("source-rg", Vec::new()),
        (
            "dest-rg",
            vec![snapshot("copy-old", &[], Some(Utc::now() - Duration::days(400)))],
        ),
    ]));

    let manager = SnapshotManager::new(api.clone(), config(true));
    manager.run().await.unwrap();

    assert!(api.deleted_names().is_empty());
}

#[tokio::test]
async fn snapshot_without_creation_time_is_kept() {
    let api = Arc::new(RecordingApi::new(&[
        ("source-rg", Vec::new()),
        ("dest-rg", vec![snapshot("copy-pending", &[], None)]),
    ]));

    let manager = SnapshotManager::new(api.clone(), config(false));
    manager.run().await.unwrap();

    assert!(api.deleted_names().is_empty());
}
