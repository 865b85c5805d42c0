// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Directory mode and controller routing integration tests

mod common;

use std::path::PathBuf;

use common::{fixture, fixture_with, settings, FakeHost, FS_ID};
use efs_provisioner_core::application::directory_provisioner::DirectoryProvisioner;
use efs_provisioner_core::domain::events::ProvisioningEvent;
use efs_provisioner_core::infrastructure::cloud::Operation;
use efs_provisioner_core::{
    DeleteRequest, ErrorKind, ProvisionRequest, Provisioner, ProvisioningMode, VolumeController,
};

fn request(name: &str) -> ProvisionRequest {
    ProvisionRequest::new(name)
        .with_parameter("provisioningMode", "efs-dir")
        .with_parameter("fileSystemId", FS_ID)
}

/// The single scratch mount used by the last operation.
fn scratch_root(host: &FakeHost) -> PathBuf {
    host.calls()
        .iter()
        .find_map(|call| call.strip_prefix("make_dir ").map(PathBuf::from))
        .expect("no scratch directory was created")
}

// ============================================================================
// Directory provisioner
// ============================================================================

#[tokio::test]
async fn test_provision_creates_directory_and_cleans_up() {
    let f = fixture();
    let provisioner = DirectoryProvisioner::new(f.ctx.clone());

    let volume = provisioner
        .provision(
            &request("pvc-1")
                .with_parameter("basePath", "/data/")
                .with_parameter("directoryPerms", "750"),
        )
        .await
        .unwrap();

    assert_eq!(volume.volume_id, format!("{}:/data/pvc-1", FS_ID));

    let scratch = scratch_root(&f.host);
    assert!(scratch.starts_with("/var/lib/csi/pv"));
    assert_eq!(f.host.perms(scratch.join("data/pvc-1")), Some(0o750));
    assert!(f.host.mounted().is_empty());
    assert!(!f.host.has_dir(&scratch));
    assert_eq!(f.cloud.total_calls(), 0);
}

#[tokio::test]
async fn test_provision_defaults_to_open_permissions() {
    let f = fixture();
    let provisioner = DirectoryProvisioner::new(f.ctx.clone());

    let volume = provisioner
        .provision(&request("pvc-1").with_parameter("directoryPerms", "not-octal"))
        .await
        .unwrap();
    assert_eq!(volume.volume_id, format!("{}:/pvc-1", FS_ID));

    let scratch = scratch_root(&f.host);
    assert_eq!(f.host.perms(scratch.join("pvc-1")), Some(0o777));
}

#[tokio::test]
async fn test_provision_failure_still_unmounts() {
    let f = fixture();
    f.host.fail("mkdir_all");
    let provisioner = DirectoryProvisioner::new(f.ctx.clone());

    let err = provisioner.provision(&request("pvc-1")).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Internal);
    assert!(f.host.mounted().is_empty());
    assert!(f.host.calls().iter().any(|c| c.starts_with("unmount ")));
}

#[tokio::test]
async fn test_provision_mount_failure_is_internal() {
    let f = fixture();
    f.host.fail("mount");
    let provisioner = DirectoryProvisioner::new(f.ctx.clone());

    let err = provisioner.provision(&request("pvc-1")).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Internal);

    let scratch = scratch_root(&f.host);
    assert!(!f.host.has_dir(&scratch));
    assert!(f
        .host
        .calls()
        .contains(&format!("remove {}", scratch.display())));
    assert!(f.host.mounted().is_empty());
}

#[tokio::test]
async fn test_scratch_mounts_use_tls_and_iam() {
    let mut spec = settings();
    spec.delete_provisioned_dir = true;
    let f = fixture_with(spec);
    let provisioner = DirectoryProvisioner::new(f.ctx.clone());

    let volume = provisioner.provision(&request("pvc-1")).await.unwrap();
    provisioner
        .delete(&DeleteRequest::new(&volume.volume_id))
        .await
        .unwrap();

    let mounts: Vec<String> = f
        .host
        .calls()
        .into_iter()
        .filter(|c| c.starts_with("mount-args "))
        .collect();
    assert_eq!(
        mounts,
        vec![
            format!("mount-args {} efs tls,iam", FS_ID),
            format!("mount-args {} efs tls,iam", FS_ID),
        ]
    );
}

#[tokio::test]
async fn test_provision_rejects_bad_requests() {
    let f = fixture();
    let provisioner = DirectoryProvisioner::new(f.ctx.clone());

    for case in [
        ProvisionRequest::new("").with_parameter("fileSystemId", FS_ID),
        ProvisionRequest::new("pvc-1"),
        request("pvc-1").with_parameter("bogus", "1"),
    ] {
        let err = provisioner.provision(&case).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument, "{:?}", case);
    }
    assert!(f.host.calls().is_empty());
}

#[tokio::test]
async fn test_delete_is_noop_when_disabled() {
    let f = fixture();
    let provisioner = DirectoryProvisioner::new(f.ctx.clone());

    provisioner
        .delete(&DeleteRequest::new(format!("{}:/pvc-1", FS_ID)))
        .await
        .unwrap();
    assert!(f.host.calls().is_empty());
}

#[tokio::test]
async fn test_delete_removes_directory_when_enabled() {
    let mut spec = settings();
    spec.delete_provisioned_dir = true;
    let f = fixture_with(spec);
    let mut events = f.event_bus.subscribe();
    let provisioner = DirectoryProvisioner::new(f.ctx.clone());

    let volume = provisioner.provision(&request("pvc-1")).await.unwrap();
    let provision_scratch = scratch_root(&f.host);
    assert!(f.host.has_dir(provision_scratch.join("pvc-1")));

    provisioner
        .delete(&DeleteRequest::new(&volume.volume_id))
        .await
        .unwrap();

    let removed: Vec<String> = f
        .host
        .calls()
        .into_iter()
        .filter(|c| c.starts_with("remove_all "))
        .collect();
    assert_eq!(removed.len(), 1);
    assert!(removed[0].ends_with("/pvc-1"));
    assert!(f.host.mounted().is_empty());

    assert!(matches!(
        events.recv().await.unwrap(),
        ProvisioningEvent::VolumeProvisioned { mode: ProvisioningMode::Directory, .. }
    ));
    assert!(matches!(
        events.recv().await.unwrap(),
        ProvisioningEvent::VolumeDeleted { mode: ProvisioningMode::Directory, .. }
    ));
}

#[tokio::test]
async fn test_delete_refuses_file_system_root() {
    let mut spec = settings();
    spec.delete_provisioned_dir = true;
    let f = fixture_with(spec);
    let provisioner = DirectoryProvisioner::new(f.ctx.clone());

    let err = provisioner
        .delete(&DeleteRequest::new(format!("{}:/", FS_ID)))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidArgument);

    let err = provisioner
        .delete(&DeleteRequest::new(FS_ID))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
    assert!(f.host.calls().is_empty());
}

#[tokio::test]
async fn test_delete_with_unparsable_id_succeeds() {
    let mut spec = settings();
    spec.delete_provisioned_dir = true;
    let f = fixture_with(spec);
    let provisioner = DirectoryProvisioner::new(f.ctx.clone());

    provisioner
        .delete(&DeleteRequest::new("not-a-volume"))
        .await
        .unwrap();
    assert!(f.host.calls().is_empty());
}

// ============================================================================
// Controller routing
// ============================================================================

#[tokio::test]
async fn test_controller_routes_by_mode() {
    let f = fixture();
    let controller = VolumeController::new(f.ctx.clone());

    let dir_volume = controller.create_volume(&request("pvc-dir")).await.unwrap();
    assert_eq!(dir_volume.volume_id, format!("{}:/pvc-dir", FS_ID));
    assert_eq!(f.cloud.call_count(Operation::CreateAccessPoint), 0);

    let ap_volume = controller
        .create_volume(
            &ProvisionRequest::new("pvc-ap")
                .with_parameter("provisioningMode", "efs-ap")
                .with_parameter("fileSystemId", FS_ID),
        )
        .await
        .unwrap();
    assert!(ap_volume.volume_id.starts_with(&format!("{}::fsap-", FS_ID)));
    assert_eq!(f.cloud.call_count(Operation::CreateAccessPoint), 1);

    controller
        .delete_volume(&DeleteRequest::new(&ap_volume.volume_id))
        .await
        .unwrap();
    assert!(f.cloud.access_points(FS_ID).is_empty());

    // Directory deletion is disabled in the default settings.
    controller
        .delete_volume(&DeleteRequest::new(&dir_volume.volume_id))
        .await
        .unwrap();
    assert_eq!(f.cloud.call_count(Operation::DeleteAccessPoint), 1);
}

#[tokio::test]
async fn test_controller_rejects_missing_or_unknown_mode() {
    let f = fixture();
    let controller = VolumeController::new(f.ctx.clone());

    for request in [
        ProvisionRequest::new("pvc-1").with_parameter("fileSystemId", FS_ID),
        ProvisionRequest::new("pvc-1")
            .with_parameter("provisioningMode", "")
            .with_parameter("fileSystemId", FS_ID),
        ProvisionRequest::new("pvc-1")
            .with_parameter("provisioningMode", "efs-magic")
            .with_parameter("fileSystemId", FS_ID),
    ] {
        let err = controller.create_volume(&request).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
    }
    assert_eq!(f.cloud.total_calls(), 0);
    assert!(f.host.calls().is_empty());
}

#[tokio::test]
async fn test_controller_validates_volume_ids() {
    let f = fixture();
    let controller = VolumeController::new(f.ctx.clone());

    let id = controller
        .validate_volume_id(&format!("{}::fsap-0123abcd", FS_ID))
        .unwrap();
    assert_eq!(id.access_point_id.as_deref(), Some("fsap-0123abcd"));

    let err = controller.validate_volume_id("bogus").unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);

    let err = controller
        .delete_volume(&DeleteRequest::new(""))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidArgument);
}
