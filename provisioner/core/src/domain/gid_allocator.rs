// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! GID Allocator Domain Service
//!
//! Hands out POSIX identities for new access points. The allocator keeps no
//! reservation state: the set of used identities is re-derived from the
//! control plane's access point listing on every call, so out-of-band
//! deletions are picked up immediately.
//!
//! Allocation alone does not reserve a value. Callers serialize the
//! allocate-then-create sequence per filesystem with the lock manager and
//! must be prepared for the create call to collide anyway.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Collision-free identity selection within a bounded range

use std::collections::HashSet;
use tracing::{debug, info};

use crate::domain::cloud::{AccessPoint, CloudError, StorageControlPlane};
use crate::domain::error::{ProvisionError, ProvisionResult};

pub const DEFAULT_GID_MIN: i64 = 50000;
/// Upper bound on how many candidates a single allocation scans.
pub const DEFAULT_GID_POOL_CAP: i64 = 1000;
pub const DEFAULT_GID_MAX: i64 = DEFAULT_GID_MIN + DEFAULT_GID_POOL_CAP;

/// Inclusive identity range. Invariant: `0 < min < max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityRange {
    min: i64,
    max: i64,
}

impl IdentityRange {
    pub fn new(min: i64, max: i64) -> ProvisionResult<Self> {
        if min <= 0 {
            return Err(ProvisionError::invalid_argument(format!(
                "gid range start must be greater than 0, got {}",
                min
            )));
        }
        if max <= min {
            return Err(ProvisionError::invalid_argument(format!(
                "gid range end ({}) must be greater than gid range start ({})",
                max, min
            )));
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> i64 {
        self.min
    }

    pub fn max(&self) -> i64 {
        self.max
    }

    /// Lower bound actually scanned: wide ranges are narrowed to the top `cap` values.
    pub fn effective_min(&self, cap: i64) -> i64 {
        if self.max - self.min > cap {
            self.max - cap
        } else {
            self.min
        }
    }
}

impl Default for IdentityRange {
    fn default() -> Self {
        Self {
            min: DEFAULT_GID_MIN,
            max: DEFAULT_GID_MAX,
        }
    }
}

/// Scan-based GID allocator.
///
/// Holds only its configuration, so a single instance can be shared across
/// every request and every test without leaking state between them.
#[derive(Debug, Clone)]
pub struct GidAllocator {
    pool_cap: i64,
}

impl GidAllocator {
    pub fn new() -> Self {
        Self::with_pool_cap(DEFAULT_GID_POOL_CAP)
    }

    pub fn with_pool_cap(pool_cap: i64) -> Self {
        Self { pool_cap }
    }

    pub fn pool_cap(&self) -> i64 {
        self.pool_cap
    }

    /// List the filesystem's access points and pick a free GID.
    pub async fn allocate(
        &self,
        cloud: &dyn StorageControlPlane,
        file_system_id: &str,
        range: IdentityRange,
    ) -> ProvisionResult<i64> {
        let access_points = cloud
            .list_access_points(file_system_id)
            .await
            .map_err(|e| match e {
                CloudError::AccessDenied => ProvisionError::access_denied(&e),
                CloudError::NotFound => ProvisionError::not_found(format!(
                    "File System does not exist: {}",
                    file_system_id
                )),
                other => ProvisionError::internal(format!(
                    "Failed to list Access Points of File System {}: {}",
                    file_system_id, other
                )),
            })?;

        self.next_gid(file_system_id, &access_points, range)
    }

    /// Pick the highest GID in `(effective_min, max]` not held by `access_points`.
    ///
    /// The scan runs downward from `max` and never returns the lower bound
    /// itself. Both behaviors are relied on by existing deployments.
    pub fn next_gid(
        &self,
        file_system_id: &str,
        access_points: &[AccessPoint],
        range: IdentityRange,
    ) -> ProvisionResult<i64> {
        debug!(
            "Received next_gid for fs_id: {}, min: {}, max: {}",
            file_system_id,
            range.min(),
            range.max()
        );

        let used: HashSet<i64> = access_points
            .iter()
            .filter_map(|ap| ap.posix_user.map(|user| user.gid))
            .collect();

        let lower = range.effective_min(self.pool_cap);
        if lower != range.min() {
            info!(
                file_system_id = %file_system_id,
                requested_min = range.min(),
                effective_min = lower,
                "Narrowing gid scan range to pool cap"
            );
        }

        (lower + 1..=range.max())
            .rev()
            .find(|gid| !used.contains(gid))
            .ok_or_else(|| {
                ProvisionError::resource_exhausted(format!(
                    "Failed to locate a free GID for given file system: {}. \
                     Please create a new storage class with a new file-system",
                    file_system_id
                ))
            })
    }

    /// Return a GID whose create call failed.
    ///
    /// Nothing is reserved by [`GidAllocator::allocate`], so this only records
    /// the release. Layers that add caching must undo their reservation here.
    pub fn release(&self, file_system_id: &str, gid: i64) {
        debug!("Released gid {} for fs_id: {}", gid, file_system_id);
    }
}

impl Default for GidAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cloud::PosixUser;
    use crate::domain::error::ErrorKind;

    fn ap_with_gid(id: usize, gid: i64) -> AccessPoint {
        AccessPoint {
            access_point_id: format!("fsap-{:x}", id),
            file_system_id: "fs-abcd1234".to_string(),
            root_directory: format!("/dir-{}", id),
            posix_user: Some(PosixUser { uid: gid, gid }),
            capacity_bytes: 0,
        }
    }

    #[test]
    fn test_identity_range_validation() {
        assert!(IdentityRange::new(0, 10).is_err());
        assert!(IdentityRange::new(-1, 10).is_err());
        assert!(IdentityRange::new(10, 10).is_err());
        assert!(IdentityRange::new(10, 5).is_err());
        let range = IdentityRange::new(1000, 2000).unwrap();
        assert_eq!((range.min(), range.max()), (1000, 2000));
    }

    #[test]
    fn test_scans_descending_from_max() {
        let allocator = GidAllocator::new();
        let range = IdentityRange::new(1000, 1005).unwrap();

        let gid = allocator.next_gid("fs-abcd1234", &[], range).unwrap();
        assert_eq!(gid, 1005);

        let used = vec![ap_with_gid(1, 1005), ap_with_gid(2, 1004)];
        let gid = allocator.next_gid("fs-abcd1234", &used, range).unwrap();
        assert_eq!(gid, 1003);
    }

    #[test]
    fn test_never_returns_range_min() {
        let allocator = GidAllocator::new();
        let range = IdentityRange::new(1000, 1002).unwrap();
        let used = vec![ap_with_gid(1, 1002), ap_with_gid(2, 1001)];

        let err = allocator.next_gid("fs-abcd1234", &used, range).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ResourceExhausted);
        assert!(err.message.contains("fs-abcd1234"));
    }

    #[test]
    fn test_sequential_allocations_are_distinct() {
        let allocator = GidAllocator::new();
        let range = IdentityRange::new(1, 50).unwrap();
        let mut held = Vec::new();

        for i in 0..49 {
            let gid = allocator.next_gid("fs-abcd1234", &held, range).unwrap();
            assert!(gid > range.min() && gid <= range.max());
            assert!(held.iter().all(|ap: &AccessPoint| ap.posix_user.unwrap().gid != gid));
            held.push(ap_with_gid(i, gid));
        }

        assert!(allocator.next_gid("fs-abcd1234", &held, range).is_err());
    }

    #[test]
    fn test_wide_range_is_capped() {
        let allocator = GidAllocator::with_pool_cap(10);
        let range = IdentityRange::new(1, 1_000_000).unwrap();
        assert_eq!(range.effective_min(10), 999_990);

        let mut held = Vec::new();
        for i in 0..10 {
            let gid = allocator.next_gid("fs-abcd1234", &held, range).unwrap();
            assert!(gid > 999_990, "gid {} fell below max - cap", gid);
            held.push(ap_with_gid(i, gid));
        }
        let err = allocator.next_gid("fs-abcd1234", &held, range).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ResourceExhausted);
    }

    #[test]
    fn test_access_points_without_identity_are_ignored() {
        let allocator = GidAllocator::new();
        let range = IdentityRange::new(100, 101).unwrap();
        let mut ap = ap_with_gid(1, 0);
        ap.posix_user = None;

        assert_eq!(allocator.next_gid("fs-abcd1234", &[ap], range).unwrap(), 101);
    }

    #[test]
    fn test_default_range() {
        let range = IdentityRange::default();
        assert_eq!(range.min(), 50000);
        assert_eq!(range.max(), 51000);
        assert_eq!(range.effective_min(DEFAULT_GID_POOL_CAP), 50000);
    }
}
