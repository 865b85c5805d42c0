// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Provisioning Error Taxonomy
//!
//! Every failure surfaced by Provision or Delete is a [`ProvisionError`]
//! carrying one [`ErrorKind`]. The kind set is closed so callers (the
//! orchestrator-facing transport) can map it exhaustively onto their own
//! status codes.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Closed error-kind enumeration and remote sentinel mapping

use std::fmt;
use thiserror::Error;

use crate::domain::cloud::CloudError;

/// Closed set of error kinds surfaced to the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing, malformed or inconsistent caller input. Raised before any remote call.
    InvalidArgument,
    /// The filesystem or resource does not exist.
    NotFound,
    /// The remote system reports a collision on creation.
    AlreadyExists,
    /// Credential or authorization failure, including role assumption.
    Unauthenticated,
    /// No free identity left in the effective range.
    ResourceExhausted,
    /// Any other remote failure or a failed local compensating action.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InvalidArgument => "InvalidArgument",
            Self::NotFound => "NotFound",
            Self::AlreadyExists => "AlreadyExists",
            Self::Unauthenticated => "Unauthenticated",
            Self::ResourceExhausted => "ResourceExhausted",
            Self::Internal => "Internal",
        };
        f.write_str(name)
    }
}

/// Error returned by every provisioning operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct ProvisionError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ProvisionError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AlreadyExists, message)
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthenticated, message)
    }

    pub fn resource_exhausted(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ResourceExhausted, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Access denied by the remote control plane.
    pub fn access_denied(err: &CloudError) -> Self {
        Self::unauthenticated(format!(
            "Access Denied. Please ensure you have the right permissions: {}",
            err
        ))
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

pub type ProvisionResult<T> = Result<T, ProvisionError>;
