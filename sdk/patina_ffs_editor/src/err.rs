//! Error types and conversions for the firmware volume editing crate.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: Apache-2.0

use core::fmt;
use r_efi::efi;

use crate::tree::NodeId;

/// Error definitions for firmware volume editing.
///
/// Errors fall into three groups: capacity failures ([`FvEditError::VolumeFull`]), structural inconsistencies in the
/// tree or the caller's request, and configuration failures ([`FvEditError::MissingGuidTool`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FvEditError {
    /// A top-level volume cannot grow to absorb `needed` bytes; only `available` bytes of free space remain.
    VolumeFull {
        /// The volume that ran out of space.
        volume: NodeId,
        /// Bytes required at this volume.
        needed: usize,
        /// Free space the volume had.
        available: usize,
    },
    /// The handle does not refer to a live node in the tree.
    NodeNotFound(NodeId),
    /// The node's parent linkage or children do not match what its kind requires.
    InvalidTree(NodeId),
    /// The node was expected to be an FFS file.
    NotAFile(NodeId),
    /// The node was expected to be a firmware volume.
    NotAVolume(NodeId),
    /// The node was expected to be detached from the tree.
    NotDetached(NodeId),
    /// A parameter provided to a function is invalid.
    InvalidParameter,
    /// The volume block map cannot be used to size the volume.
    InvalidBlockMap,
    /// No GUID tool is registered for the section definition GUID.
    MissingGuidTool(efi::Guid),
    /// A GUID tool failed to encode section content.
    ComposeFailed,
    /// A GUID tool failed to decode or verify section content.
    DataCorrupt,
    /// The requested operation or feature is unsupported.
    Unsupported,
}

impl FvEditError {
    /// The operation failed only because a fixed-size volume lacks room.
    pub fn is_capacity_failure(&self) -> bool {
        matches!(self, FvEditError::VolumeFull { .. })
    }

    /// The tree or the request is malformed.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            FvEditError::NodeNotFound(_)
                | FvEditError::InvalidTree(_)
                | FvEditError::NotAFile(_)
                | FvEditError::NotAVolume(_)
                | FvEditError::NotDetached(_)
                | FvEditError::InvalidParameter
                | FvEditError::InvalidBlockMap
        )
    }

    /// The environment is missing a GUID tool registration.
    pub fn is_configuration(&self) -> bool {
        matches!(self, FvEditError::MissingGuidTool(_))
    }
}

impl fmt::Display for FvEditError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FvEditError::VolumeFull { volume, needed, available } => {
                write!(f, "volume {volume} needs {needed:#x} bytes but has {available:#x} free")
            }
            FvEditError::NodeNotFound(id) => write!(f, "node {id} does not exist"),
            FvEditError::InvalidTree(id) => write!(f, "node {id} is not linked as its kind requires"),
            FvEditError::NotAFile(id) => write!(f, "node {id} is not an FFS file"),
            FvEditError::NotAVolume(id) => write!(f, "node {id} is not a firmware volume"),
            FvEditError::NotDetached(id) => write!(f, "node {id} already has a parent"),
            FvEditError::InvalidParameter => write!(f, "invalid parameter"),
            FvEditError::InvalidBlockMap => write!(f, "invalid block map"),
            FvEditError::MissingGuidTool(guid) => write!(f, "no GUID tool registered for {guid:?}"),
            FvEditError::ComposeFailed => write!(f, "GUID tool failed to encode section content"),
            FvEditError::DataCorrupt => write!(f, "GUID tool failed to decode section content"),
            FvEditError::Unsupported => write!(f, "unsupported"),
        }
    }
}

impl core::error::Error for FvEditError {}

impl From<FvEditError> for efi::Status {
    fn from(value: FvEditError) -> Self {
        match value {
            FvEditError::VolumeFull { .. } => efi::Status::VOLUME_FULL,
            FvEditError::NodeNotFound(_) => efi::Status::NOT_FOUND,
            FvEditError::InvalidTree(_) | FvEditError::InvalidBlockMap | FvEditError::DataCorrupt => {
                efi::Status::VOLUME_CORRUPTED
            }
            FvEditError::NotAFile(_)
            | FvEditError::NotAVolume(_)
            | FvEditError::NotDetached(_)
            | FvEditError::InvalidParameter => efi::Status::INVALID_PARAMETER,
            FvEditError::MissingGuidTool(_) | FvEditError::Unsupported => efi::Status::UNSUPPORTED,
            FvEditError::ComposeFailed => efi::Status::DEVICE_ERROR,
        }
    }
}
