//! In-place editing of Firmware Volumes as described in the UEFI Platform Initialization Specification.
//!
//! A firmware image is held as an [`FvTree`]: volumes contain files, files contain sections, and firmware volume
//! image sections contain further volumes. [`FvHandler`] replaces, adds and deletes files in that tree and keeps
//! every enclosing structure consistent: sizes, alignment pads, header variants, checksums, the volume
//! used-size entry, and GUID-defined section content re-encoded through a [`GuidToolRegistry`].
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: Apache-2.0
//!
#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

pub mod err;
pub mod file;
pub mod guid_tool;
pub mod handler;
pub mod layout;
pub mod section;
pub mod tree;
pub mod volume;

pub use err::FvEditError;
pub use guid_tool::{GuidTool, GuidToolRegistry};
pub use handler::FvHandler;
pub use tree::{FvTree, NodeData, NodeId, NodeKind, RootKind};
