//! GUID-defined section encoders and their registry.
//!
//! A [`GuidTool`] turns the logical content of a GUID-defined section into the bytes stored in the image and
//! back. [`GuidToolRegistry`] maps section definition GUIDs to tools; a GUID-defined section whose GUID is not
//! registered cannot be rebuilt.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: Apache-2.0
//!
use alloc::{boxed::Box, collections::BTreeMap, vec::Vec};
use core::fmt;
use r_efi::efi;

use crate::FvEditError;

#[cfg(any(test, feature = "mockall"))]
use mockall::automock;

/// Encoder and decoder for one kind of GUID-defined section.
#[cfg_attr(any(test, feature = "mockall"), automock)]
pub trait GuidTool {
    /// Encode logical section content into the bytes stored after the GUID-defined section header.
    ///
    /// GUID-specific header bytes, if the format has any, lead the output.
    fn pack(&self, data: &[u8]) -> Result<Vec<u8>, FvEditError>;

    /// Decode stored bytes back into logical section content.
    fn unpack(&self, data: &[u8]) -> Result<Vec<u8>, FvEditError>;
}

/// Lookup of [`GuidTool`]s by section definition GUID.
#[derive(Default)]
pub struct GuidToolRegistry {
    tools: BTreeMap<[u8; 16], Box<dyn GuidTool>>,
}

impl GuidToolRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `tool` for `guid`, returning the tool it replaces.
    pub fn register(&mut self, guid: efi::Guid, tool: Box<dyn GuidTool>) -> Option<Box<dyn GuidTool>> {
        log::debug!("registering GUID tool for {guid:?}");
        self.tools.insert(*guid.as_bytes(), tool)
    }

    /// Builder form of [`Self::register`].
    pub fn with(mut self, guid: efi::Guid, tool: Box<dyn GuidTool>) -> Self {
        self.register(guid, tool);
        self
    }

    /// Tool registered for `guid`.
    pub fn get(&self, guid: &efi::Guid) -> Result<&dyn GuidTool, FvEditError> {
        self.tools.get(guid.as_bytes()).map(|tool| tool.as_ref()).ok_or(FvEditError::MissingGuidTool(*guid))
    }

    /// Whether a tool is registered for `guid`.
    pub fn contains(&self, guid: &efi::Guid) -> bool {
        self.tools.contains_key(guid.as_bytes())
    }

    /// Registered GUIDs in byte order.
    pub fn guids(&self) -> impl Iterator<Item = efi::Guid> + '_ {
        self.tools.keys().map(efi::Guid::from_bytes)
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether no tool is registered.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl fmt::Debug for GuidToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.guids()).finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const GUID: efi::Guid = efi::Guid::from_fields(0x1234_5678, 0x9abc, 0xdef0, 0x11, 0x22, &[1, 2, 3, 4, 5, 6]);

    #[test]
    fn registry_should_dispatch_by_guid() -> Result<(), FvEditError> {
        let mut tool = MockGuidTool::new();
        tool.expect_pack().returning(|data| Ok([&[0xee][..], data].concat()));

        let registry = GuidToolRegistry::new().with(GUID, Box::new(tool));
        assert!(registry.contains(&GUID));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.guids().collect::<Vec<_>>(), vec![GUID]);
        assert_eq!(registry.get(&GUID)?.pack(&[1, 2])?, vec![0xee, 1, 2]);
        Ok(())
    }

    #[test]
    fn missing_tool_should_be_reported() {
        let registry = GuidToolRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.get(&GUID).err(), Some(FvEditError::MissingGuidTool(GUID)));
    }

    #[test]
    fn register_should_replace_existing_tool() {
        let mut registry = GuidToolRegistry::new();
        assert!(registry.register(GUID, Box::new(MockGuidTool::new())).is_none());
        assert!(registry.register(GUID, Box::new(MockGuidTool::new())).is_some());
        assert_eq!(registry.len(), 1);
    }
}
