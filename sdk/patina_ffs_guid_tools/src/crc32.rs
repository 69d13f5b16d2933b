//! Module for CRC32 guided sections.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: Apache-2.0
//!
use alloc::vec::Vec;
use patina_ffs_editor::{FvEditError, GuidTool, section::SectionNode};
use patina_pi::fw_fs::guid::CRC32_SECTION;

/// Length of the CRC32 value that leads the stored section data.
///
/// Sections built with this tool carry it as their GUID-specific header length.
pub const CRC32_HEADER_LEN: usize = 4;

/// Encoder for CRC32 guided sections: the content is stored as is, preceded by its little-endian CRC32.
#[derive(Default, Clone, Copy, Debug)]
pub struct Crc32GuidTool;

impl Crc32GuidTool {
    /// Empty CRC32 guided section whose `data_offset` skips the checksum.
    pub fn new_section(attributes: u16) -> Result<SectionNode, FvEditError> {
        Ok(SectionNode::new_guid_defined(CRC32_SECTION, attributes)?.with_guid_specific_len(CRC32_HEADER_LEN))
    }
}

impl GuidTool for Crc32GuidTool {
    fn pack(&self, data: &[u8]) -> Result<Vec<u8>, FvEditError> {
        let mut output = Vec::with_capacity(CRC32_HEADER_LEN + data.len());
        output.extend_from_slice(&crc32fast::hash(data).to_le_bytes());
        output.extend_from_slice(data);
        Ok(output)
    }

    fn unpack(&self, data: &[u8]) -> Result<Vec<u8>, FvEditError> {
        let Some((crc, content)) = data.split_first_chunk::<CRC32_HEADER_LEN>() else {
            log::warn!("CRC32 section data is shorter than its checksum");
            return Err(FvEditError::DataCorrupt);
        };
        if u32::from_le_bytes(*crc) != crc32fast::hash(content) {
            log::warn!("CRC32 section checksum mismatch");
            Err(FvEditError::DataCorrupt)?;
        }
        Ok(content.to_vec())
    }
}
