//! Firmware Volume payloads for firmware volume trees.
//!
//! [`VolumeNode`] holds a volume header with its block map, the optional extended header (which lives inside
//! the leading pad file of the volume) and the serialized body. [`FreeSpace`] represents the unused tail of a
//! volume.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: Apache-2.0
//!
use alloc::vec::Vec;
use core::{iter, mem, slice::from_raw_parts};
use patina_pi::fw_fs::{
    ffs::{self, file},
    fv::{self, BlockMapEntry},
    fvb::attributes::{EfiFvbAttributes2, raw::fvb2},
};
use r_efi::efi;

use crate::{FvEditError, layout::FILL_BYTE};

const FV_HEADER_LENGTH: usize = mem::size_of::<fv::Header>();
const BLOCK_MAP_ENTRY_LENGTH: usize = mem::size_of::<BlockMapEntry>();
const EXT_HEADER_LENGTH: usize = mem::size_of::<fv::ExtHeader>();
const EXT_ENTRY_HEADER_LENGTH: usize = mem::size_of::<fv::ExtEntryHeader>();
const EXT_ENTRY_USED_SIZE_LENGTH: usize = mem::size_of::<fv::ExtEntryUsedSize>();

/// Unused space at the end of a volume, filled with [`FILL_BYTE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeSpace {
    len: usize,
}

impl FreeSpace {
    /// Free space of `len` bytes.
    pub fn new(len: usize) -> Self {
        Self { len }
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the span is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Resize the span.
    pub fn set_len(&mut self, len: usize) {
        self.len = len;
    }

    /// Byte image of the span.
    pub fn serialize(&self) -> Vec<u8> {
        iter::repeat_n(FILL_BYTE, self.len).collect()
    }
}

/// Extended volume header: the fixed part plus the raw extension entries that follow it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeExtHeader {
    header: fv::ExtHeader,
    entries: Vec<u8>,
}

impl VolumeExtHeader {
    /// Extended header named `fv_name` with the serialized extension `entries`.
    pub fn new(fv_name: efi::Guid, entries: Vec<u8>) -> Self {
        let header = fv::ExtHeader { fv_name, ext_header_size: (EXT_HEADER_LENGTH + entries.len()) as u32 };
        Self { header, entries }
    }

    /// Extended header with a single used-size entry.
    pub fn with_used_size(fv_name: efi::Guid) -> Self {
        let entry = fv::ExtEntryUsedSize {
            hdr: fv::ExtEntryHeader {
                ext_entry_size: EXT_ENTRY_USED_SIZE_LENGTH as u16,
                ext_entry_type: fv::ext_entry_type::USED_SIZE,
            },
            used_size: 0,
        };
        // safety: ExtEntryUsedSize is repr(C) without padding.
        let entry = unsafe {
            from_raw_parts(&entry as *const fv::ExtEntryUsedSize as *const u8, EXT_ENTRY_USED_SIZE_LENGTH)
        };
        Self::new(fv_name, entry.to_vec())
    }

    /// Volume name.
    pub fn fv_name(&self) -> efi::Guid {
        self.header.fv_name
    }

    /// Serialized length.
    pub fn len(&self) -> usize {
        EXT_HEADER_LENGTH + self.entries.len()
    }

    /// Whether the header is empty; never true, since the fixed part is always present.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Used size recorded in the first used-size entry, if any.
    pub fn used_size(&self) -> Option<u32> {
        self.used_size_offset().map(|offset| {
            let mut bytes = [0u8; 4];
            bytes.copy_from_slice(&self.entries[offset..offset + 4]);
            u32::from_le_bytes(bytes)
        })
    }

    fn used_size_offset(&self) -> Option<usize> {
        let mut offset = 0;
        while offset + EXT_ENTRY_HEADER_LENGTH <= self.entries.len() {
            let size = u16::from_le_bytes([self.entries[offset], self.entries[offset + 1]]) as usize;
            let entry_type = u16::from_le_bytes([self.entries[offset + 2], self.entries[offset + 3]]);
            if size < EXT_ENTRY_HEADER_LENGTH || offset + size > self.entries.len() {
                break;
            }
            if entry_type == fv::ext_entry_type::USED_SIZE && size >= EXT_ENTRY_USED_SIZE_LENGTH {
                return Some(offset + EXT_ENTRY_HEADER_LENGTH);
            }
            offset += size;
        }
        None
    }

    /// Record `used_size` in every used-size entry. Returns whether any entry changed.
    pub fn set_used_size(&mut self, used_size: u32) -> bool {
        let mut changed = false;
        let mut offset = 0;
        while offset + EXT_ENTRY_HEADER_LENGTH <= self.entries.len() {
            let size = u16::from_le_bytes([self.entries[offset], self.entries[offset + 1]]) as usize;
            let entry_type = u16::from_le_bytes([self.entries[offset + 2], self.entries[offset + 3]]);
            if size < EXT_ENTRY_HEADER_LENGTH || offset + size > self.entries.len() {
                break;
            }
            if entry_type == fv::ext_entry_type::USED_SIZE && size >= EXT_ENTRY_USED_SIZE_LENGTH {
                let value = &mut self.entries[offset + EXT_ENTRY_HEADER_LENGTH..offset + EXT_ENTRY_USED_SIZE_LENGTH];
                if *value != used_size.to_le_bytes() {
                    value.copy_from_slice(&used_size.to_le_bytes());
                    changed = true;
                }
            }
            offset += size;
        }
        changed
    }

    /// Byte image of the extended header.
    pub fn serialize(&self) -> Vec<u8> {
        // safety: ExtHeader is repr(C) without padding.
        let header =
            unsafe { from_raw_parts(&self.header as *const fv::ExtHeader as *const u8, EXT_HEADER_LENGTH) };
        let mut buffer = header.to_vec();
        buffer.extend_from_slice(&self.entries);
        buffer
    }
}

/// A firmware volume inside a firmware volume tree.
///
/// The body holds the serialized children of the volume: its files followed by the free space. Header fields
/// that depend on the body (length, block map, used size and checksum) are refreshed by
/// [`VolumeNode::update_header`].
#[derive(Debug, Clone)]
pub struct VolumeNode {
    header: fv::Header,
    block_map: Vec<BlockMapEntry>,
    ext_header: Option<VolumeExtHeader>,
    body: Vec<u8>,
    free_space: usize,
}

impl VolumeNode {
    /// Create an empty volume.
    ///
    /// The block map must have at least one entry, and its first entry must have a non-zero block length; that
    /// entry is the one whose block count absorbs size changes.
    pub fn new(
        file_system_guid: efi::Guid,
        attributes: EfiFvbAttributes2,
        block_map: Vec<BlockMapEntry>,
    ) -> Result<Self, FvEditError> {
        match block_map.first() {
            Some(entry) if entry.length != 0 => (),
            _ => Err(FvEditError::InvalidBlockMap)?,
        }
        let header_length = FV_HEADER_LENGTH + BLOCK_MAP_ENTRY_LENGTH * (block_map.len() + 1);
        let header = fv::Header {
            zero_vector: [0u8; 16],
            file_system_guid,
            fv_length: header_length as u64,
            signature: fv::SIGNATURE,
            attributes,
            header_length: u16::try_from(header_length).map_err(|_| FvEditError::InvalidBlockMap)?,
            checksum: 0,
            ext_header_offset: 0,
            reserved: 0,
            revision: fv::FFS_REVISION,
            block_map: [BlockMapEntry { num_blocks: 0, length: 0 }; 0],
        };
        let mut volume = Self { header, block_map, ext_header: None, body: Vec::new(), free_space: 0 };
        volume.update_checksum();
        Ok(volume)
    }

    /// Attach an extended header. It is stored in the body of the volume's first file, which must be a pad file.
    pub fn with_ext_header(mut self, ext_header: VolumeExtHeader) -> Self {
        self.header.ext_header_offset = (self.header_length() + mem::size_of::<file::Header>()) as u16;
        self.ext_header = Some(ext_header);
        self.update_checksum();
        self
    }

    /// Raw volume header.
    pub fn header(&self) -> &fv::Header {
        &self.header
    }

    /// Block map, without the zero terminator.
    pub fn block_map(&self) -> &[BlockMapEntry] {
        &self.block_map
    }

    /// Extended header, if any.
    pub fn ext_header(&self) -> Option<&VolumeExtHeader> {
        self.ext_header.as_ref()
    }

    /// File system GUID.
    pub fn file_system_guid(&self) -> efi::Guid {
        self.header.file_system_guid
    }

    /// Replace the file system GUID.
    pub fn set_file_system_guid(&mut self, guid: efi::Guid) {
        self.header.file_system_guid = guid;
    }

    /// Whether the file system supports large files.
    pub fn is_ffs3(&self) -> bool {
        self.header.file_system_guid == ffs::guid::EFI_FIRMWARE_FILE_SYSTEM3_GUID
    }

    /// FVB attributes.
    pub fn attributes(&self) -> EfiFvbAttributes2 {
        self.header.attributes
    }

    /// Whether erased flash reads as ones.
    pub fn erase_polarity(&self) -> bool {
        self.header.attributes & fvb2::ERASE_POLARITY != 0
    }

    /// Header length, block map and terminator included.
    pub fn header_length(&self) -> usize {
        self.header.header_length as usize
    }

    /// Total volume length.
    pub fn fv_length(&self) -> usize {
        self.header.fv_length as usize
    }

    /// Length of the blocks in the first block map entry.
    pub fn block_length(&self) -> Result<usize, FvEditError> {
        match self.block_map.first() {
            Some(entry) if entry.length != 0 => Ok(entry.length as usize),
            _ => Err(FvEditError::InvalidBlockMap),
        }
    }

    /// Free space at the end of the volume.
    pub fn free_space(&self) -> usize {
        self.free_space
    }

    /// Record the free space at the end of the volume.
    pub fn set_free_space(&mut self, free_space: usize) {
        self.free_space = free_space;
    }

    /// Serialized body.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Replace the serialized body. Header fields are refreshed by [`Self::update_header`].
    pub fn set_body(&mut self, body: Vec<u8>) {
        self.body = body;
    }

    /// Used size recorded in the extended header.
    pub fn used_size(&self) -> Option<u32> {
        self.ext_header.as_ref().and_then(VolumeExtHeader::used_size)
    }

    /// Extended header bytes, to be written into the leading pad file.
    pub fn ext_header_bytes(&self) -> Option<Vec<u8>> {
        self.ext_header.as_ref().map(VolumeExtHeader::serialize)
    }

    /// Set the volume length to header plus body and resize the first block map entry to cover it.
    pub fn update_size(&mut self) -> Result<(), FvEditError> {
        let fv_length = self.header_length() + self.body.len();
        let block_length = self.block_length()?;
        let other_blocks = self.block_map[1..].iter().try_fold(0usize, |sum, entry| {
            (entry.num_blocks as usize)
                .checked_mul(entry.length as usize)
                .and_then(|len| sum.checked_add(len))
                .ok_or(FvEditError::InvalidBlockMap)
        })?;
        let first_blocks = fv_length.checked_sub(other_blocks).ok_or(FvEditError::InvalidBlockMap)? / block_length;
        if fv_length - other_blocks != first_blocks * block_length {
            log::warn!("volume length {fv_length:#x} is not a whole number of {block_length:#x} byte blocks");
        }
        self.block_map[0].num_blocks = u32::try_from(first_blocks).map_err(|_| FvEditError::InvalidBlockMap)?;
        self.header.fv_length = fv_length as u64;
        Ok(())
    }

    /// Record `used_size` in the extended header's used-size entries.
    pub fn set_used_size(&mut self, used_size: usize) -> Result<(), FvEditError> {
        let used_size = u32::try_from(used_size).map_err(|_| FvEditError::InvalidParameter)?;
        if let Some(ext_header) = self.ext_header.as_mut() {
            ext_header.set_used_size(used_size);
        }
        Ok(())
    }

    /// Record the used size (volume length minus free space) in the extended header's used-size entries.
    pub fn update_ext_entries(&mut self) -> Result<(), FvEditError> {
        let used_size = self.fv_length().checked_sub(self.free_space).ok_or(FvEditError::InvalidParameter)?;
        self.set_used_size(used_size)
    }

    /// Recompute the 16-bit header checksum.
    pub fn update_checksum(&mut self) {
        self.header.checksum = 0;
        let sum = self
            .header_bytes()
            .chunks_exact(2)
            .fold(0u16, |sum, word| sum.wrapping_add(u16::from_le_bytes([word[0], word[1]])));
        self.header.checksum = 0u16.wrapping_sub(sum);
    }

    /// Refresh length, block map, used size and checksum from the body.
    pub fn update_header(&mut self) -> Result<(), FvEditError> {
        self.update_size()?;
        self.update_ext_entries()?;
        self.update_checksum();
        Ok(())
    }

    /// Header, block map and block map terminator bytes.
    pub fn header_bytes(&self) -> Vec<u8> {
        // safety: fv::Header is repr(C) without padding.
        let header = unsafe { from_raw_parts(&self.header as *const fv::Header as *const u8, FV_HEADER_LENGTH) };
        let mut buffer = header.to_vec();
        self.block_map.iter().chain(iter::once(&BlockMapEntry { num_blocks: 0, length: 0 })).for_each(|entry| {
            buffer.extend_from_slice(&entry.num_blocks.to_le_bytes());
            buffer.extend_from_slice(&entry.length.to_le_bytes());
        });
        buffer
    }

    /// Full byte image of the volume.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buffer = self.header_bytes();
        buffer.extend_from_slice(&self.body);
        buffer
    }
}
