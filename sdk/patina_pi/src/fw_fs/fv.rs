//! Firmware Volume (FV) Definitions and Support Code
//!
//! Based on the values defined in the UEFI Platform Initialization (PI) Specification V1.8A 3.1 Firmware Storage
//! Code Definitions.
//!
//! ## License
//!
//! Copyright (c) Microsoft Corporation.
//!
//! SPDX-License-Identifier: Apache-2.0
//!

use r_efi::efi;

/// Firmware File System revision number
pub const FFS_REVISION: u8 = 2;
/// Maximum file size for FFS version 2 (16MB)
pub const FFS_V2_MAX_FILE_SIZE: usize = 0x1000000;
/// `_FVH`
pub const SIGNATURE: u32 = u32::from_le_bytes(*b"_FVH");

/// EFI_FIRMWARE_VOLUME_HEADER
///
/// The block map follows the fixed header and is terminated by a zeroed [`BlockMapEntry`].
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Header {
    /// First 16 bytes are zeros for compatibility
    pub zero_vector: [u8; 16],
    /// File system type GUID
    pub file_system_guid: efi::Guid,
    /// Total volume length in bytes
    pub fv_length: u64,
    /// Firmware volume signature
    pub signature: u32,
    /// Volume attributes
    pub attributes: u32,
    /// Length of this header, block map included
    pub header_length: u16,
    /// Header checksum
    pub checksum: u16,
    /// Offset to extended header (0 if none)
    pub ext_header_offset: u16,
    /// Reserved byte (must be 0)
    pub reserved: u8,
    /// Header revision number
    pub revision: u8,
    /// Variable-length block map array
    pub block_map: [BlockMapEntry; 0],
}

/// EFI_FV_BLOCK_MAP_ENTRY
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockMapEntry {
    /// Number of blocks of this size
    pub num_blocks: u32,
    /// Length of each block
    pub length: u32,
}

/// EFI_FIRMWARE_VOLUME_EXT_HEADER
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtHeader {
    /// Firmware volume name GUID
    pub fv_name: efi::Guid,
    /// Size of the extended header, entries included
    pub ext_header_size: u32,
}

/// EFI_FIRMWARE_VOLUME_EXT_ENTRY
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtEntryHeader {
    /// Size of the entry, this header included
    pub ext_entry_size: u16,
    /// Entry type (see [`ext_entry_type`])
    pub ext_entry_type: u16,
}

/// EFI_FIRMWARE_VOLUME_EXT_ENTRY_USED_SIZE_TYPE
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtEntryUsedSize {
    /// Entry header; `ext_entry_type` is [`ext_entry_type::USED_SIZE`]
    pub hdr: ExtEntryHeader,
    /// Bytes in use from the start of the volume
    pub used_size: u32,
}

/// Extended header entry types
pub mod ext_entry_type {
    /// EFI_FV_EXT_TYPE_OEM_TYPE
    pub const OEM_TYPE: u16 = 0x01;
    /// EFI_FV_EXT_TYPE_GUID_TYPE
    pub const GUID_TYPE: u16 = 0x02;
    /// EFI_FV_EXT_TYPE_USED_SIZE_TYPE
    pub const USED_SIZE: u16 = 0x03;
}
