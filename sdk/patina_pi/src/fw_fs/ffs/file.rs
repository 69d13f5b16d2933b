//! Firmware File System (FFS) File Definitions
//!
//! Based on the values defined in the UEFI Platform Initialization (PI) Specification V1.8A Section 3.2.3.1
//! EFI_FFS_FILE_HEADER.
//!
//! ## License
//!
//! Copyright (c) Microsoft Corporation.
//!
//! SPDX-License-Identifier: Apache-2.0
//!

use r_efi::efi;

/// Raw FFS file constant definitions
pub mod raw {
    /// File State Bits
    ///
    /// When the containing volume has `EFI_FVB2_ERASE_POLARITY` set, these bits are stored inverted.
    pub mod state {
        /// File header is under construction
        pub const HEADER_CONSTRUCTION: u8 = 0x01;
        /// File header is valid
        pub const HEADER_VALID: u8 = 0x02;
        /// File data is valid
        pub const DATA_VALID: u8 = 0x04;
        /// File is marked for update
        pub const MARKED_FOR_UPDATE: u8 = 0x08;
        /// File has been deleted
        pub const DELETED: u8 = 0x10;
        /// File header is invalid
        pub const HEADER_INVALID: u8 = 0x20;
    }

    /// File Type Definitions
    pub mod r#type {
        /// Raw data file
        pub const RAW: u8 = 0x01;
        /// Freeform file
        pub const FREEFORM: u8 = 0x02;
        /// Security (SEC) core file
        pub const SECURITY_CORE: u8 = 0x03;
        /// PEI core file
        pub const PEI_CORE: u8 = 0x04;
        /// DXE core file
        pub const DXE_CORE: u8 = 0x05;
        /// Pre-EFI module (PEIM) file
        pub const PEIM: u8 = 0x06;
        /// Driver Execution Environment (DXE) driver file
        pub const DRIVER: u8 = 0x07;
        /// Application file
        pub const APPLICATION: u8 = 0x09;
        /// Firmware volume image file
        pub const FIRMWARE_VOLUME_IMAGE: u8 = 0x0B;
        /// FFS pad file type
        pub const FFS_PAD: u8 = 0xf0;
    }

    /// Value stored in `integrity_check_file` when the CHECKSUM attribute is clear.
    pub const FILE_CHECKSUM_NOT_PRESENT: u8 = 0xAA;
}

/// EFI_FFS_FILE_HEADER
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Unique file GUID identifier
    pub name: efi::Guid,
    /// Header checksum value
    pub integrity_check_header: u8,
    /// File checksum value
    pub integrity_check_file: u8,
    /// Type of file (see file type constants)
    pub file_type: u8,
    /// File attributes
    pub attributes: u8,
    /// 24-bit file size in bytes, header included
    pub size: [u8; 3],
    /// File state (see state constants)
    pub state: u8,
}

/// EFI_FFS_FILE_HEADER2, used for files whose size does not fit in 24 bits.
///
/// `header.size` is zero and `header.attributes` carries `LARGE_FILE`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header2 {
    /// Standard file header
    pub header: Header,
    /// Extended 64-bit file size in bytes, header included
    pub extended_size: u64,
}
