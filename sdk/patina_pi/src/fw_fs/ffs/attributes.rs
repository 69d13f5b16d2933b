//! Firmware File System (FFS) File Attribute Definitions
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

/// Raw FFS attribute constant definitions
pub mod raw {
    /// File uses `EFI_FFS_FILE_HEADER2` with a 64-bit size
    pub const LARGE_FILE: u8 = 0x01;
    /// 2-byte data alignment
    pub const DATA_ALIGNMENT_2: u8 = 0x02;
    /// File must be at a fixed address
    pub const FIXED: u8 = 0x04;
    /// Data alignment mask
    pub const DATA_ALIGNMENT: u8 = 0x38;
    /// File data is covered by `integrity_check_file`
    pub const CHECKSUM: u8 = 0x40;
}
