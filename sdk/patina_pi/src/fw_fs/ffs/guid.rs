//! Firmware File System (FFS) Format GUIDs
//!
//! Based on the values defined in the UEFI Platform Initialization (PI) Specification V1.8A Section 3.2.2
//! Firmware File System.
//!
//! ## License
//!
//! Copyright (c) Microsoft Corporation.
//!
//! SPDX-License-Identifier: Apache-2.0
//!
use r_efi::efi;

/// EFI_FIRMWARE_FILE_SYSTEM2_GUID: file system without large file support.
pub const EFI_FIRMWARE_FILE_SYSTEM2_GUID: efi::Guid =
    efi::Guid::from_fields(0x8c8ce578, 0x8a3d, 0x4f1c, 0x99, 0x35, &[0x89, 0x61, 0x85, 0xc3, 0x2d, 0xd3]);

/// EFI_FIRMWARE_FILE_SYSTEM3_GUID: file system that may contain files with `EFI_FFS_FILE_HEADER2`.
pub const EFI_FIRMWARE_FILE_SYSTEM3_GUID: efi::Guid =
    efi::Guid::from_fields(0x5473c07a, 0x3dcb, 0x4dca, 0xbd, 0x6f, &[0x1e, 0x96, 0x89, 0xe7, 0x34, 0x9a]);
