//! Section Definition GUIDs
//!
//! GUIDs used in `EFI_GUID_DEFINED_SECTION.SectionDefinitionGuid` by the EDK II build tools.
//!
//! ## License
//!
//! Copyright (c) Microsoft Corporation.
//!
//! SPDX-License-Identifier: Apache-2.0
//!
use r_efi::efi;

/// LZMA compressed section (LzmaCompress).
pub const LZMA_SECTION: efi::Guid =
    efi::Guid::from_fields(0xEE4E5898, 0x3914, 0x4259, 0x9D, 0x6E, &[0xDC, 0x7B, 0xD7, 0x94, 0x03, 0xCF]);

/// LZMA compressed section using the x86 branch converter (LzmaF86Compress).
pub const LZMA_F86_SECTION: efi::Guid =
    efi::Guid::from_fields(0xD42AE6BD, 0x1352, 0x4bfb, 0x90, 0x9A, &[0xCA, 0x72, 0xA6, 0xEA, 0xE8, 0x89]);

/// Brotli compressed section (BrotliCompress).
pub const BROTLI_SECTION: efi::Guid =
    efi::Guid::from_fields(0x3D532050, 0x5CDA, 0x4FD0, 0x87, 0x9E, &[0x0F, 0x7F, 0x63, 0x0D, 0x5A, 0xFB]);

/// Tiano compressed section (TianoCompress).
pub const TIANO_SECTION: efi::Guid =
    efi::Guid::from_fields(0xA31280AD, 0x481E, 0x41B6, 0x95, 0xE8, &[0x12, 0x7F, 0x4C, 0x98, 0x47, 0x79]);

/// CRC32 authenticated section (GenCrc32).
pub const CRC32_SECTION: efi::Guid =
    efi::Guid::from_fields(0xFC1BCDB0, 0x7D31, 0x49AA, 0x93, 0x6A, &[0xA4, 0x60, 0x0D, 0x9D, 0xD0, 0x83]);
