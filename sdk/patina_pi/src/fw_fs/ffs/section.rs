//! Firmware File System (FFS) Section Definition
//!
//! Based on the values defined in the UEFI Platform Initialization (PI) Specification V1.8A Section 3.2.4
//! Firmware File Section.
//!
//! ## License
//!
//! Copyright (c) Microsoft Corporation.
//!
//! SPDX-License-Identifier: Apache-2.0
//!

/// Type alias for section type identifiers
pub type EfiSectionType = u8;

/// Firmware File System Section Types
/// Note: Typically called `EFI_SECTION_*` in EDK II code.
pub mod raw_type {
    /// Encapsulated section type constants
    pub mod encapsulated {
        /// Compression encapsulated section
        pub const COMPRESSION: u8 = 0x01;
        /// GUID-defined encapsulated section
        pub const GUID_DEFINED: u8 = 0x02;
        /// Disposable encapsulated section
        pub const DISPOSABLE: u8 = 0x03;
    }
    /// PE32 executable section
    pub const PE32: u8 = 0x10;
    /// Position-independent code section
    pub const PIC: u8 = 0x11;
    /// Terse executable section
    pub const TE: u8 = 0x12;
    /// DXE dependency expression section
    pub const DXE_DEPEX: u8 = 0x13;
    /// Version information section
    pub const VERSION: u8 = 0x14;
    /// User interface string section
    pub const USER_INTERFACE: u8 = 0x15;
    /// Firmware volume image section
    pub const FIRMWARE_VOLUME_IMAGE: u8 = 0x17;
    /// Freeform GUID subtype section
    pub const FREEFORM_SUBTYPE_GUID: u8 = 0x18;
    /// Raw data section
    pub const RAW: u8 = 0x19;
    /// PEI dependency expression section
    pub const PEI_DEPEX: u8 = 0x1B;
}

/// EFI_COMMON_SECTION_HEADER per PI spec 1.8A 3.2.4.1
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Section size (24-bit), header included
    pub size: [u8; 3],
    /// Section type identifier
    pub section_type: u8,
}

/// Section header structures and definitions
pub mod header {
    use r_efi::efi;

    /// EFI_COMMON_SECTION_HEADER2 per PI spec 1.8A 3.2.4.1
    ///
    /// `size` is `0xFFFFFF` and the real size lives in `extended_size`.
    #[repr(C)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CommonSectionHeaderExtended {
        /// Section size, always `0xFFFFFF`
        pub size: [u8; 3],
        /// Section type identifier
        pub section_type: u8,
        /// Extended 32-bit section size, header included
        pub extended_size: u32,
    }

    /// EFI_COMPRESSION_SECTION per PI spec 1.8A 3.2.5.2
    #[repr(C, packed)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Compression {
        /// Uncompressed data length
        pub uncompressed_length: u32,
        /// Compression algorithm type
        pub compression_type: u8,
    }
    /// No compression applied
    pub const NOT_COMPRESSED: u8 = 0x00;
    /// Standard compression
    pub const STANDARD_COMPRESSION: u8 = 0x01;

    /// EFI_GUID_DEFINED_SECTION per PI spec 1.8A 3.2.5.7
    #[repr(C)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GuidDefined {
        /// GUID identifying the section format
        pub section_definition_guid: efi::Guid,
        /// Offset to section data from start of the common header
        pub data_offset: u16,
        /// Section attributes
        pub attributes: u16,
        // Guid-specific header fields.
    }

    /// GUID-defined section attribute bits
    pub mod guid_defined_attributes {
        /// Content must be processed by the GUID tool before use
        pub const PROCESSING_REQUIRED: u16 = 0x01;
        /// Authentication status is valid
        pub const AUTH_STATUS_VALID: u16 = 0x02;
    }
}
