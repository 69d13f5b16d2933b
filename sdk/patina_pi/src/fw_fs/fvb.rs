//! Firmware Volume Block (FVB) Attribute Definitions
//!
//! Based on the values defined in the UEFI Platform Initialization (PI) Specification V1.8A Section 3.2.1.1
//! EFI_FIRMWARE_VOLUME_HEADER.
//!
//! ## License
//!
//! Copyright (c) Microsoft Corporation.
//!
//! SPDX-License-Identifier: Apache-2.0
//!

/// Firmware Volume Block attributes
pub mod attributes {
    /// Type alias for firmware volume block attributes (version 2) as defined in the PI Specification
    pub type EfiFvbAttributes2 = u32;

    /// EFI_FVB_ATTRIBUTES_2 bit definitions
    /// Note: Typically named `EFI_FVB2_*` in EDK II code.
    pub mod raw {
        /// Raw FVB2 attribute constant definitions
        pub mod fvb2 {
            /// Current read enable/disable status
            pub const READ_STATUS: u32 = 0x00000004;
            /// Current write enable/disable status
            pub const WRITE_STATUS: u32 = 0x00000020;
            /// Block can be memory-mapped
            pub const MEMORY_MAPPED: u32 = 0x00000400;
            /// Erased flash bits read as 1
            pub const ERASE_POLARITY: u32 = 0x00000800;
            /// 8-byte alignment requirement
            pub const ALIGNMENT_8: u32 = 0x00030000;
        }
    }
}
