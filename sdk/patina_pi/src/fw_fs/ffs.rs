//! Firmware File System (FFS) Definitions and Support Code
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
pub mod attributes;
pub mod file;
pub mod guid;
pub mod section;

/// Largest value that fits the 24-bit packed size field of file and section headers.
pub const MAX_PACKED_SIZE: usize = 0xFFFFFF;

/// Decode a 24-bit little-endian packed size.
pub const fn packed_size(size: &[u8; 3]) -> usize {
    (size[0] as usize) | ((size[1] as usize) << 8) | ((size[2] as usize) << 16)
}

/// Encode `size` as a 24-bit little-endian packed size.
///
/// Returns `None` if `size` does not fit in 24 bits.
pub const fn pack_size(size: usize) -> Option<[u8; 3]> {
    if size > MAX_PACKED_SIZE {
        return None;
    }
    Some([size as u8, (size >> 8) as u8, (size >> 16) as u8])
}
