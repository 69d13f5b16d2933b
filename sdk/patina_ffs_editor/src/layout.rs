//! Alignment helpers for FFS layout.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: Apache-2.0
//!
use crate::FvEditError;

/// Files start at 8-byte aligned offsets within a volume.
pub const FILE_ALIGNMENT: usize = 8;
/// Sections start at 4-byte aligned offsets within a file or encapsulation section.
pub const SECTION_ALIGNMENT: usize = 4;
/// Byte written for file pads and volume free space, whatever the volume's erase polarity.
pub const FILL_BYTE: u8 = 0xff;

/// Aligns `value` up to `align`, which must be a power of two.
pub const fn align_up(value: usize, align: usize) -> Result<usize, FvEditError> {
    if !align.is_power_of_two() {
        return Err(FvEditError::InvalidParameter);
    }
    let align_mask = align - 1;
    if value & align_mask == 0 {
        Ok(value)
    } else {
        match (value | align_mask).checked_add(1) {
            Some(aligned) => Ok(aligned),
            None => Err(FvEditError::InvalidParameter),
        }
    }
}

/// Number of pad bytes that bring `size` up to a multiple of `align`.
pub const fn pad_len(size: usize, align: usize) -> Result<usize, FvEditError> {
    match align_up(size, align) {
        Ok(aligned) => Ok(aligned - size),
        Err(err) => Err(err),
    }
}

/// Rounds `value` up to a multiple of `block`. Block lengths are not required to be powers of two.
pub fn round_up_to_block(value: usize, block: usize) -> Result<usize, FvEditError> {
    if block == 0 {
        Err(FvEditError::InvalidBlockMap)?;
    }
    value.div_ceil(block).checked_mul(block).ok_or(FvEditError::InvalidBlockMap)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn align_up_should_require_power_of_two() {
        assert_eq!(align_up(13, 8), Ok(16));
        assert_eq!(align_up(16, 8), Ok(16));
        assert_eq!(align_up(13, 6), Err(FvEditError::InvalidParameter));
        assert_eq!(align_up(usize::MAX, 8), Err(FvEditError::InvalidParameter));
    }

    #[test]
    fn pad_len_should_complete_alignment() {
        assert_eq!(pad_len(0x1d, FILE_ALIGNMENT), Ok(3));
        assert_eq!(pad_len(0x20, FILE_ALIGNMENT), Ok(0));
        assert_eq!(pad_len(0x1d, SECTION_ALIGNMENT), Ok(3));
    }

    #[test]
    fn round_up_to_block_should_quantize() {
        assert_eq!(round_up_to_block(0xa00, 0x1000), Ok(0x1000));
        assert_eq!(round_up_to_block(0x1000, 0x1000), Ok(0x1000));
        assert_eq!(round_up_to_block(0, 0x1000), Ok(0));
        assert_eq!(round_up_to_block(7, 3), Ok(9));
        assert_eq!(round_up_to_block(7, 0), Err(FvEditError::InvalidBlockMap));
    }
}
