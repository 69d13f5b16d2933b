//! Module for LZMA compressed sections.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: Apache-2.0
//!
use alloc::vec::Vec;
use lzma_rs::compress::{Options, UnpackedSize};
use patina_ffs_editor::{FvEditError, GuidTool};
use std::io::Cursor;

/// Unpacked size recorded in an LZMA header when the stream length is not known.
pub const LZMA_UNKNOWN_UNPACKED_SIZE_MAGIC_VALUE: u64 = 0xFFFF_FFFF_FFFF_FFFF;

const LZMA_HEADER_LEN: usize = 13;
const MAX_PREALLOCATION: u64 = 0x100_0000;

/// Encoder for LZMA compressed sections.
///
/// Output is a legacy `.lzma` stream with the unpacked size written to its header.
#[derive(Default, Clone, Copy, Debug)]
pub struct LzmaGuidTool;

impl GuidTool for LzmaGuidTool {
    fn pack(&self, data: &[u8]) -> Result<Vec<u8>, FvEditError> {
        let mut output = Vec::new();
        let options = Options { unpacked_size: UnpackedSize::WriteToHeader(Some(data.len() as u64)) };
        lzma_rs::lzma_compress_with_options(&mut Cursor::new(data), &mut output, &options).map_err(|err| {
            log::error!("LZMA compression failed: {err}");
            FvEditError::ComposeFailed
        })?;
        log::trace!("LZMA packed {:#x} bytes into {:#x}", data.len(), output.len());
        Ok(output)
    }

    fn unpack(&self, data: &[u8]) -> Result<Vec<u8>, FvEditError> {
        let Some(header) = data.get(..LZMA_HEADER_LEN) else {
            log::warn!("LZMA section data is shorter than the stream header");
            return Err(FvEditError::DataCorrupt);
        };

        // Header size is untrusted, so pre-allocation is capped.
        let mut size = [0u8; 8];
        size.copy_from_slice(&header[5..]);
        let mut output = match u64::from_le_bytes(size) {
            LZMA_UNKNOWN_UNPACKED_SIZE_MAGIC_VALUE => Vec::new(),
            size => Vec::with_capacity(size.min(MAX_PREALLOCATION) as usize),
        };

        lzma_rs::lzma_decompress(&mut Cursor::new(data), &mut output).map_err(|err| {
            log::warn!("LZMA decompression failed: {err}");
            FvEditError::DataCorrupt
        })?;
        Ok(output)
    }
}
