//! Firmware File System (FFS) file payloads for firmware volume trees.
//!
//! [`FileNode`] holds one FFS file as it sits inside a volume: the header (standard or large), the body bytes
//! (the file's sections, padded between one another) and the trailing pad that brings the file to an 8-byte
//! boundary. The header variant, size fields and checksums are kept consistent with the body by the methods here.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: Apache-2.0
//!
use alloc::vec::Vec;
use core::{iter, mem, slice::from_raw_parts};
use patina_pi::fw_fs::ffs::{self, attributes, file};
use r_efi::efi;

use crate::{FvEditError, layout};

const HEADER_LENGTH: usize = mem::size_of::<file::Header>();
const HEADER2_LENGTH: usize = mem::size_of::<file::Header2>();

/// Direction of a header variant change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderSwitch {
    /// The file moved from `EFI_FFS_FILE_HEADER` to `EFI_FFS_FILE_HEADER2`.
    ToExtended,
    /// The file moved from `EFI_FFS_FILE_HEADER2` back to `EFI_FFS_FILE_HEADER`.
    ToStandard,
}

/// FFS file header, either the 24-bit packed size form or the large-file form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileHeader {
    /// `EFI_FFS_FILE_HEADER` with a 24-bit size.
    Standard(file::Header),
    /// `EFI_FFS_FILE_HEADER2` with a 64-bit size.
    Extended(file::Header2),
}

impl FileHeader {
    /// Builds a header for a file of `size` bytes (header included), picking the smallest variant that fits.
    ///
    /// `size` is measured against the standard header; when it does not fit, the extended header's extra eight
    /// bytes are added.
    pub fn new(name: efi::Guid, file_type: u8, attributes: u8, size: usize) -> Self {
        let header = file::Header {
            name,
            integrity_check_header: 0,
            integrity_check_file: 0,
            file_type,
            attributes: attributes & !attributes::raw::LARGE_FILE,
            size: [0u8; 3],
            state: file::raw::state::HEADER_CONSTRUCTION
                | file::raw::state::HEADER_VALID
                | file::raw::state::DATA_VALID,
        };
        match ffs::pack_size(size) {
            Some(packed) => FileHeader::Standard(file::Header { size: packed, ..header }),
            None => FileHeader::Extended(file::Header2 {
                header: file::Header { attributes: header.attributes | attributes::raw::LARGE_FILE, ..header },
                extended_size: (size + HEADER2_LENGTH - HEADER_LENGTH) as u64,
            }),
        }
    }

    /// The fields shared by both variants.
    pub fn common(&self) -> &file::Header {
        match self {
            FileHeader::Standard(header) => header,
            FileHeader::Extended(header2) => &header2.header,
        }
    }

    fn common_mut(&mut self) -> &mut file::Header {
        match self {
            FileHeader::Standard(header) => header,
            FileHeader::Extended(header2) => &mut header2.header,
        }
    }

    /// Serialized header length.
    pub fn header_length(&self) -> usize {
        match self {
            FileHeader::Standard(_) => HEADER_LENGTH,
            FileHeader::Extended(_) => HEADER2_LENGTH,
        }
    }

    /// File size recorded in the header, header included.
    pub fn size(&self) -> usize {
        match self {
            FileHeader::Standard(header) => ffs::packed_size(&header.size),
            FileHeader::Extended(header2) => header2.extended_size as usize,
        }
    }

    /// Record `size` in the header without changing variants.
    pub fn set_size(&mut self, size: usize) -> Result<(), FvEditError> {
        if size < self.header_length() {
            Err(FvEditError::InvalidParameter)?;
        }
        match self {
            FileHeader::Standard(header) => {
                header.size = ffs::pack_size(size).ok_or(FvEditError::InvalidParameter)?;
            }
            FileHeader::Extended(header2) => {
                header2.extended_size = size as u64;
            }
        }
        Ok(())
    }

    /// Decrease the recorded size by `delta` (a negative `delta` grows it).
    ///
    /// Rewrites the 3-byte packed size or the extended size depending on the variant. Fails if the result does
    /// not fit the current variant.
    pub fn change_size(&mut self, delta: isize) -> Result<(), FvEditError> {
        let size = (self.size() as isize).checked_sub(delta).ok_or(FvEditError::InvalidParameter)?;
        let size = usize::try_from(size).map_err(|_| FvEditError::InvalidParameter)?;
        self.set_size(size)
    }

    /// Whether this is the large-file variant.
    pub fn is_extended(&self) -> bool {
        matches!(self, FileHeader::Extended(_))
    }

    /// Convert to the large-file variant. The size grows by the extra header bytes.
    pub fn to_extended(self) -> Self {
        match self {
            FileHeader::Standard(header) => FileHeader::Extended(file::Header2 {
                extended_size: (ffs::packed_size(&header.size) + HEADER2_LENGTH - HEADER_LENGTH) as u64,
                header: file::Header {
                    attributes: header.attributes | attributes::raw::LARGE_FILE,
                    size: [0u8; 3],
                    ..header
                },
            }),
            extended => extended,
        }
    }

    /// Convert to the standard variant. The size shrinks by the extra header bytes.
    pub fn to_standard(self) -> Result<Self, FvEditError> {
        match self {
            FileHeader::Extended(header2) => {
                let size = (header2.extended_size as usize)
                    .checked_sub(HEADER2_LENGTH - HEADER_LENGTH)
                    .ok_or(FvEditError::InvalidParameter)?;
                Ok(FileHeader::Standard(file::Header {
                    attributes: header2.header.attributes & !attributes::raw::LARGE_FILE,
                    size: ffs::pack_size(size).ok_or(FvEditError::InvalidParameter)?,
                    ..header2.header
                }))
            }
            standard => Ok(standard),
        }
    }

    /// Canonical byte layout of the header.
    pub fn serialize(&self) -> Vec<u8> {
        match self {
            // safety: header is repr(C) without padding.
            FileHeader::Standard(header) => {
                unsafe { from_raw_parts(header as *const file::Header as *const u8, HEADER_LENGTH) }.to_vec()
            }
            // safety: header2 is repr(C) without padding.
            FileHeader::Extended(header2) => {
                unsafe { from_raw_parts(header2 as *const file::Header2 as *const u8, HEADER2_LENGTH) }.to_vec()
            }
        }
    }
}

/// An FFS file inside a firmware volume tree.
///
/// The body holds the serialized sections of the file. When the file has section children in a
/// [`FvTree`](crate::tree::FvTree), the body is their concatenation; a file without children keeps its body as
/// given.
#[derive(Debug, Clone)]
pub struct FileNode {
    header: FileHeader,
    body: Vec<u8>,
    pad_len: usize,
}

impl FileNode {
    /// Create a file with a valid header, checksums and pad for `body`.
    ///
    /// The state byte is `HEADER_CONSTRUCTION | HEADER_VALID | DATA_VALID` as written for a volume without
    /// erase polarity; the handler inverts it when inserting into a volume with erase polarity set.
    ///
    /// ## Examples
    ///
    /// ```rust
    /// use patina_ffs_editor::file::FileNode;
    /// use patina_pi::fw_fs::ffs::file;
    /// use r_efi::efi;
    ///
    /// let node = FileNode::new(efi::Guid::from_bytes(&[1u8; 16]), file::raw::r#type::RAW, 0, vec![0x5a; 13]);
    /// assert_eq!(node.size(), 24 + 13);
    /// assert_eq!(node.total_size() % 8, 0);
    /// ```
    pub fn new(name: efi::Guid, file_type: u8, attributes: u8, body: Vec<u8>) -> Self {
        let header = FileHeader::new(name, file_type, attributes, HEADER_LENGTH + body.len());
        let pad_len = Self::pad_for(header.size());
        let mut node = Self { header, body, pad_len };
        node.update_checksum();
        node
    }

    /// Create a file from an existing header and body.
    ///
    /// The header size must already describe `body`. Checksums are kept as given.
    pub fn from_parts(header: FileHeader, body: Vec<u8>) -> Result<Self, FvEditError> {
        if header.size() != header.header_length() + body.len() {
            Err(FvEditError::InvalidParameter)?;
        }
        let pad_len = Self::pad_for(header.size());
        Ok(Self { header, body, pad_len })
    }

    fn pad_for(size: usize) -> usize {
        (layout::FILE_ALIGNMENT - (size % layout::FILE_ALIGNMENT)) % layout::FILE_ALIGNMENT
    }

    /// File header.
    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// File name GUID.
    pub fn name(&self) -> efi::Guid {
        self.header.common().name
    }

    /// Raw FFS file type.
    pub fn file_type(&self) -> u8 {
        self.header.common().file_type
    }

    /// Raw FFS attributes.
    pub fn attributes(&self) -> u8 {
        self.header.common().attributes
    }

    /// Raw state byte as stored.
    pub fn state(&self) -> u8 {
        self.header.common().state
    }

    /// Overwrite the raw state byte.
    pub fn set_state(&mut self, state: u8) {
        self.header.common_mut().state = state;
    }

    /// Bit-invert the state byte, as required when the containing volume has erase polarity set.
    pub fn invert_state(&mut self) {
        let state = self.state();
        self.set_state(!state);
    }

    /// File body, excluding header and trailing pad.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// File size from the header, header included.
    pub fn size(&self) -> usize {
        self.header.size()
    }

    /// Header length of the current variant.
    pub fn header_length(&self) -> usize {
        self.header.header_length()
    }

    /// Whether the file uses `EFI_FFS_FILE_HEADER2`.
    pub fn is_large(&self) -> bool {
        self.header.is_extended()
    }

    /// Length of the trailing pad.
    pub fn pad_len(&self) -> usize {
        self.pad_len
    }

    /// Size of the file as laid out in a volume: header, body and pad.
    pub fn total_size(&self) -> usize {
        self.size() + self.pad_len
    }

    /// Shrink the recorded size by `delta` bytes; a negative `delta` grows it.
    pub fn change_size(&mut self, delta: isize) -> Result<(), FvEditError> {
        self.header.change_size(delta)
    }

    /// Replace the body, adjusting the size field and header variant to match.
    ///
    /// Checksums and pad are not recomputed; callers follow up with [`Self::update_pad`] and
    /// [`Self::update_checksum`].
    pub fn set_body(&mut self, body: Vec<u8>) -> Result<Option<HeaderSwitch>, FvEditError> {
        let delta = body.len() as isize - self.body.len() as isize;
        let mut switch = None;
        if !self.header.is_extended() && (self.size() as isize + delta) as usize > ffs::MAX_PACKED_SIZE {
            self.header = self.header.to_extended();
            switch = Some(HeaderSwitch::ToExtended);
        }
        self.header.change_size(-delta)?;
        self.body = body;
        if switch.is_none() {
            switch = self.fit_header()?;
        }
        Ok(switch)
    }

    /// Overwrite the leading bytes of the body in place. Returns whether any byte changed.
    pub fn overwrite_body_prefix(&mut self, prefix: &[u8]) -> Result<bool, FvEditError> {
        let target = self.body.get_mut(..prefix.len()).ok_or(FvEditError::InvalidParameter)?;
        if target == prefix {
            return Ok(false);
        }
        target.copy_from_slice(prefix);
        Ok(true)
    }

    /// Pick the header variant the current size requires.
    ///
    /// A standard header whose size no longer fits 24 bits becomes a large-file header, and a large-file header
    /// whose size fits again goes back to the standard form.
    pub fn fit_header(&mut self) -> Result<Option<HeaderSwitch>, FvEditError> {
        match self.header {
            FileHeader::Standard(_) if self.size() > ffs::MAX_PACKED_SIZE => {
                self.header = self.header.to_extended();
                Ok(Some(HeaderSwitch::ToExtended))
            }
            FileHeader::Extended(_)
                if self.size().saturating_sub(HEADER2_LENGTH - HEADER_LENGTH) <= ffs::MAX_PACKED_SIZE =>
            {
                self.header = self.header.to_standard()?;
                Ok(Some(HeaderSwitch::ToStandard))
            }
            _ => Ok(None),
        }
    }

    /// Recompute the trailing pad for 8-byte file alignment. Returns the change in pad length.
    pub fn update_pad(&mut self) -> Result<isize, FvEditError> {
        let pad_len = layout::pad_len(self.size(), layout::FILE_ALIGNMENT)?;
        let delta = pad_len as isize - self.pad_len as isize;
        self.pad_len = pad_len;
        Ok(delta)
    }

    /// Recompute `integrity_check_header` and `integrity_check_file` from the current header and body.
    pub fn update_checksum(&mut self) {
        // data checksum
        let file_checksum = if self.attributes() & attributes::raw::CHECKSUM != 0 {
            0u8.wrapping_sub(self.body.iter().fold(0u8, |sum, value| sum.wrapping_add(*value)))
        } else {
            file::raw::FILE_CHECKSUM_NOT_PRESENT
        };

        // header checksum (excludes state and integrity_check_file, set to zero)
        let mut scratch = self.header;
        let common = scratch.common_mut();
        common.integrity_check_header = 0;
        common.integrity_check_file = 0;
        common.state = 0;
        let sum = scratch.serialize().iter().fold(0u8, |sum, value| sum.wrapping_add(*value));

        let common = self.header.common_mut();
        common.integrity_check_header = 0u8.wrapping_sub(sum);
        common.integrity_check_file = file_checksum;
    }

    /// Header and body bytes, without the trailing pad.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buffer = self.header.serialize();
        buffer.extend_from_slice(&self.body);
        buffer
    }

    /// Header, body and trailing pad bytes.
    pub fn serialize_padded(&self) -> Vec<u8> {
        let mut buffer = self.serialize();
        buffer.extend(iter::repeat_n(layout::FILL_BYTE, self.pad_len));
        buffer
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use patina_pi::fw_fs::ffs::file::raw::{state, r#type};

    fn header_sum(node: &FileNode) -> u8 {
        let bytes = node.header().serialize();
        bytes
            .iter()
            .fold(0u8, |sum, value| sum.wrapping_add(*value))
            .wrapping_sub(node.state())
            .wrapping_sub(node.header().common().integrity_check_file)
    }

    #[test]
    fn new_file_should_have_valid_checksums_and_pad() {
        let node = FileNode::new(efi::Guid::from_bytes(&[0x11; 16]), r#type::RAW, 0, vec![0xa5; 0x1d]);
        assert_eq!(node.size(), 0x18 + 0x1d);
        assert_eq!(node.pad_len(), 3);
        assert_eq!(node.total_size(), 0x38);
        assert_eq!(header_sum(&node), 0);
        assert_eq!(node.header().common().integrity_check_file, 0xaa);
        assert_eq!(node.state(), state::HEADER_CONSTRUCTION | state::HEADER_VALID | state::DATA_VALID);
        assert_eq!(node.serialize_padded().len(), node.total_size());
        assert_eq!(&node.serialize_padded()[0x35..], &[0xff, 0xff, 0xff]);
    }

    #[test]
    fn data_checksum_should_cover_body() {
        let node =
            FileNode::new(efi::Guid::from_bytes(&[0x22; 16]), r#type::RAW, attributes::raw::CHECKSUM, vec![1, 2, 3]);
        let body_sum = node.body().iter().fold(0u8, |sum, value| sum.wrapping_add(*value));
        assert_eq!(body_sum.wrapping_add(node.header().common().integrity_check_file), 0);
        assert_eq!(header_sum(&node), 0);
    }

    #[test]
    fn header_checksum_should_ignore_state() {
        let mut node = FileNode::new(efi::Guid::from_bytes(&[0x33; 16]), r#type::DRIVER, 0, vec![0; 8]);
        let checksum = node.header().common().integrity_check_header;
        node.invert_state();
        node.update_checksum();
        assert_eq!(node.header().common().integrity_check_header, checksum);
        assert_eq!(node.state(), !(state::HEADER_CONSTRUCTION | state::HEADER_VALID | state::DATA_VALID));
    }

    #[test]
    fn change_size_should_rewrite_packed_and_extended_sizes() -> Result<(), FvEditError> {
        let mut header = FileHeader::new(efi::Guid::from_bytes(&[0; 16]), r#type::RAW, 0, 0x100);
        header.change_size(-0x20)?;
        assert_eq!(header.size(), 0x120);
        assert_eq!(header.serialize()[0x14..0x17], [0x20, 0x01, 0x00]);

        let mut extended = header.to_extended();
        assert_eq!(extended.size(), 0x128);
        extended.change_size(0x8)?;
        assert_eq!(extended.size(), 0x120);
        assert_eq!(extended.serialize()[0x14..0x17], [0, 0, 0]);
        assert_eq!(extended.serialize()[0x18..0x20], 0x120u64.to_le_bytes());

        assert_eq!(header.change_size(0x200), Err(FvEditError::InvalidParameter));
        Ok(())
    }

    #[test]
    fn oversized_body_should_switch_to_extended_header() -> Result<(), FvEditError> {
        let mut node = FileNode::new(efi::Guid::from_bytes(&[0x44; 16]), r#type::RAW, 0, vec![0; 0x100]);
        let switch = node.set_body(vec![0; ffs::MAX_PACKED_SIZE])?;
        assert_eq!(switch, Some(HeaderSwitch::ToExtended));
        assert!(node.is_large());
        assert_eq!(node.size(), HEADER2_LENGTH + ffs::MAX_PACKED_SIZE);
        assert_ne!(node.attributes() & attributes::raw::LARGE_FILE, 0);

        let switch = node.set_body(vec![0; 0x10])?;
        assert_eq!(switch, Some(HeaderSwitch::ToStandard));
        assert!(!node.is_large());
        assert_eq!(node.size(), HEADER_LENGTH + 0x10);
        assert_eq!(node.attributes() & attributes::raw::LARGE_FILE, 0);
        Ok(())
    }

    #[test]
    fn from_parts_should_reject_inconsistent_size() {
        let header = FileHeader::new(efi::Guid::from_bytes(&[0; 16]), r#type::RAW, 0, 0x30);
        assert!(FileNode::from_parts(header, vec![0; 0x18]).is_ok());
        assert_eq!(FileNode::from_parts(header, vec![0; 0x10]).err(), Some(FvEditError::InvalidParameter));
    }
}
