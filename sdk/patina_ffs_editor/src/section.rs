//! FFS section payloads for firmware volume trees.
//!
//! [`SectionNode`] holds one section: its common header (standard or extended), the type-specific extension
//! header, the logical content and, for GUID-defined sections, the content as encoded by the section's GUID tool.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: Apache-2.0
//!
use alloc::vec::Vec;
use core::{iter, mem, slice::from_raw_parts};
use patina_pi::fw_fs::ffs::{
    self,
    section::{self, header, raw_type},
};
use r_efi::efi;

use crate::{FvEditError, guid_tool::GuidTool, layout};

const HEADER_LENGTH: usize = mem::size_of::<section::Header>();
const HEADER2_LENGTH: usize = mem::size_of::<header::CommonSectionHeaderExtended>();
const GUID_DEFINED_LENGTH: usize = mem::size_of::<header::GuidDefined>();
const COMPRESSION_LENGTH: usize = mem::size_of::<header::Compression>();

/// Section common header, either the 24-bit size form or the extended form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionHeader {
    /// `EFI_COMMON_SECTION_HEADER`.
    Standard(section::Header),
    /// `EFI_COMMON_SECTION_HEADER2`, marked by a packed size of `0xFFFFFF`.
    Extended(header::CommonSectionHeaderExtended),
}

impl SectionHeader {
    /// Builds a header for a section of `size` bytes measured against the standard header.
    pub fn new(section_type: section::EfiSectionType, size: usize) -> Result<Self, FvEditError> {
        if size < ffs::MAX_PACKED_SIZE {
            let size = ffs::pack_size(size).ok_or(FvEditError::InvalidParameter)?;
            Ok(SectionHeader::Standard(section::Header { size, section_type }))
        } else {
            let extended_size = u32::try_from(size + HEADER2_LENGTH - HEADER_LENGTH)
                .map_err(|_| FvEditError::InvalidParameter)?;
            Ok(SectionHeader::Extended(header::CommonSectionHeaderExtended {
                size: [0xff; 3],
                section_type,
                extended_size,
            }))
        }
    }

    /// Section type.
    pub fn section_type(&self) -> section::EfiSectionType {
        match self {
            SectionHeader::Standard(header) => header.section_type,
            SectionHeader::Extended(header) => header.section_type,
        }
    }

    /// Serialized header length.
    pub fn header_length(&self) -> usize {
        match self {
            SectionHeader::Standard(_) => HEADER_LENGTH,
            SectionHeader::Extended(_) => HEADER2_LENGTH,
        }
    }

    /// Section size, header included.
    pub fn size(&self) -> usize {
        match self {
            SectionHeader::Standard(header) => ffs::packed_size(&header.size),
            SectionHeader::Extended(header) => header.extended_size as usize,
        }
    }

    /// Record `size` without changing variants.
    pub fn set_size(&mut self, size: usize) -> Result<(), FvEditError> {
        if size < self.header_length() {
            Err(FvEditError::InvalidParameter)?;
        }
        match self {
            SectionHeader::Standard(header) => {
                if size >= ffs::MAX_PACKED_SIZE {
                    Err(FvEditError::InvalidParameter)?;
                }
                header.size = ffs::pack_size(size).ok_or(FvEditError::InvalidParameter)?;
            }
            SectionHeader::Extended(header) => {
                header.extended_size = u32::try_from(size).map_err(|_| FvEditError::InvalidParameter)?;
            }
        }
        Ok(())
    }

    /// Decrease the recorded size by `delta` (a negative `delta` grows it).
    pub fn change_size(&mut self, delta: isize) -> Result<(), FvEditError> {
        let size = (self.size() as isize).checked_sub(delta).ok_or(FvEditError::InvalidParameter)?;
        self.set_size(usize::try_from(size).map_err(|_| FvEditError::InvalidParameter)?)
    }

    /// Whether this is the extended variant.
    pub fn is_extended(&self) -> bool {
        matches!(self, SectionHeader::Extended(_))
    }

    /// Canonical byte layout of the header.
    pub fn serialize(&self) -> Vec<u8> {
        match self {
            // safety: header is repr(C) without padding.
            SectionHeader::Standard(header) => {
                unsafe { from_raw_parts(header as *const section::Header as *const u8, HEADER_LENGTH) }.to_vec()
            }
            // safety: header is repr(C) without padding.
            SectionHeader::Extended(header) => unsafe {
                from_raw_parts(header as *const header::CommonSectionHeaderExtended as *const u8, HEADER2_LENGTH)
            }
            .to_vec(),
        }
    }
}

/// Type-specific header that follows the common section header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionExtHeader {
    /// Leaf sections carry no extension header.
    None,
    /// `EFI_GUID_DEFINED_SECTION`. GUID-specific header bytes, if any, are part of the encoded content.
    GuidDefined(header::GuidDefined),
    /// `EFI_COMPRESSION_SECTION`.
    Compression(header::Compression),
    /// Opaque bytes for section types with headers this crate does not interpret.
    Other(Vec<u8>),
}

impl SectionExtHeader {
    /// Serialized length.
    pub fn len(&self) -> usize {
        match self {
            SectionExtHeader::None => 0,
            SectionExtHeader::GuidDefined(_) => GUID_DEFINED_LENGTH,
            SectionExtHeader::Compression(_) => COMPRESSION_LENGTH,
            SectionExtHeader::Other(bytes) => bytes.len(),
        }
    }

    /// Whether the extension header is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Canonical byte layout.
    pub fn serialize(&self) -> Vec<u8> {
        match self {
            SectionExtHeader::None => Vec::new(),
            // safety: GuidDefined is repr(C) without padding.
            SectionExtHeader::GuidDefined(guid_defined) => unsafe {
                from_raw_parts(guid_defined as *const header::GuidDefined as *const u8, GUID_DEFINED_LENGTH)
            }
            .to_vec(),
            // safety: Compression is repr(C, packed).
            SectionExtHeader::Compression(compression) => unsafe {
                from_raw_parts(compression as *const header::Compression as *const u8, COMPRESSION_LENGTH)
            }
            .to_vec(),
            SectionExtHeader::Other(bytes) => bytes.clone(),
        }
    }
}

/// A section inside a firmware volume tree.
///
/// `data` is the logical content: for encapsulation sections with children in a
/// [`FvTree`](crate::tree::FvTree) it is the concatenation of the children. For GUID-defined sections the bytes
/// written to the image are `ori_data`, produced from `data` by the section's [`GuidTool`].
#[derive(Debug, Clone)]
pub struct SectionNode {
    header: SectionHeader,
    ext_header: SectionExtHeader,
    data: Vec<u8>,
    ori_data: Option<Vec<u8>>,
    specific_len: usize,
    pad_len: usize,
}

impl SectionNode {
    fn with_parts(
        section_type: section::EfiSectionType,
        ext_header: SectionExtHeader,
        data: Vec<u8>,
        ori_data: Option<Vec<u8>>,
    ) -> Result<Self, FvEditError> {
        let content_len = ori_data.as_ref().map_or(data.len(), Vec::len);
        let header = SectionHeader::new(section_type, HEADER_LENGTH + ext_header.len() + content_len)?;
        let mut node = Self { header, ext_header, data, ori_data, specific_len: 0, pad_len: 0 };
        node.sync_ext_header()?;
        Ok(node)
    }

    /// Create a leaf section (PE32, RAW, user interface, and so on) holding `data`.
    ///
    /// ## Examples
    ///
    /// ```rust
    /// use patina_ffs_editor::section::SectionNode;
    /// use patina_pi::fw_fs::ffs::section::raw_type;
    ///
    /// let raw = SectionNode::new_leaf(raw_type::RAW, vec![0u8; 0x20]).unwrap();
    /// assert_eq!(raw.size(), 0x24);
    /// ```
    pub fn new_leaf(section_type: section::EfiSectionType, data: Vec<u8>) -> Result<Self, FvEditError> {
        Self::with_parts(section_type, SectionExtHeader::None, data, None)
    }

    /// Create an encapsulation section with no content yet.
    ///
    /// Children are attached in the tree and the content is built when the tree is sealed.
    pub fn new_encapsulation(
        section_type: section::EfiSectionType,
        ext_header: SectionExtHeader,
    ) -> Result<Self, FvEditError> {
        Self::with_parts(section_type, ext_header, Vec::new(), None)
    }

    /// Create an uncompressed `EFI_COMPRESSION_SECTION` with no content yet.
    pub fn new_compression() -> Result<Self, FvEditError> {
        Self::new_encapsulation(
            raw_type::encapsulated::COMPRESSION,
            SectionExtHeader::Compression(header::Compression {
                uncompressed_length: 0,
                compression_type: header::NOT_COMPRESSED,
            }),
        )
    }

    /// Create an `EFI_GUID_DEFINED_SECTION` whose content will be encoded by the tool registered for `guid`.
    ///
    /// `data_offset` assumes the encoded content has no GUID-specific header. Formats whose tool prepends one,
    /// such as the 4-byte CRC32 value of CRC32 guided sections, need [`Self::with_guid_specific_len`] so that
    /// `data_offset` points past it.
    pub fn new_guid_defined(guid: efi::Guid, attributes: u16) -> Result<Self, FvEditError> {
        Self::with_parts(
            raw_type::encapsulated::GUID_DEFINED,
            SectionExtHeader::GuidDefined(header::GuidDefined {
                section_definition_guid: guid,
                data_offset: (HEADER_LENGTH + GUID_DEFINED_LENGTH) as u16,
                attributes,
            }),
            Vec::new(),
            None,
        )
    }

    /// Create a GUID-defined section from its encoded content, decoding it with `tool`.
    ///
    /// `ori_data` holds every byte after the `EFI_GUID_DEFINED_SECTION` header, GUID-specific header included.
    /// `data_offset` is the value found in the image and locates the end of that GUID-specific header.
    pub fn from_ori_data(
        guid: efi::Guid,
        attributes: u16,
        data_offset: u16,
        ori_data: Vec<u8>,
        tool: &dyn GuidTool,
    ) -> Result<Self, FvEditError> {
        let specific_len = (data_offset as usize)
            .checked_sub(HEADER_LENGTH + GUID_DEFINED_LENGTH)
            .filter(|len| *len <= ori_data.len())
            .ok_or(FvEditError::InvalidParameter)?;
        let data = tool.unpack(&ori_data)?;
        Ok(Self::with_parts(
            raw_type::encapsulated::GUID_DEFINED,
            SectionExtHeader::GuidDefined(header::GuidDefined {
                section_definition_guid: guid,
                data_offset: (HEADER_LENGTH + GUID_DEFINED_LENGTH) as u16,
                attributes,
            }),
            data,
            Some(ori_data),
        )?
        .with_guid_specific_len(specific_len))
    }

    /// Count `len` leading bytes of the encoded content as GUID-specific header when computing `data_offset`.
    pub fn with_guid_specific_len(mut self, len: usize) -> Self {
        self.specific_len = len;
        if let SectionExtHeader::GuidDefined(guid_defined) = &mut self.ext_header {
            guid_defined.data_offset = (self.header.header_length() + GUID_DEFINED_LENGTH + len) as u16;
        }
        self
    }

    /// Section common header.
    pub fn header(&self) -> &SectionHeader {
        &self.header
    }

    /// Type-specific extension header.
    pub fn ext_header(&self) -> &SectionExtHeader {
        &self.ext_header
    }

    /// Section type.
    pub fn section_type(&self) -> section::EfiSectionType {
        self.header.section_type()
    }

    /// Whether the section type encapsulates other sections or a volume.
    pub fn is_encapsulation(&self) -> bool {
        matches!(
            self.section_type(),
            raw_type::encapsulated::COMPRESSION
                | raw_type::encapsulated::GUID_DEFINED
                | raw_type::encapsulated::DISPOSABLE
                | raw_type::FIRMWARE_VOLUME_IMAGE
        )
    }

    /// Section definition GUID for GUID-defined sections.
    pub fn definition_guid(&self) -> Option<efi::Guid> {
        match &self.ext_header {
            SectionExtHeader::GuidDefined(guid_defined) => Some(guid_defined.section_definition_guid),
            _ => None,
        }
    }

    /// Compression type for compression sections.
    pub fn compression_type(&self) -> Option<u8> {
        match &self.ext_header {
            SectionExtHeader::Compression(compression) => Some(compression.compression_type),
            _ => None,
        }
    }

    /// Logical content.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Encoded content for GUID-defined sections.
    pub fn ori_data(&self) -> Option<&[u8]> {
        self.ori_data.as_deref()
    }

    /// Bytes written after the headers: the encoded content when present, otherwise the logical content.
    pub fn content(&self) -> &[u8] {
        self.ori_data.as_deref().unwrap_or(&self.data)
    }

    /// Section size from the header, header included.
    pub fn size(&self) -> usize {
        self.header.size()
    }

    /// Length of the trailing pad.
    pub fn pad_len(&self) -> usize {
        self.pad_len
    }

    /// Section size plus trailing pad.
    pub fn total_size(&self) -> usize {
        self.size() + self.pad_len
    }

    /// Replace the logical content. Sizes are refreshed by [`Self::update_size`].
    pub fn set_data(&mut self, data: Vec<u8>) {
        self.data = data;
    }

    /// Replace the encoded content. Sizes are refreshed by [`Self::update_size`].
    pub fn set_ori_data(&mut self, ori_data: Vec<u8>) {
        self.ori_data = Some(ori_data);
    }

    fn sync_ext_header(&mut self) -> Result<(), FvEditError> {
        let header_length = self.header.header_length();
        let specific_len = self.specific_len;
        let data_len = self.data.len();
        match &mut self.ext_header {
            SectionExtHeader::GuidDefined(guid_defined) => {
                let data_offset = header_length + GUID_DEFINED_LENGTH + specific_len;
                guid_defined.data_offset = u16::try_from(data_offset).map_err(|_| FvEditError::InvalidParameter)?;
            }
            SectionExtHeader::Compression(compression) => {
                if compression.compression_type == header::NOT_COMPRESSED {
                    compression.uncompressed_length =
                        u32::try_from(data_len).map_err(|_| FvEditError::InvalidParameter)?;
                }
            }
            _ => (),
        }
        Ok(())
    }

    /// Recompute the size field from the header, extension header and content.
    ///
    /// Switches between the standard and extended common header as the size requires, and refreshes
    /// `data_offset` and `uncompressed_length`. Returns the change in section size.
    pub fn update_size(&mut self) -> Result<isize, FvEditError> {
        let old_size = self.size();
        let body_len = self.ext_header.len() + self.content().len();
        let standard_size = HEADER_LENGTH + body_len;
        let fits_standard = standard_size < ffs::MAX_PACKED_SIZE;
        if fits_standard == self.header.is_extended() {
            self.header = SectionHeader::new(self.section_type(), standard_size)?;
        } else {
            let delta = old_size as isize - (self.header.header_length() + body_len) as isize;
            self.header.change_size(delta)?;
        }
        self.sync_ext_header()?;
        Ok(self.size() as isize - old_size as isize)
    }

    /// Recompute the trailing pad. Sections are padded to 4 bytes only when another section follows.
    ///
    /// Returns the change in pad length.
    pub fn update_pad(&mut self, has_next_sibling: bool) -> Result<isize, FvEditError> {
        let pad_len = if has_next_sibling { layout::pad_len(self.size(), layout::SECTION_ALIGNMENT)? } else { 0 };
        let delta = pad_len as isize - self.pad_len as isize;
        self.pad_len = pad_len;
        Ok(delta)
    }

    /// Headers and content, without the trailing pad.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buffer = self.header.serialize();
        buffer.extend(self.ext_header.serialize());
        buffer.extend_from_slice(self.content());
        buffer
    }

    /// Headers, content and trailing pad.
    pub fn serialize_padded(&self) -> Vec<u8> {
        let mut buffer = self.serialize();
        buffer.extend(iter::repeat_n(0u8, self.pad_len));
        buffer
    }
}
