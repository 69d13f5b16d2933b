//! Edit operations over firmware volume trees.
//!
//! [`FvHandler`] replaces, adds and deletes FFS files inside a [`FvTree`] and then walks from the edited volume
//! up to the root, rebuilding each enclosing node from its children. At each level the node's size fields,
//! alignment pad, checksums and (for GUID-defined sections) encoded content are refreshed, and the size change is
//! handed to the next level up:
//!
//! - A volume absorbs growth from its free space. A top-level volume that runs out fails with
//!   [`FvEditError::VolumeFull`]; a volume embedded in a firmware volume image section grows by whole blocks.
//! - A file or section records its new size, switching between standard and extended headers as required.
//! - The walk stops at the root or at the first level whose bytes did not change.
//!
//! Each public operation works on a copy of the tree and only replaces the caller's tree once every level has
//! been rebuilt, so a failed operation leaves the tree untouched.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: Apache-2.0
//!
use alloc::vec::Vec;
use patina_pi::fw_fs::ffs::{
    file::raw::r#type as file_type,
    guid::{EFI_FIRMWARE_FILE_SYSTEM2_GUID, EFI_FIRMWARE_FILE_SYSTEM3_GUID},
    section::header,
};

use crate::{
    FvEditError,
    file::HeaderSwitch,
    guid_tool::GuidToolRegistry,
    layout,
    tree::{FvTree, NodeData, NodeId, NodeKind},
    volume::FreeSpace,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VolumeFit {
    /// Keep the current length unless content outgrows it.
    Keep,
    /// Embedded volumes shrink to the smallest whole number of blocks.
    Shrink,
    /// Length follows content plus the free space node supplied by the caller.
    Seal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Settled {
    delta: isize,
    changed: bool,
}

/// Firmware volume editor.
///
/// ## Examples
///
/// ```rust
/// use patina_ffs_editor::{
///     FvHandler, FvTree, GuidToolRegistry, RootKind,
///     file::FileNode,
///     volume::{FreeSpace, VolumeNode},
/// };
/// use patina_pi::fw_fs::{ffs::{file, guid::EFI_FIRMWARE_FILE_SYSTEM2_GUID}, fv::BlockMapEntry};
/// use r_efi::efi;
///
/// let tools = GuidToolRegistry::new();
/// let handler = FvHandler::new(&tools);
///
/// let mut tree = FvTree::new(RootKind::Volume);
/// let block_map = vec![BlockMapEntry { num_blocks: 0, length: 8 }];
/// let volume = tree.add_node(VolumeNode::new(EFI_FIRMWARE_FILE_SYSTEM2_GUID, 0, block_map).unwrap().into());
/// let free = tree.add_node(FreeSpace::new(0x40).into());
/// let root = tree.root();
/// tree.append_child(root, volume).unwrap();
/// tree.append_child(volume, free).unwrap();
/// handler.seal(&mut tree, root).unwrap();
///
/// let raw = FileNode::new(efi::Guid::from_bytes(&[7; 16]), file::raw::r#type::RAW, 0, vec![0x5a; 0x10]);
/// let file = tree.add_node(raw.into());
/// handler.add_ffs(&mut tree, file, free).unwrap();
/// assert_eq!(tree.volume(volume).unwrap().free_space(), 0x18);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct FvHandler<'a> {
    tools: &'a GuidToolRegistry,
}

impl<'a> FvHandler<'a> {
    /// Editor that encodes GUID-defined sections with `tools`.
    pub fn new(tools: &'a GuidToolRegistry) -> Self {
        Self { tools }
    }

    fn commit<F>(&self, tree: &mut FvTree, op: F) -> Result<(), FvEditError>
    where
        F: FnOnce(&mut FvTree) -> Result<(), FvEditError>,
    {
        let mut scratch = tree.clone();
        match op(&mut scratch) {
            Ok(()) => {
                *tree = scratch;
                Ok(())
            }
            Err(err) => {
                log::warn!("firmware volume edit abandoned: {err}");
                Err(err)
            }
        }
    }

    /// Replace the file `target` with the detached file `new_file`.
    ///
    /// `new_file` takes the position of `target` in its volume, and `target` (with its subtree) is removed from
    /// the tree. The volume must have room for any growth unless it is embedded in a section.
    pub fn replace_ffs(&self, tree: &mut FvTree, new_file: NodeId, target: NodeId) -> Result<(), FvEditError> {
        self.commit(tree, |tree| {
            let volume = Self::file_volume(tree, target)?;
            Self::check_detached_file(tree, new_file)?;
            let switch = Self::prepare_incoming(tree, volume, new_file)?;
            let needed = tree.total_size(new_file)? as isize - tree.total_size(target)? as isize;
            let was_large = tree.file(target)?.is_large();

            let index = tree.detach(target)?;
            tree.insert_child(volume, index, new_file)?;
            tree.remove(target)?;

            let large = tree.file(new_file)?.is_large();
            let switch = if was_large && !large { Some(HeaderSwitch::ToStandard) } else { switch };
            Self::sync_file_system(tree, volume, switch)?;
            log::debug!("replacing file {target} with {new_file} in volume {volume}, {needed:+} bytes");
            self.ascend(tree, volume, needed)
        })
    }

    /// Insert the detached file `new_file` into a volume.
    ///
    /// When `target` is the volume's free space, the file goes where the free space starts. When `target` is a
    /// file, the new file goes right after it. Free space always stays the volume's last child.
    pub fn add_ffs(&self, tree: &mut FvTree, new_file: NodeId, target: NodeId) -> Result<(), FvEditError> {
        self.commit(tree, |tree| {
            let (volume, index) = match tree.kind(target)? {
                NodeKind::FreeSpace => {
                    let volume = tree.parent(target)?.ok_or(FvEditError::InvalidTree(target))?;
                    tree.volume(volume)?;
                    (volume, tree.position(target)?)
                }
                NodeKind::File => (Self::file_volume(tree, target)?, tree.position(target)? + 1),
                _ => Err(FvEditError::InvalidParameter)?,
            };
            Self::check_detached_file(tree, new_file)?;
            let switch = Self::prepare_incoming(tree, volume, new_file)?;
            let needed = tree.total_size(new_file)? as isize;

            tree.insert_child(volume, index, new_file)?;
            Self::sync_file_system(tree, volume, switch)?;
            log::debug!("adding file {new_file} to volume {volume} at {index}, {needed:+} bytes");
            self.ascend(tree, volume, needed)
        })
    }

    /// Remove the file `target` from its volume.
    ///
    /// A top-level volume keeps its length and gains the file's bytes as free space. A volume embedded in a
    /// section shrinks to the smallest whole number of blocks that holds its remaining files.
    pub fn delete_ffs(&self, tree: &mut FvTree, target: NodeId) -> Result<(), FvEditError> {
        self.commit(tree, |tree| {
            let volume = Self::file_volume(tree, target)?;
            let reclaimed = tree.total_size(target)? as isize;
            tree.remove(target)?;
            log::debug!("deleting file {target} from volume {volume}, {:+} bytes", -reclaimed);

            let settled = self.settle_volume(tree, volume, -reclaimed, VolumeFit::Shrink)?;
            match tree.parent(volume)? {
                Some(parent) if settled.changed => self.ascend(tree, parent, settled.delta),
                _ => Ok(()),
            }
        })
    }

    /// Rebuild `node` and its ancestors after `needed` bytes of growth (negative for shrinkage) beneath it.
    pub fn modify_test(&self, tree: &mut FvTree, node: NodeId, needed: isize) -> Result<(), FvEditError> {
        self.commit(tree, |tree| self.ascend(tree, node, needed))
    }

    /// Rebuild `node` from its children and carry the result up to the root.
    ///
    /// Used after a node's content was changed in place.
    pub fn compress_data(&self, tree: &mut FvTree, node: NodeId) -> Result<(), FvEditError> {
        self.commit(tree, |tree| self.ascend(tree, node, 0))
    }

    /// Rebuild one section from its children, re-encoding GUID-defined content, then carry any change up to the
    /// root. Returns the change in the section's padded size.
    pub fn compress_section_data(&self, tree: &mut FvTree, section: NodeId) -> Result<isize, FvEditError> {
        let mut delta = 0;
        self.commit(tree, |tree| {
            tree.section(section).map_err(|_| FvEditError::InvalidParameter)?;
            let settled = self.settle_section(tree, section)?;
            delta = settled.delta;
            match tree.parent(section)? {
                Some(parent) if settled.changed => self.ascend(tree, parent, settled.delta),
                _ => Ok(()),
            }
        })?;
        Ok(delta)
    }

    /// Bring every size field, pad, checksum and encoded section in the subtree of `node` in line with its
    /// children, bottom up.
    ///
    /// Used on trees assembled by hand, and on new files before they are inserted. Free space nodes are kept at
    /// the length the caller gave them.
    pub fn seal(&self, tree: &mut FvTree, node: NodeId) -> Result<(), FvEditError> {
        self.commit(tree, |tree| self.seal_subtree(tree, node))
    }

    fn seal_subtree(&self, tree: &mut FvTree, node: NodeId) -> Result<(), FvEditError> {
        let children = tree.children(node)?.to_vec();
        for child in children {
            self.seal_subtree(tree, child)?;
        }
        match tree.kind(node)? {
            NodeKind::Volume | NodeKind::SectionedVolume => {
                self.settle_volume(tree, node, 0, VolumeFit::Seal)?;
            }
            NodeKind::File => {
                self.settle_file(tree, node)?;
            }
            NodeKind::Section => {
                self.settle_section(tree, node)?;
            }
            NodeKind::Root(_) | NodeKind::FreeSpace => (),
        }
        Ok(())
    }

    fn ascend(&self, tree: &mut FvTree, start: NodeId, needed: isize) -> Result<(), FvEditError> {
        let mut node = start;
        let mut needed = needed;
        loop {
            let settled = match tree.kind(node)? {
                NodeKind::Root(_) => return Ok(()),
                NodeKind::Volume | NodeKind::SectionedVolume => {
                    self.settle_volume(tree, node, needed, VolumeFit::Keep)?
                }
                NodeKind::File => self.settle_file(tree, node)?,
                NodeKind::Section => self.settle_section(tree, node)?,
                NodeKind::FreeSpace => Err(FvEditError::InvalidTree(node))?,
            };
            log::trace!("node {node} rebuilt, size change {:+}, changed {}", settled.delta, settled.changed);
            if !settled.changed {
                return Ok(());
            }
            needed = settled.delta;
            node = match tree.parent(node)? {
                Some(parent) => parent,
                None => return Ok(()),
            };
        }
    }

    fn file_volume(tree: &FvTree, file: NodeId) -> Result<NodeId, FvEditError> {
        tree.file(file)?;
        let volume = tree.parent(file)?.ok_or(FvEditError::InvalidTree(file))?;
        match tree.kind(volume)? {
            NodeKind::Volume | NodeKind::SectionedVolume => Ok(volume),
            _ => Err(FvEditError::NotAVolume(volume)),
        }
    }

    fn check_detached_file(tree: &FvTree, file: NodeId) -> Result<(), FvEditError> {
        tree.file(file)?;
        if tree.parent(file)?.is_some() || file == tree.root() {
            Err(FvEditError::NotDetached(file))?;
        }
        Ok(())
    }

    /// Match an incoming file to the volume it is about to join: state polarity, header variant, pad and
    /// checksums.
    fn prepare_incoming(
        tree: &mut FvTree,
        volume: NodeId,
        file: NodeId,
    ) -> Result<Option<HeaderSwitch>, FvEditError> {
        let erase_polarity = tree.volume(volume)?.erase_polarity();
        let file = tree.file_mut(file)?;
        if erase_polarity {
            file.invert_state();
        }
        let switch = file.fit_header()?;
        file.update_pad()?;
        file.update_checksum();
        Ok(switch)
    }

    /// Select the volume's file system GUID from the header variants of its files.
    ///
    /// A volume holding a large file must be FFS3. A volume goes back to FFS2 only when a file just left the
    /// large-file form and no large file remains.
    fn sync_file_system(tree: &mut FvTree, volume: NodeId, switch: Option<HeaderSwitch>) -> Result<(), FvEditError> {
        if !matches!(tree.data(volume)?, NodeData::Volume(_)) {
            return Ok(());
        }
        let any_large = tree
            .children(volume)?
            .iter()
            .any(|child| matches!(tree.data(*child), Ok(NodeData::File(file)) if file.is_large()));
        let volume_node = tree.volume_mut(volume)?;
        if any_large && !volume_node.is_ffs3() {
            log::info!("volume {volume} holds a large file, switching to FFS3");
            volume_node.set_file_system_guid(EFI_FIRMWARE_FILE_SYSTEM3_GUID);
        } else if !any_large && switch == Some(HeaderSwitch::ToStandard) && volume_node.is_ffs3() {
            log::info!("volume {volume} no longer holds a large file, switching to FFS2");
            volume_node.set_file_system_guid(EFI_FIRMWARE_FILE_SYSTEM2_GUID);
        }
        Ok(())
    }

    /// Concatenate the children of `container`, refreshing section pads on the way.
    fn flatten(&self, tree: &mut FvTree, container: NodeId) -> Result<Vec<u8>, FvEditError> {
        let children = tree.children(container)?.to_vec();
        let mut buffer = Vec::new();
        let mut children = children.iter().peekable();
        while let Some(child) = children.next() {
            if let NodeData::Section(section) = tree.data_mut(*child)? {
                section.update_pad(children.peek().is_some())?;
            }
            buffer.extend(tree.serialize(*child)?);
        }
        Ok(buffer)
    }

    /// Resize, create or drop the free space node so that it holds `len` bytes.
    fn set_free_space(tree: &mut FvTree, volume: NodeId, len: usize) -> Result<(), FvEditError> {
        match tree.free_space_child(volume)? {
            Some(free) if len == 0 => tree.remove(free)?,
            Some(free) => {
                if let NodeData::FreeSpace(free) = tree.data_mut(free)? {
                    free.set_len(len);
                }
            }
            None if len > 0 => {
                let free = tree.add_node(FreeSpace::new(len).into());
                tree.append_child(volume, free)?;
            }
            None => (),
        }
        tree.volume_mut(volume)?.set_free_space(len);
        Ok(())
    }

    /// Copy the extended volume header into the volume's leading pad file.
    fn write_ext_header(tree: &mut FvTree, volume: NodeId, ext_header: &[u8]) -> Result<(), FvEditError> {
        let first = tree.children(volume)?.first().copied().ok_or(FvEditError::InvalidTree(volume))?;
        let pad = tree.file_mut(first).map_err(|_| FvEditError::InvalidTree(volume))?;
        if pad.file_type() != file_type::FFS_PAD {
            Err(FvEditError::InvalidTree(volume))?;
        }
        if pad.overwrite_body_prefix(ext_header).map_err(|_| FvEditError::InvalidTree(volume))? {
            pad.update_checksum();
        }
        Ok(())
    }

    fn settle_volume(
        &self,
        tree: &mut FvTree,
        volume: NodeId,
        needed: isize,
        fit: VolumeFit,
    ) -> Result<Settled, FvEditError> {
        let embedded = tree.kind(volume)? == NodeKind::SectionedVolume;
        let free_child = tree.free_space_child(volume)?;
        let (old_header, old_len, old_free, header_length, block_length) = {
            let volume = tree.volume(volume)?;
            (
                volume.header_bytes(),
                volume.fv_length(),
                volume.free_space(),
                volume.header_length(),
                volume.block_length()?,
            )
        };

        let mut used = header_length;
        for child in tree.children(volume)? {
            if Some(*child) != free_child {
                used += tree.total_size(*child)?;
            }
        }

        let fv_length = match fit {
            VolumeFit::Seal => used + free_child.map(|free| tree.total_size(free)).transpose()?.unwrap_or(0),
            VolumeFit::Shrink if embedded => layout::round_up_to_block(used, block_length)?,
            _ if used <= old_len => old_len,
            _ if embedded => old_len + layout::round_up_to_block(used - old_len, block_length)?,
            _ => {
                log::warn!("volume {volume} is {:#x} bytes short", used - old_len);
                Err(FvEditError::VolumeFull { volume, needed: needed.max(0) as usize, available: old_free })?
            }
        };
        // Embedded volumes always span whole blocks; the remainder becomes free space.
        let fv_length = if embedded { layout::round_up_to_block(fv_length, block_length)? } else { fv_length };

        let free = fv_length - used;
        Self::set_free_space(tree, volume, free)?;
        let ext_header = {
            let volume = tree.volume_mut(volume)?;
            volume.set_used_size(used)?;
            volume.ext_header_bytes()
        };
        if let Some(ext_header) = ext_header {
            Self::write_ext_header(tree, volume, &ext_header)?;
        }

        let body = self.flatten(tree, volume)?;
        let volume = tree.volume_mut(volume)?;
        let body_changed = volume.body() != body.as_slice();
        volume.set_body(body);
        volume.update_header()?;
        Ok(Settled {
            delta: volume.fv_length() as isize - old_len as isize,
            changed: body_changed || volume.header_bytes() != old_header,
        })
    }

    fn settle_file(&self, tree: &mut FvTree, file: NodeId) -> Result<Settled, FvEditError> {
        let parent = tree.parent(file)?;
        let body = if tree.children(file)?.is_empty() { None } else { Some(self.flatten(tree, file)?) };

        let file_node = tree.file_mut(file)?;
        let old_header = *file_node.header();
        let old_pad = file_node.pad_len();
        let old_total = file_node.total_size();
        let mut body_changed = false;
        let switch = match body {
            Some(body) if body.as_slice() != file_node.body() => {
                body_changed = true;
                file_node.set_body(body)?
            }
            _ => file_node.fit_header()?,
        };
        file_node.update_pad()?;
        file_node.update_checksum();

        let settled = Settled {
            delta: file_node.total_size() as isize - old_total as isize,
            changed: body_changed
                || *file_node.header() != old_header
                || file_node.pad_len() != old_pad,
        };
        if let Some(parent) = parent {
            Self::sync_file_system(tree, parent, switch)?;
        }
        Ok(settled)
    }

    fn settle_section(&self, tree: &mut FvTree, section: NodeId) -> Result<Settled, FvEditError> {
        let has_next = match tree.parent(section)? {
            Some(_) => tree.has_next_sibling(section)?,
            None => false,
        };
        let logical = if tree.children(section)?.is_empty() { None } else { Some(self.flatten(tree, section)?) };

        let section_node = tree.section(section)?;
        let data_changed = logical.as_ref().is_some_and(|logical| logical.as_slice() != section_node.data());
        if data_changed && section_node.compression_type().is_some_and(|kind| kind != header::NOT_COMPRESSED) {
            log::warn!("section {section} uses a compression type that cannot be re-encoded");
            Err(FvEditError::Unsupported)?;
        }
        let packed = match section_node.definition_guid() {
            Some(guid) if data_changed || section_node.ori_data().is_none() => {
                let source = logical.as_deref().unwrap_or(section_node.data());
                let tool = self
                    .tools
                    .get(&guid)
                    .inspect_err(|_| log::warn!("section {section} needs a GUID tool for {guid:?}"))?;
                log::debug!("encoding section {section} with the tool for {guid:?}");
                Some(tool.pack(source)?)
            }
            _ => None,
        };
        let packed_changed = packed.is_some() && packed.as_deref() != section_node.ori_data();

        let section_node = tree.section_mut(section)?;
        let old_header = *section_node.header();
        let old_ext_header = section_node.ext_header().clone();
        let old_pad = section_node.pad_len();
        let old_total = section_node.total_size();
        if let (Some(logical), true) = (logical, data_changed) {
            section_node.set_data(logical);
        }
        if let Some(packed) = packed {
            section_node.set_ori_data(packed);
        }
        section_node.update_size()?;
        section_node.update_pad(has_next)?;

        Ok(Settled {
            delta: section_node.total_size() as isize - old_total as isize,
            changed: data_changed
                || packed_changed
                || *section_node.header() != old_header
                || *section_node.ext_header() != old_ext_header
                || section_node.pad_len() != old_pad,
        })
    }
}
