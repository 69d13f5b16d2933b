//! Arena tree of firmware volumes, files and sections.
//!
//! Nodes live in a flat arena and refer to one another through [`NodeId`] handles. Each node records its parent
//! and its ordered children, so a node can be reached from the root and the root from any node. The node kind
//! follows from the payload and, for volumes, from the parent: a volume under a section is a
//! [`NodeKind::SectionedVolume`].
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: Apache-2.0
//!
use alloc::{vec, vec::Vec};
use core::fmt;

use crate::{
    FvEditError,
    file::FileNode,
    section::SectionNode,
    volume::{FreeSpace, VolumeNode},
};

/// Handle to a node in an [`FvTree`].
///
/// Arena slots are reused once a node is removed. The generation tells a stale handle apart from the node that
/// took over its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId {
    index: usize,
    generation: u32,
}

impl NodeId {
    pub(crate) const fn new(index: usize) -> Self {
        Self { index, generation: 0 }
    }

    /// Arena index of the node.
    pub fn index(&self) -> usize {
        self.index
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.index)
    }
}

/// What the root of a tree stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootKind {
    /// A whole flash image holding one or more volumes.
    Tree,
    /// A single volume image.
    Volume,
    /// A single file image.
    File,
    /// A single section image.
    Section,
}

/// Node payload.
#[derive(Debug, Clone)]
pub enum NodeData {
    /// Root marker; serializes as the concatenation of its children.
    Root(RootKind),
    /// Firmware volume.
    Volume(VolumeNode),
    /// FFS file.
    File(FileNode),
    /// FFS section.
    Section(SectionNode),
    /// Unused tail of a volume.
    FreeSpace(FreeSpace),
}

impl From<VolumeNode> for NodeData {
    fn from(value: VolumeNode) -> Self {
        NodeData::Volume(value)
    }
}

impl From<FileNode> for NodeData {
    fn from(value: FileNode) -> Self {
        NodeData::File(value)
    }
}

impl From<SectionNode> for NodeData {
    fn from(value: SectionNode) -> Self {
        NodeData::Section(value)
    }
}

impl From<FreeSpace> for NodeData {
    fn from(value: FreeSpace) -> Self {
        NodeData::FreeSpace(value)
    }
}

/// Kind of a node, derived from its payload and its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Root marker.
    Root(RootKind),
    /// Top-level volume, whose size is fixed.
    Volume,
    /// Volume embedded in a firmware volume image section, which may grow or shrink.
    SectionedVolume,
    /// FFS file.
    File,
    /// FFS section.
    Section,
    /// Unused tail of a volume.
    FreeSpace,
}

#[derive(Debug, Clone)]
struct Node {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// Arena of firmware volume nodes with a single root.
///
/// ## Examples
///
/// ```rust
/// use patina_ffs_editor::{FvTree, RootKind, file::FileNode};
/// use patina_pi::fw_fs::ffs::file;
/// use r_efi::efi;
///
/// let mut tree = FvTree::new(RootKind::File);
/// let raw = FileNode::new(efi::Guid::from_bytes(&[1; 16]), file::raw::r#type::RAW, 0, vec![0; 8]);
/// let file = tree.add_node(raw.into());
/// tree.append_child(tree.root(), file).unwrap();
/// assert_eq!(tree.serialize(tree.root()).unwrap().len(), 0x20);
/// ```
#[derive(Debug, Clone)]
pub struct FvTree {
    slots: Vec<Slot>,
    free: Vec<usize>,
    root: NodeId,
}

impl FvTree {
    /// Create a tree holding only a root of the given kind.
    pub fn new(kind: RootKind) -> Self {
        let root = Node { data: NodeData::Root(kind), parent: None, children: Vec::new() };
        Self { slots: vec![Slot { generation: 0, node: Some(root) }], free: Vec::new(), root: NodeId::new(0) }
    }

    /// Root handle.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Whether the tree holds only its root.
    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }

    /// Whether `id` refers to a live node.
    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_ok()
    }

    fn node(&self, id: NodeId) -> Result<&Node, FvEditError> {
        self.slots
            .get(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
            .ok_or(FvEditError::NodeNotFound(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, FvEditError> {
        self.slots
            .get_mut(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
            .ok_or(FvEditError::NodeNotFound(id))
    }

    /// Add a detached node to the arena, reusing the slot of a removed node when one is free.
    pub fn add_node(&mut self, data: NodeData) -> NodeId {
        let node = Node { data, parent: None, children: Vec::new() };
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index];
                slot.node = Some(node);
                NodeId { index, generation: slot.generation }
            }
            None => {
                self.slots.push(Slot { generation: 0, node: Some(node) });
                NodeId::new(self.slots.len() - 1)
            }
        }
    }

    /// Node payload.
    pub fn data(&self, id: NodeId) -> Result<&NodeData, FvEditError> {
        Ok(&self.node(id)?.data)
    }

    /// Mutable node payload.
    pub fn data_mut(&mut self, id: NodeId) -> Result<&mut NodeData, FvEditError> {
        Ok(&mut self.node_mut(id)?.data)
    }

    /// Parent of the node, `None` for the root and detached nodes.
    pub fn parent(&self, id: NodeId) -> Result<Option<NodeId>, FvEditError> {
        Ok(self.node(id)?.parent)
    }

    /// Ordered children of the node.
    pub fn children(&self, id: NodeId) -> Result<&[NodeId], FvEditError> {
        Ok(&self.node(id)?.children)
    }

    /// Index of the node among its parent's children.
    pub fn position(&self, id: NodeId) -> Result<usize, FvEditError> {
        let parent = self.parent(id)?.ok_or(FvEditError::InvalidTree(id))?;
        self.children(parent)?.iter().position(|child| *child == id).ok_or(FvEditError::InvalidTree(id))
    }

    /// Whether another node follows this one under the same parent.
    pub fn has_next_sibling(&self, id: NodeId) -> Result<bool, FvEditError> {
        let parent = self.parent(id)?.ok_or(FvEditError::InvalidTree(id))?;
        Ok(self.position(id)? + 1 < self.children(parent)?.len())
    }

    /// Kind of the node.
    pub fn kind(&self, id: NodeId) -> Result<NodeKind, FvEditError> {
        let node = self.node(id)?;
        Ok(match &node.data {
            NodeData::Root(kind) => NodeKind::Root(*kind),
            NodeData::Volume(_) => match node.parent.map(|parent| self.data(parent)).transpose()? {
                Some(NodeData::Section(_)) => NodeKind::SectionedVolume,
                _ => NodeKind::Volume,
            },
            NodeData::File(_) => NodeKind::File,
            NodeData::Section(_) => NodeKind::Section,
            NodeData::FreeSpace(_) => NodeKind::FreeSpace,
        })
    }

    /// The node followed by each of its ancestors, ending at the top of its tree.
    pub fn path_to_root(&self, id: NodeId) -> Result<Vec<NodeId>, FvEditError> {
        let mut path = vec![id];
        let mut current = self.parent(id)?;
        while let Some(parent) = current {
            if path.len() > self.slots.len() {
                Err(FvEditError::InvalidTree(id))?;
            }
            path.push(parent);
            current = self.parent(parent)?;
        }
        Ok(path)
    }

    fn check_attachable(&self, parent: NodeId, child: NodeId) -> Result<(), FvEditError> {
        if self.parent(child)?.is_some() {
            Err(FvEditError::NotDetached(child))?;
        }
        if child == self.root || self.path_to_root(parent)?.contains(&child) {
            Err(FvEditError::InvalidParameter)?;
        }
        Ok(())
    }

    /// Attach a detached node as the last child of `parent`.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), FvEditError> {
        let index = self.children(parent)?.len();
        self.insert_child(parent, index, child)
    }

    /// Attach a detached node at `index` among the children of `parent`.
    pub fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) -> Result<(), FvEditError> {
        self.check_attachable(parent, child)?;
        let children = &mut self.node_mut(parent)?.children;
        if index > children.len() {
            Err(FvEditError::InvalidParameter)?;
        }
        children.insert(index, child);
        self.node_mut(child)?.parent = Some(parent);
        Ok(())
    }

    /// Detach a node (and its subtree) from its parent. Returns the index it occupied.
    pub fn detach(&mut self, id: NodeId) -> Result<usize, FvEditError> {
        let parent = self.parent(id)?.ok_or(FvEditError::InvalidTree(id))?;
        let index = self.position(id)?;
        self.node_mut(parent)?.children.remove(index);
        self.node_mut(id)?.parent = None;
        Ok(index)
    }

    /// Detach a node if attached and free it together with its subtree.
    pub fn remove(&mut self, id: NodeId) -> Result<(), FvEditError> {
        if id == self.root {
            Err(FvEditError::InvalidParameter)?;
        }
        if self.parent(id)?.is_some() {
            self.detach(id)?;
        }
        let mut pending = vec![id];
        while let Some(next) = pending.pop() {
            self.node(next)?;
            let slot = &mut self.slots[next.index];
            if let Some(node) = slot.node.take() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(next.index);
                pending.extend(node.children);
            }
        }
        Ok(())
    }

    /// Volume payload.
    pub fn volume(&self, id: NodeId) -> Result<&VolumeNode, FvEditError> {
        match self.data(id)? {
            NodeData::Volume(volume) => Ok(volume),
            _ => Err(FvEditError::NotAVolume(id)),
        }
    }

    /// Mutable volume payload.
    pub fn volume_mut(&mut self, id: NodeId) -> Result<&mut VolumeNode, FvEditError> {
        match self.data_mut(id)? {
            NodeData::Volume(volume) => Ok(volume),
            _ => Err(FvEditError::NotAVolume(id)),
        }
    }

    /// File payload.
    pub fn file(&self, id: NodeId) -> Result<&FileNode, FvEditError> {
        match self.data(id)? {
            NodeData::File(file) => Ok(file),
            _ => Err(FvEditError::NotAFile(id)),
        }
    }

    /// Mutable file payload.
    pub fn file_mut(&mut self, id: NodeId) -> Result<&mut FileNode, FvEditError> {
        match self.data_mut(id)? {
            NodeData::File(file) => Ok(file),
            _ => Err(FvEditError::NotAFile(id)),
        }
    }

    /// Section payload.
    pub fn section(&self, id: NodeId) -> Result<&SectionNode, FvEditError> {
        match self.data(id)? {
            NodeData::Section(section) => Ok(section),
            _ => Err(FvEditError::InvalidTree(id)),
        }
    }

    /// Mutable section payload.
    pub fn section_mut(&mut self, id: NodeId) -> Result<&mut SectionNode, FvEditError> {
        match self.data_mut(id)? {
            NodeData::Section(section) => Ok(section),
            _ => Err(FvEditError::InvalidTree(id)),
        }
    }

    /// The free space node of a volume: its last child, when that child is free space.
    pub fn free_space_child(&self, volume: NodeId) -> Result<Option<NodeId>, FvEditError> {
        match self.children(volume)?.last() {
            Some(last) if matches!(self.data(*last)?, NodeData::FreeSpace(_)) => Ok(Some(*last)),
            _ => Ok(None),
        }
    }

    /// Bytes the node occupies in its parent, trailing pad included.
    pub fn total_size(&self, id: NodeId) -> Result<usize, FvEditError> {
        Ok(match self.data(id)? {
            NodeData::Root(_) => self.children(id)?.iter().map(|child| self.total_size(*child)).sum::<Result<_, _>>()?,
            NodeData::Volume(volume) => volume.fv_length(),
            NodeData::File(file) => file.total_size(),
            NodeData::Section(section) => section.total_size(),
            NodeData::FreeSpace(free) => free.len(),
        })
    }

    /// Byte image of the node, trailing pad included.
    ///
    /// Volumes, files and sections write their stored bytes; a root writes its children back to back.
    pub fn serialize(&self, id: NodeId) -> Result<Vec<u8>, FvEditError> {
        Ok(match self.data(id)? {
            NodeData::Root(_) => {
                let mut buffer = Vec::new();
                for child in self.children(id)? {
                    buffer.extend(self.serialize(*child)?);
                }
                buffer
            }
            NodeData::Volume(volume) => volume.serialize(),
            NodeData::File(file) => file.serialize_padded(),
            NodeData::Section(section) => section.serialize_padded(),
            NodeData::FreeSpace(free) => free.serialize(),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use patina_pi::fw_fs::{
        ffs::{file, guid::EFI_FIRMWARE_FILE_SYSTEM2_GUID, section::raw_type},
        fv::BlockMapEntry,
    };
    use r_efi::efi;

    fn raw_file(tag: u8, len: usize) -> NodeData {
        FileNode::new(efi::Guid::from_bytes(&[tag; 16]), file::raw::r#type::RAW, 0, vec![tag; len]).into()
    }

    #[test]
    fn children_should_keep_order() -> Result<(), FvEditError> {
        let mut tree = FvTree::new(RootKind::Tree);
        let first = tree.add_node(raw_file(1, 4));
        let second = tree.add_node(raw_file(2, 4));
        let third = tree.add_node(raw_file(3, 4));
        tree.append_child(tree.root(), first)?;
        tree.append_child(tree.root(), third)?;
        tree.insert_child(tree.root(), 1, second)?;

        assert_eq!(tree.children(tree.root())?, &[first, second, third]);
        assert_eq!(tree.position(second)?, 1);
        assert!(tree.has_next_sibling(second)?);
        assert!(!tree.has_next_sibling(third)?);
        assert_eq!(tree.parent(third)?, Some(tree.root()));

        assert_eq!(tree.detach(first)?, 0);
        assert_eq!(tree.children(tree.root())?, &[second, third]);
        assert_eq!(tree.parent(first)?, None);
        Ok(())
    }

    #[test]
    fn attach_should_reject_attached_nodes_and_cycles() -> Result<(), FvEditError> {
        let mut tree = FvTree::new(RootKind::Tree);
        let section = tree.add_node(SectionNode::new_leaf(raw_type::FIRMWARE_VOLUME_IMAGE, Vec::new())?.into());
        let file = tree.add_node(raw_file(1, 4));
        tree.append_child(tree.root(), file)?;
        tree.append_child(file, section)?;

        assert_eq!(tree.append_child(tree.root(), file), Err(FvEditError::NotDetached(file)));
        tree.detach(file)?;
        assert_eq!(tree.append_child(section, file), Err(FvEditError::InvalidParameter));
        assert_eq!(tree.insert_child(tree.root(), 5, file), Err(FvEditError::InvalidParameter));
        Ok(())
    }

    #[test]
    fn volume_under_section_should_be_sectioned() -> Result<(), FvEditError> {
        let mut tree = FvTree::new(RootKind::Tree);
        let volume = || {
            VolumeNode::new(EFI_FIRMWARE_FILE_SYSTEM2_GUID, 0, vec![BlockMapEntry { num_blocks: 1, length: 0x100 }])
        };
        let outer = tree.add_node(volume()?.into());
        let file = tree.add_node(raw_file(1, 0));
        let section = tree.add_node(SectionNode::new_leaf(raw_type::FIRMWARE_VOLUME_IMAGE, Vec::new())?.into());
        let inner = tree.add_node(volume()?.into());
        tree.append_child(tree.root(), outer)?;
        tree.append_child(outer, file)?;
        tree.append_child(file, section)?;
        tree.append_child(section, inner)?;

        assert_eq!(tree.kind(outer)?, NodeKind::Volume);
        assert_eq!(tree.kind(inner)?, NodeKind::SectionedVolume);
        assert_eq!(tree.kind(tree.root())?, NodeKind::Root(RootKind::Tree));
        assert_eq!(tree.path_to_root(inner)?, vec![inner, section, file, outer, tree.root()]);
        assert_eq!(tree.file(inner).err(), Some(FvEditError::NotAFile(inner)));
        assert_eq!(tree.volume(file).err(), Some(FvEditError::NotAVolume(file)));
        Ok(())
    }

    #[test]
    fn remove_should_free_subtree() -> Result<(), FvEditError> {
        let mut tree = FvTree::new(RootKind::File);
        let file = tree.add_node(raw_file(1, 0));
        let section = tree.add_node(SectionNode::new_leaf(raw_type::RAW, vec![0; 4])?.into());
        tree.append_child(tree.root(), file)?;
        tree.append_child(file, section)?;
        assert_eq!(tree.len(), 3);

        tree.remove(file)?;
        assert_eq!(tree.len(), 1);
        assert!(tree.is_empty());
        assert!(!tree.contains(section));
        assert_eq!(tree.data(section).err(), Some(FvEditError::NodeNotFound(section)));
        assert_eq!(tree.remove(tree.root()), Err(FvEditError::InvalidParameter));
        Ok(())
    }

    #[test]
    fn removed_slots_should_be_reused_without_reviving_handles() -> Result<(), FvEditError> {
        let mut tree = FvTree::new(RootKind::Tree);
        let file = tree.add_node(raw_file(1, 0));
        tree.append_child(tree.root(), file)?;
        tree.remove(file)?;

        let replacement = tree.add_node(raw_file(2, 0));
        assert_eq!(replacement.index(), file.index());
        assert_ne!(replacement, file);
        assert!(!tree.contains(file));
        assert_eq!(tree.parent(file).err(), Some(FvEditError::NodeNotFound(file)));
        assert!(tree.contains(replacement));
        assert_eq!(tree.len(), 2);

        // churn does not grow the arena
        for tag in 3..10 {
            tree.remove(tree.children(tree.root())?.first().copied().unwrap_or(replacement))?;
            let next = tree.add_node(raw_file(tag, 0));
            tree.append_child(tree.root(), next)?;
        }
        assert_eq!(tree.slots.len(), 2);
        Ok(())
    }

    #[test]
    fn root_should_serialize_children_back_to_back() -> Result<(), FvEditError> {
        let mut tree = FvTree::new(RootKind::Tree);
        let first = tree.add_node(raw_file(1, 3));
        let free = tree.add_node(FreeSpace::new(5).into());
        tree.append_child(tree.root(), first)?;
        tree.append_child(tree.root(), free)?;

        let bytes = tree.serialize(tree.root())?;
        assert_eq!(bytes.len(), 0x20 + 5);
        assert_eq!(tree.total_size(tree.root())?, bytes.len());
        assert_eq!(&bytes[0x1b..], &[0xff; 10]);
        Ok(())
    }
}
