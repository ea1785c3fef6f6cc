/// A single node in an arena-allocated item tree.
///
/// Nodes are stored in a flat `Vec<FileItem>` owned by an [`ItemTree`].
/// Parent-child relationships use indices rather than pointers, so a node
/// can be cross-referenced from a second tree (current ↔ preview) without
/// any lifetime entanglement.
///
/// [`ItemTree`]: super::ItemTree
use compact_str::CompactString;
use std::ffi::{OsStr, OsString};

/// Lightweight handle into the arena `Vec<FileItem>`.
///
/// Uses `u32` to keep nodes small; supports up to ~4 billion nodes,
/// which is more than enough for any directory a user will rename.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemIndex(pub u32);

impl ItemIndex {
    /// Create a new `ItemIndex` from a `usize`.
    #[inline]
    pub fn new(index: usize) -> Self {
        debug_assert!(index <= u32::MAX as usize, "ItemIndex overflow");
        Self(index as u32)
    }

    /// Return the index as a `usize` for Vec indexing.
    #[inline]
    pub fn idx(self) -> usize {
        self.0 as usize
    }
}

/// Whether a node is a file or a directory.
///
/// Symlinks and other special entries are reported as [`ItemKind::File`];
/// the scanner never follows links.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    File,
    Directory,
}

/// A single file or directory in the tree.
#[derive(Debug, Clone)]
pub struct FileItem {
    /// File or directory name only (NOT the full path).
    /// Paths are reconstructed on demand by walking up via `parent`.
    pub name: CompactString,

    /// The on-disk name when it is not valid UTF-8 and `name` is a lossy
    /// rendering of it. Paths are always built from [`FileItem::os_name`].
    pub raw_name: Option<OsString>,

    pub kind: ItemKind,

    /// Index of the parent node. `None` only for the root.
    pub parent: Option<ItemIndex>,

    /// Children in insertion order (directory-listing order for scanned
    /// trees, creation order for preview trees).
    pub children: Vec<ItemIndex>,

    /// Position among the parent's children. Assigned when the node is
    /// attached to a tree.
    pub row: usize,

    /// Set when the directory could not be listed. The node stays in the
    /// tree as a leaf so the caller can see where the scan was incomplete.
    pub warning: Option<CompactString>,
}

impl FileItem {
    /// Create a new file node.
    pub fn new_file(name: CompactString, parent: Option<ItemIndex>) -> Self {
        Self::new(name, ItemKind::File, parent)
    }

    /// Create a new directory node.
    pub fn new_dir(name: CompactString, parent: Option<ItemIndex>) -> Self {
        Self::new(name, ItemKind::Directory, parent)
    }

    pub fn new(name: CompactString, kind: ItemKind, parent: Option<ItemIndex>) -> Self {
        Self {
            name,
            raw_name: None,
            kind,
            parent,
            children: Vec::new(),
            row: 0,
            warning: None,
        }
    }

    /// Build a node from a name as read from disk, keeping the raw bytes
    /// when they do not survive conversion to UTF-8.
    pub fn from_os_name(name: &OsStr, kind: ItemKind) -> Self {
        let mut item = Self::new(CompactString::new(name.to_string_lossy()), kind, None);
        if name.to_str().is_none() {
            item.raw_name = Some(name.to_os_string());
        }
        item
    }

    /// Name to use when addressing the item on disk.
    pub fn os_name(&self) -> &OsStr {
        match &self.raw_name {
            Some(raw) => raw.as_os_str(),
            None => OsStr::new(self.name.as_str()),
        }
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.kind == ItemKind::Directory
    }

    /// Extension of the name without the leading dot, or `""`.
    ///
    /// Dotfiles such as `.gitignore` have no extension.
    pub fn extension(&self) -> &str {
        match self.name.rfind('.') {
            Some(0) | None => "",
            Some(pos) => &self.name[pos + 1..],
        }
    }

    /// Name without its extension.
    pub fn base_name(&self) -> &str {
        match self.name.rfind('.') {
            Some(0) | None => &self.name,
            Some(pos) => &self.name[..pos],
        }
    }
}
