/// Arena-backed item tree with row/parent addressing.
///
/// All nodes live in a single `Vec<FileItem>`. Relationships between nodes
/// use `ItemIndex` (a thin `u32` wrapper) rather than heap pointers, so the
/// handles stay valid for the lifetime of the tree and can be stored in a
/// correspondence map that spans two trees.
///
/// Nodes are only ever appended, and always after their parent, so arena
/// order is a valid top-down order: iterating `0..len` visits every parent
/// before any of its children.
use super::file_item::{FileItem, ItemIndex, ItemKind};
use compact_str::CompactString;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use thiserror::Error;
use tracing::{debug, warn};

/// Source of unique tree generations. Views compare generations to detect
/// that the tree they were computed from has been replaced.
static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// How often (in walked entries) the scanner polls the cancel flag.
const CANCEL_CHECK_INTERVAL: u64 = 256;

/// Failures that prevent a tree from being built at all.
///
/// Failures below the root are not errors: they become warnings on the
/// affected node.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("directory does not exist: {0}")]
    RootNotFound(PathBuf),

    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("unable to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A row-addressed reference to a node, as a tree view would hold it.
///
/// `row` is relative to whichever model produced the index: the source row
/// for [`ItemTree::index`], the view row for a filtered model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ModelIndex {
    pub item: ItemIndex,
    pub row: usize,
}

/// The complete tree produced by a scan (or assembled as a preview).
#[derive(Debug, Clone)]
pub struct ItemTree {
    /// Arena: every node in a flat vector.
    nodes: Vec<FileItem>,

    root: Option<ItemIndex>,

    /// Absolute location of the root node on disk.
    base_path: PathBuf,

    generation: u64,
}

impl ItemTree {
    /// Create an empty tree anchored at `base_path`.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            nodes: Vec::new(),
            root: None,
            base_path: base_path.into(),
            generation: NEXT_GENERATION.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Scan `root_path` into a new tree. See [`ItemTree::build_with_cancel`].
    pub fn build(root_path: &Path, recursive: bool) -> Result<Self, ModelError> {
        Self::build_with_cancel(root_path, recursive, &AtomicBool::new(false))
    }

    /// Scan `root_path` into a new tree, descending into subdirectories only
    /// when `recursive` is set.
    ///
    /// Entries are visited depth-first in name order. Subdirectories that
    /// cannot be listed are kept as leaves carrying a warning. When `cancel`
    /// is raised the walk stops and the partial tree is returned; callers
    /// check the flag themselves to tell the two apart.
    pub fn build_with_cancel(
        root_path: &Path,
        recursive: bool,
        cancel: &AtomicBool,
    ) -> Result<Self, ModelError> {
        let meta = std::fs::metadata(root_path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ModelError::RootNotFound(root_path.to_path_buf())
            } else {
                ModelError::Io {
                    path: root_path.to_path_buf(),
                    source,
                }
            }
        })?;
        if !meta.is_dir() {
            return Err(ModelError::NotADirectory(root_path.to_path_buf()));
        }
        // Listing the root must succeed; everything below it is best-effort.
        std::fs::read_dir(root_path).map_err(|source| ModelError::Io {
            path: root_path.to_path_buf(),
            source,
        })?;

        let mut tree = Self::new(root_path);
        let root_idx = tree.add_root(CompactString::new(root_display_name(root_path)));

        let mut dir_map: HashMap<PathBuf, ItemIndex> = HashMap::new();
        dir_map.insert(root_path.to_path_buf(), root_idx);

        let walker = jwalk::WalkDir::new(root_path)
            .skip_hidden(false)
            .follow_links(false)
            .sort(true)
            .max_depth(if recursive { usize::MAX } else { 1 })
            .parallelism(jwalk::Parallelism::RayonNewPool(num_cpus::get()));

        let mut walked: u64 = 0;
        for entry_result in walker {
            walked += 1;
            if walked.is_multiple_of(CANCEL_CHECK_INTERVAL) && cancel.load(Ordering::Relaxed) {
                debug!("Scan of {} cancelled after {walked} entries", root_path.display());
                return Ok(tree);
            }

            let entry = match entry_result {
                Ok(e) => e,
                Err(err) => {
                    // Attach to the directory that failed to list, or to its
                    // parent when the failing directory never made it in.
                    let message = CompactString::new(err.to_string());
                    let target = err.path().and_then(|p| {
                        dir_map
                            .get(p)
                            .or_else(|| p.parent().and_then(|parent| dir_map.get(parent)))
                            .copied()
                    });
                    warn!("Scan error below {}: {message}", root_path.display());
                    if let Some(idx) = target {
                        tree.set_warning(idx, message);
                    }
                    continue;
                }
            };

            if entry.depth == 0 {
                if let Some(err) = &entry.read_children_error {
                    tree.set_warning(root_idx, CompactString::new(err.to_string()));
                }
                continue;
            }

            let parent_idx = match dir_map.get(entry.parent_path()) {
                Some(&idx) => idx,
                None if entry.depth == 1 => root_idx,
                None => {
                    debug!("Orphan entry skipped: {}", entry.path().display());
                    continue;
                }
            };

            let kind = if entry.file_type().is_dir() {
                ItemKind::Directory
            } else {
                ItemKind::File
            };
            let item = FileItem::from_os_name(entry.file_name(), kind);
            if item.raw_name.is_some() {
                debug!("Name is not valid UTF-8: {}", entry.path().display());
            }
            let idx = tree.add_child(parent_idx, item);

            if kind == ItemKind::Directory {
                if let Some(err) = &entry.read_children_error {
                    tree.set_warning(idx, CompactString::new(err.to_string()));
                }
                dir_map.insert(entry.path(), idx);
            }
        }

        debug!(
            "Scanned {} entries below {} ({} warnings)",
            tree.len().saturating_sub(1),
            root_path.display(),
            tree.warning_count()
        );
        Ok(tree)
    }

    fn add_node(&mut self, node: FileItem) -> ItemIndex {
        let idx = ItemIndex::new(self.nodes.len());
        self.nodes.push(node);
        idx
    }

    /// Add the root directory. Replaces nothing: a tree has one root and this
    /// must be the first node added.
    pub fn add_root(&mut self, name: CompactString) -> ItemIndex {
        debug_assert!(self.root.is_none(), "tree already has a root");
        let idx = self.add_node(FileItem::new_dir(name, None));
        self.root = Some(idx);
        idx
    }

    /// Append `item` as the last child of `parent` and return its index.
    pub fn add_child(&mut self, parent: ItemIndex, mut item: FileItem) -> ItemIndex {
        item.parent = Some(parent);
        item.row = self.nodes[parent.idx()].children.len();
        let idx = self.add_node(item);
        self.nodes[parent.idx()].children.push(idx);
        idx
    }

    fn set_warning(&mut self, index: ItemIndex, message: CompactString) {
        let node = &mut self.nodes[index.idx()];
        if node.warning.is_none() {
            node.warning = Some(message);
        }
    }

    #[inline]
    pub fn root(&self) -> Option<ItemIndex> {
        self.root
    }

    #[inline]
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Identity of this particular tree instance.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Get the node at the given index.
    #[inline]
    pub fn node(&self, index: ItemIndex) -> &FileItem {
        &self.nodes[index.idx()]
    }

    /// Direct children of a node in insertion order.
    #[inline]
    pub fn children(&self, parent: ItemIndex) -> &[ItemIndex] {
        &self.nodes[parent.idx()].children
    }

    /// The node at `row` below `parent`; with no parent, row 0 is the root.
    pub fn node_at(&self, parent: Option<ItemIndex>, row: usize) -> Option<ItemIndex> {
        match parent {
            Some(p) => self.nodes.get(p.idx())?.children.get(row).copied(),
            None if row == 0 => self.root,
            None => None,
        }
    }

    #[inline]
    pub fn parent_of(&self, index: ItemIndex) -> Option<ItemIndex> {
        self.nodes[index.idx()].parent
    }

    /// Position of a node among its siblings. The root is row 0.
    #[inline]
    pub fn row_of(&self, index: ItemIndex) -> usize {
        self.nodes[index.idx()].row
    }

    /// Source-model index of a node.
    pub fn index(&self, item: ItemIndex) -> ModelIndex {
        ModelIndex {
            item,
            row: self.row_of(item),
        }
    }

    /// Find a direct child of `parent` by exact name.
    pub fn find_child(&self, parent: ItemIndex, name: &str) -> Option<ItemIndex> {
        self.children(parent)
            .iter()
            .copied()
            .find(|&c| self.nodes[c.idx()].name == name)
    }

    /// Nodes from just below the root down to `index`.
    fn lineage(&self, index: ItemIndex) -> Vec<&FileItem> {
        let mut lineage = Vec::new();
        let mut current = Some(index);
        while let Some(idx) = current {
            let node = &self.nodes[idx.idx()];
            if node.parent.is_none() {
                break;
            }
            lineage.push(node);
            current = node.parent;
        }
        lineage.reverse();
        lineage
    }

    /// Path of a node relative to the root. Empty for the root itself.
    pub fn relative_path(&self, index: ItemIndex) -> PathBuf {
        self.lineage(index).into_iter().map(FileItem::os_name).collect()
    }

    /// Absolute on-disk path of a node.
    pub fn full_path(&self, index: ItemIndex) -> PathBuf {
        let relative = self.relative_path(index);
        if relative.as_os_str().is_empty() {
            self.base_path.clone()
        } else {
            self.base_path.join(relative)
        }
    }

    /// `/`-separated path including the root name, e.g. `root/sub/b.txt`.
    pub fn display_path(&self, index: ItemIndex) -> String {
        let mut out = String::new();
        if let Some(root) = self.root {
            out.push_str(&self.nodes[root.idx()].name);
        }
        for node in self.lineage(index) {
            out.push('/');
            out.push_str(&node.name);
        }
        out
    }

    /// All node indices in top-down (arena) order.
    pub fn indices(&self) -> impl Iterator<Item = ItemIndex> + '_ {
        (0..self.nodes.len()).map(ItemIndex::new)
    }

    /// Number of nodes carrying a scan warning.
    pub fn warning_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.warning.is_some()).count()
    }

    /// Total number of nodes in the tree, root included.
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the tree contains no nodes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Derive a display name for the scan root.
fn root_display_name(path: &Path) -> String {
    if let Some(name) = path.file_name() {
        name.to_string_lossy().to_string()
    } else {
        let s = path.to_string_lossy();
        let trimmed = s.trim_end_matches(['/', '\\']);
        if trimmed.is_empty() {
            s.to_string()
        } else {
            trimmed.to_string()
        }
    }
}
