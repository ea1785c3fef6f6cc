/// The data a run produces: current tree, preview tree and the
/// correspondence between them, plus the faults of the last run.
///
/// A workspace is owned by the worker while a run is active and handed back
/// to the engine owner with the terminal event, so the trees are never read
/// and written concurrently.
use super::events::ItemFault;
use crate::model::{Correspondence, ItemIndex, ItemTree, TreeSide};

#[derive(Debug, Clone)]
pub struct Workspace {
    pub(crate) current: ItemTree,
    pub(crate) preview: Option<ItemTree>,
    pub(crate) correspondence: Correspondence,
    pub(crate) faults: Vec<ItemFault>,
    /// Set once the preview has been written to disk.
    pub(crate) applied: bool,
}

impl Workspace {
    pub(crate) fn new(current: ItemTree) -> Self {
        Self {
            current,
            preview: None,
            correspondence: Correspondence::new(),
            faults: Vec::new(),
            applied: false,
        }
    }

    pub fn current(&self) -> &ItemTree {
        &self.current
    }

    pub fn preview(&self) -> Option<&ItemTree> {
        self.preview.as_ref()
    }

    pub fn correspondence(&self) -> &Correspondence {
        &self.correspondence
    }

    /// Tree on the given side, if it exists.
    pub fn tree(&self, side: TreeSide) -> Option<&ItemTree> {
        match side {
            TreeSide::Current => Some(&self.current),
            TreeSide::Preview => self.preview.as_ref(),
        }
    }

    /// Counterpart of `index` on the `target` side.
    pub fn counterpart(&self, index: ItemIndex, target: TreeSide) -> Option<ItemIndex> {
        self.correspondence.counterpart(index, target)
    }

    /// Faults recorded by the most recent run.
    pub fn faults(&self) -> &[ItemFault] {
        &self.faults
    }

    pub fn is_applied(&self) -> bool {
        self.applied
    }

    /// `true` if there is a preview with at least one renamed item that has
    /// not been applied yet.
    pub fn has_pending_changes(&self) -> bool {
        self.preview.is_some() && !self.correspondence.is_empty() && !self.applied
    }

    /// Discard the preview tree and all correspondences.
    pub(crate) fn clear_preview(&mut self) {
        self.preview = None;
        self.correspondence.clear();
        self.applied = false;
    }
}
