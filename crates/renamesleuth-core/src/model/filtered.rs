/// Filtering/sorting projection over an [`ItemTree`].
///
/// The view never copies nodes: it only stores, per visible parent, the
/// visible children in view order plus the reverse row lookup. Both current
/// and preview trees get their own view so a frontend can sort and hide
/// entries without touching the data the engine works on.
///
/// The projection is recomputed wholesale whenever the underlying tree is
/// replaced (detected via [`ItemTree::generation`]); trees are immutable once
/// built, so there is nothing to patch incrementally.
use super::file_item::{FileItem, ItemIndex};
use super::item_tree::{ItemTree, ModelIndex};
use crate::config::{Settings, SortOrder};
use std::cmp::Ordering;
use std::collections::HashMap;

type Predicate = Box<dyn Fn(&FileItem) -> bool + Send + Sync>;

pub struct FilteredItemModel {
    predicate: Predicate,
    /// `None` keeps source order.
    sort_order: Option<SortOrder>,

    /// Generation of the tree the mapping was computed from.
    generation: Option<u64>,
    root: Option<ItemIndex>,

    /// Visible children of every visible directory, in view order.
    rows: HashMap<ItemIndex, Vec<ItemIndex>>,
    /// View row of every visible node.
    view_rows: HashMap<ItemIndex, usize>,
    view_parents: HashMap<ItemIndex, ItemIndex>,
}

impl std::fmt::Debug for FilteredItemModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilteredItemModel")
            .field("sort_order", &self.sort_order)
            .field("generation", &self.generation)
            .field("visible", &self.view_rows.len())
            .finish()
    }
}

impl FilteredItemModel {
    pub fn new(
        predicate: impl Fn(&FileItem) -> bool + Send + Sync + 'static,
        sort_order: Option<SortOrder>,
    ) -> Self {
        Self {
            predicate: Box::new(predicate),
            sort_order,
            generation: None,
            root: None,
            rows: HashMap::new(),
            view_rows: HashMap::new(),
            view_parents: HashMap::new(),
        }
    }

    /// View configured from user settings (backup-file hiding, sort order).
    pub fn from_settings(settings: &Settings) -> Self {
        let settings_for_filter = settings.clone();
        Self::new(
            move |item| settings_for_filter.is_visible(item),
            Some(settings.sort_order),
        )
    }

    /// View that shows everything in source order.
    pub fn unfiltered() -> Self {
        Self::new(|_| true, None)
    }

    /// `true` if the mapping was not computed from `tree`.
    pub fn is_stale(&self, tree: &ItemTree) -> bool {
        self.generation != Some(tree.generation())
    }

    /// Recompute the mapping if `tree` is not the one it was built from.
    pub fn sync(&mut self, tree: &ItemTree) {
        if self.is_stale(tree) {
            self.refresh(tree);
        }
    }

    /// Drop the mapping (e.g. when the underlying tree is discarded).
    pub fn invalidate(&mut self) {
        self.generation = None;
        self.root = None;
        self.rows.clear();
        self.view_rows.clear();
        self.view_parents.clear();
    }

    /// Recompute the whole mapping from `tree`.
    pub fn refresh(&mut self, tree: &ItemTree) {
        self.invalidate();
        self.generation = Some(tree.generation());

        let Some(root) = tree.root() else {
            return;
        };
        self.root = Some(root);
        self.view_rows.insert(root, 0);

        let mut stack = vec![root];
        while let Some(parent) = stack.pop() {
            let mut visible: Vec<ItemIndex> = tree
                .children(parent)
                .iter()
                .copied()
                .filter(|&c| (self.predicate)(tree.node(c)))
                .collect();
            if let Some(sort_order) = self.sort_order {
                visible.sort_by(|&a, &b| compare_items(tree.node(a), tree.node(b), sort_order));
            }

            for (row, &child) in visible.iter().enumerate() {
                self.view_rows.insert(child, row);
                self.view_parents.insert(child, parent);
                if tree.node(child).is_dir() {
                    stack.push(child);
                }
            }
            self.rows.insert(parent, visible);
        }
    }

    /// The root as a view index (always visible when the tree has one).
    pub fn root_index(&self) -> Option<ModelIndex> {
        self.root.map(|item| ModelIndex { item, row: 0 })
    }

    /// Index at view `row` below `parent`; with no parent, row 0 is the root.
    pub fn index(&self, parent: Option<ItemIndex>, row: usize) -> Option<ModelIndex> {
        match parent {
            None if row == 0 => self.root_index(),
            None => None,
            Some(p) => self
                .rows
                .get(&p)?
                .get(row)
                .map(|&item| ModelIndex { item, row }),
        }
    }

    pub fn parent(&self, index: ModelIndex) -> Option<ModelIndex> {
        let parent = *self.view_parents.get(&index.item)?;
        self.map_from_source(parent)
    }

    pub fn row_count(&self, parent: Option<ItemIndex>) -> usize {
        match parent {
            None => usize::from(self.root.is_some()),
            Some(p) => self.rows.get(&p).map_or(0, Vec::len),
        }
    }

    /// Visible children of `parent` in view order.
    pub fn children(&self, parent: ItemIndex) -> &[ItemIndex] {
        self.rows.get(&parent).map(Vec::as_slice).unwrap_or(&[])
    }

    /// View index of a source node, or `None` if it is filtered out.
    pub fn map_from_source(&self, source: ItemIndex) -> Option<ModelIndex> {
        self.view_rows
            .get(&source)
            .map(|&row| ModelIndex { item: source, row })
    }

    /// Source index of a view index.
    pub fn map_to_source(&self, index: ModelIndex, tree: &ItemTree) -> ModelIndex {
        tree.index(index.item)
    }

    pub fn is_visible(&self, source: ItemIndex) -> bool {
        self.view_rows.contains_key(&source)
    }

    /// Visible nodes in depth-first view order, with their depth.
    pub fn flatten(&self) -> Vec<(ItemIndex, usize)> {
        let mut out = Vec::with_capacity(self.view_rows.len());
        let Some(root) = self.root else {
            return out;
        };
        let mut stack = vec![(root, 0usize)];
        while let Some((item, depth)) = stack.pop() {
            out.push((item, depth));
            for &child in self.children(item).iter().rev() {
                stack.push((child, depth + 1));
            }
        }
        out
    }
}

fn compare_items(a: &FileItem, b: &FileItem, sort_order: SortOrder) -> Ordering {
    let by_name = || {
        a.name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.name.cmp(&b.name))
    };
    match sort_order {
        SortOrder::Name => by_name(),
        SortOrder::KindThenName => b.is_dir().cmp(&a.is_dir()).then_with(by_name),
    }
}
