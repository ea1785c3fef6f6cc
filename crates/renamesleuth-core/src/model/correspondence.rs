/// Node correspondence between the current tree and the preview tree.
///
/// Keyed by node identity (`ItemIndex` on each side), never by path: the
/// whole point of the preview is that paths differ. The relation is kept
/// 1:1 and symmetric by storing both directions and refusing to link a node
/// that already has a counterpart.
use super::file_item::ItemIndex;
use std::collections::HashMap;
use thiserror::Error;

/// Which of the two paired trees a node belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TreeSide {
    Current,
    Preview,
}

impl TreeSide {
    pub fn other(self) -> Self {
        match self {
            TreeSide::Current => TreeSide::Preview,
            TreeSide::Preview => TreeSide::Current,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CorrespondenceError {
    #[error("current item {0:?} already has a preview counterpart")]
    CurrentAlreadyLinked(ItemIndex),

    #[error("preview item {0:?} already has a current counterpart")]
    PreviewAlreadyLinked(ItemIndex),
}

#[derive(Debug, Clone, Default)]
pub struct Correspondence {
    current_to_preview: HashMap<ItemIndex, ItemIndex>,
    preview_to_current: HashMap<ItemIndex, ItemIndex>,
}

impl Correspondence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `current` is renamed to `preview`.
    pub fn link(&mut self, current: ItemIndex, preview: ItemIndex) -> Result<(), CorrespondenceError> {
        if self.current_to_preview.contains_key(&current) {
            return Err(CorrespondenceError::CurrentAlreadyLinked(current));
        }
        if self.preview_to_current.contains_key(&preview) {
            return Err(CorrespondenceError::PreviewAlreadyLinked(preview));
        }
        self.current_to_preview.insert(current, preview);
        self.preview_to_current.insert(preview, current);
        Ok(())
    }

    /// Counterpart of `index` on the `target` side.
    ///
    /// `index` is interpreted as a node of the *other* side, so
    /// `counterpart(x, TreeSide::Preview)` maps a current node to its
    /// preview node.
    pub fn counterpart(&self, index: ItemIndex, target: TreeSide) -> Option<ItemIndex> {
        match target {
            TreeSide::Preview => self.current_to_preview.get(&index).copied(),
            TreeSide::Current => self.preview_to_current.get(&index).copied(),
        }
    }

    /// All `(current, preview)` pairs, ordered by current index (top-down).
    pub fn pairs(&self) -> Vec<(ItemIndex, ItemIndex)> {
        let mut pairs: Vec<_> = self
            .current_to_preview
            .iter()
            .map(|(&c, &p)| (c, p))
            .collect();
        pairs.sort_unstable();
        pairs
    }

    pub fn len(&self) -> usize {
        self.current_to_preview.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current_to_preview.is_empty()
    }

    pub fn clear(&mut self) {
        self.current_to_preview.clear();
        self.preview_to_current.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counterpart_is_symmetric() {
        let mut map = Correspondence::new();
        map.link(ItemIndex(3), ItemIndex(7)).unwrap();
        map.link(ItemIndex(1), ItemIndex(2)).unwrap();

        for (current, preview) in map.pairs() {
            assert_eq!(map.counterpart(current, TreeSide::Preview), Some(preview));
            assert_eq!(map.counterpart(preview, TreeSide::Current), Some(current));
        }
        assert_eq!(map.pairs(), vec![(ItemIndex(1), ItemIndex(2)), (ItemIndex(3), ItemIndex(7))]);
        assert_eq!(map.counterpart(ItemIndex(9), TreeSide::Preview), None);
    }

    #[test]
    fn test_link_is_one_to_one() {
        let mut map = Correspondence::new();
        map.link(ItemIndex(1), ItemIndex(1)).unwrap();
        assert_eq!(
            map.link(ItemIndex(1), ItemIndex(2)),
            Err(CorrespondenceError::CurrentAlreadyLinked(ItemIndex(1)))
        );
        assert_eq!(
            map.link(ItemIndex(2), ItemIndex(1)),
            Err(CorrespondenceError::PreviewAlreadyLinked(ItemIndex(1)))
        );
        assert_eq!(map.len(), 1);
        map.clear();
        assert!(map.is_empty());
    }

    #[test]
    fn test_other_side() {
        assert_eq!(TreeSide::Current.other(), TreeSide::Preview);
        assert_eq!(TreeSide::Preview.other(), TreeSide::Current);
    }
}
