/// Data model for RenameSleuth: the arena-allocated item trees, the
/// current ↔ preview correspondence and the filtered views over them.
pub mod correspondence;
pub mod file_item;
pub mod filtered;
pub mod item_tree;

pub use correspondence::{Correspondence, CorrespondenceError, TreeSide};
pub use file_item::{FileItem, ItemIndex, ItemKind};
pub use filtered::FilteredItemModel;
pub use item_tree::{ItemTree, ModelError, ModelIndex};
