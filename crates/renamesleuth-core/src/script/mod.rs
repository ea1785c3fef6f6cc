/// Script evaluation — computing a new path for one item.
///
/// The engine only talks to the [`ScriptEvaluator`] trait. The shipped
/// implementation is [`RhaiEvaluator`], an embedded Rhai interpreter with
/// no filesystem, module or process access.
///
/// # Script contract
///
/// Each invocation sees the item's fields as variables:
///
/// | variable        | meaning                                        |
/// |-----------------|------------------------------------------------|
/// | `name`          | file or directory name                         |
/// | `base_name`     | name without extension                         |
/// | `extension`     | extension without the dot, or `""`             |
/// | `path`          | absolute path                                  |
/// | `parent_path`   | absolute path of the containing directory      |
/// | `relative_path` | `/`-separated path below the scanned root      |
/// | `is_dir`        | `true` for directories                         |
/// | `is_file`       | `true` for everything else                     |
/// | `index`         | row among its siblings (for numbering)         |
///
/// The value of the last expression is the new path, relative to where the
/// item's parent ends up. `()` or an empty string skips the item; `throw`
/// reports an error for this item only.
pub mod rhai_engine;

pub use rhai_engine::RhaiEvaluator;

use crate::model::{ItemIndex, ItemKind, ItemTree};
use serde::Serialize;
use thiserror::Error;

/// A script that failed to parse. Line and column are 1-based.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[error("error in line {line} and column {column}: {message}")]
pub struct ScriptSyntaxError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

/// Result of evaluating a script against one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvalOutcome {
    /// New path relative to the preview location of the item's parent.
    Rename(String),
    /// The script declined to rename this item.
    Skip,
    /// Runtime fault while evaluating this item.
    Error(String),
}

/// The fields of a single item exposed to a script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemContext {
    pub name: String,
    pub base_name: String,
    pub extension: String,
    pub path: String,
    pub parent_path: String,
    pub relative_path: String,
    pub kind: ItemKind,
    pub index: usize,
}

impl ItemContext {
    /// Snapshot the fields of `index` in `tree`.
    pub fn from_tree(tree: &ItemTree, index: ItemIndex) -> Self {
        let node = tree.node(index);
        let parent_path = tree
            .parent_of(index)
            .map(|p| tree.full_path(p))
            .unwrap_or_else(|| tree.base_path().to_path_buf());
        let relative_path = tree
            .relative_path(index)
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        Self {
            name: node.name.to_string(),
            base_name: node.base_name().to_string(),
            extension: node.extension().to_string(),
            path: tree.full_path(index).to_string_lossy().into_owned(),
            parent_path: parent_path.to_string_lossy().into_owned(),
            relative_path,
            kind: node.kind,
            index: tree.row_of(index),
        }
    }
}

/// A pluggable script runtime.
///
/// Implementations must isolate invocations from each other: a fault while
/// evaluating one item must not affect the next one.
pub trait ScriptEvaluator: Send + Sync {
    /// Parse `script` without running it.
    fn check_syntax(&self, script: &str) -> Result<(), ScriptSyntaxError>;

    /// Run `script` against one item.
    fn evaluate(&self, script: &str, item: &ItemContext) -> EvalOutcome;
}
