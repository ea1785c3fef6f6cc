/// Preview generation — runs on the worker thread.
///
/// Scans the current tree, evaluates the script for every entry below the
/// root (top-down, so a directory is placed before its contents) and builds
/// the preview tree plus the correspondence as it goes.
use super::events::{EngineEvent, FaultKind, ItemFault, Reporter, WorkerMessage};
use super::workspace::Workspace;
use crate::model::{Correspondence, FileItem, ItemIndex, ItemKind, ItemTree, TreeSide};
use crate::script::{EvalOutcome, ItemContext, ScriptEvaluator};
use compact_str::CompactString;
use crossbeam_channel::Sender;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

pub(crate) struct PreviewJob {
    pub script: String,
    pub root_path: PathBuf,
    pub recursive: bool,
    pub evaluator: Arc<dyn ScriptEvaluator>,
    pub abort: Arc<AtomicBool>,
}

pub(crate) fn run(job: PreviewJob, tx: Sender<WorkerMessage>) {
    let start = Instant::now();
    let mut reporter = Reporter::new(tx);
    info!("Generating preview for {}", job.root_path.display());

    let current = match ItemTree::build_with_cancel(&job.root_path, job.recursive, &job.abort) {
        Ok(tree) => tree,
        Err(err) => {
            reporter.fault(ItemFault::new(&job.root_path, FaultKind::Io, err.to_string()));
            let mut workspace = Workspace::new(ItemTree::new(&job.root_path));
            workspace.faults = reporter.take_faults();
            let event = EngineEvent::PreviewReady {
                has_root_node: false,
                aborted: false,
                items_processed: 0,
                items_skipped: 0,
                errors_occurred: reporter.errors_occurred,
            };
            reporter.finish(event, workspace, false);
            return;
        }
    };

    for idx in current.indices() {
        if let Some(warning) = &current.node(idx).warning {
            reporter.fault(ItemFault::new(
                current.full_path(idx),
                FaultKind::Io,
                warning.as_str(),
            ));
        }
    }

    let mut builder = PreviewBuilder::new(&current);
    let mut items_skipped: u64 = 0;
    let mut aborted = job.abort.load(Ordering::Relaxed);

    for idx in current.indices().filter(|&i| Some(i) != current.root()) {
        if aborted || job.abort.load(Ordering::Relaxed) {
            aborted = true;
            break;
        }

        let context = ItemContext::from_tree(&current, idx);
        let outcome = job.evaluator.evaluate(&job.script, &context);
        // An interrupted evaluation says nothing about the item.
        if job.abort.load(Ordering::Relaxed) {
            aborted = true;
            break;
        }

        match outcome {
            EvalOutcome::Rename(target) => {
                if let Err(fault) = builder.place(idx, &target) {
                    reporter.fault(fault);
                }
            }
            EvalOutcome::Skip => {
                items_skipped += 1;
                debug!("Skipped {}", context.relative_path);
            }
            EvalOutcome::Error(message) => {
                reporter.fault(ItemFault::new(
                    current.full_path(idx),
                    FaultKind::Script,
                    message,
                ));
            }
        }
        reporter.item_done();
    }

    let (preview, correspondence) = builder.finish();
    let has_root_node = preview.root().is_some();
    info!(
        "Preview {} after {:?}: {} processed, {} renamed, {} skipped, {} errors",
        if aborted { "aborted" } else { "generated" },
        start.elapsed(),
        reporter.items_processed,
        correspondence.len(),
        items_skipped,
        reporter.errors_occurred
    );

    let event = EngineEvent::PreviewReady {
        has_root_node,
        aborted,
        items_processed: reporter.items_processed,
        items_skipped,
        errors_occurred: reporter.errors_occurred,
    };
    let mut workspace = Workspace::new(current);
    workspace.preview = has_root_node.then_some(preview);
    workspace.correspondence = correspondence;
    workspace.faults = reporter.take_faults();
    reporter.finish(event, workspace, aborted);
}

/// Split a script result into path segments, rejecting anything that could
/// escape the preview location or produce an unnamed entry.
pub(crate) fn parse_target(target: &str) -> Result<Vec<&str>, String> {
    let drive_prefix = cfg!(windows) && target.contains(':');
    if target.starts_with('/') || target.starts_with('\\') || drive_prefix {
        return Err(format!("absolute path not allowed: {target:?}"));
    }
    let segments: Vec<&str> = target.split(['/', std::path::MAIN_SEPARATOR]).collect();
    for segment in &segments {
        match *segment {
            "" => return Err(format!("empty path segment in {target:?}")),
            "." | ".." => return Err(format!("relative segment {segment:?} not allowed in {target:?}")),
            _ => {}
        }
    }
    Ok(segments)
}

/// Incrementally assembles the preview tree.
///
/// An item's target is resolved relative to where its parent ends up: the
/// parent's counterpart if it was renamed, otherwise a mirror of the
/// parent's current location (created on demand, with no counterpart).
struct PreviewBuilder<'a> {
    current: &'a ItemTree,
    preview: ItemTree,
    correspondence: Correspondence,
}

impl<'a> PreviewBuilder<'a> {
    fn new(current: &'a ItemTree) -> Self {
        Self {
            current,
            preview: ItemTree::new(current.base_path()),
            correspondence: Correspondence::new(),
        }
    }

    fn preview_root(&mut self) -> ItemIndex {
        match self.preview.root() {
            Some(root) => root,
            None => {
                let name = self
                    .current
                    .root()
                    .map(|r| self.current.node(r).name.clone())
                    .unwrap_or_default();
                self.preview.add_root(name)
            }
        }
    }

    /// Preview directory that corresponds to `current_dir`'s final location.
    fn location_of(&mut self, current_dir: ItemIndex) -> Result<ItemIndex, ItemFault> {
        if Some(current_dir) == self.current.root() {
            return Ok(self.preview_root());
        }
        if let Some(preview_dir) = self.correspondence.counterpart(current_dir, TreeSide::Preview) {
            return Ok(preview_dir);
        }
        // Not renamed: it stays put inside wherever its own parent ends up.
        let parent = self.current.parent_of(current_dir).unwrap_or(current_dir);
        let parent_location = self.location_of(parent)?;
        let name = self.current.node(current_dir).name.clone();
        let mirror = self.preview_node(current_dir, &name, ItemKind::Directory);
        self.ensure_dirs(parent_location, std::iter::once(mirror), current_dir)
    }

    /// A preview node called `name` for `item`. An item that keeps its name
    /// keeps its exact on-disk spelling as well.
    fn preview_node(&self, item: ItemIndex, name: &str, kind: ItemKind) -> FileItem {
        let source = self.current.node(item);
        let mut node = FileItem::new(CompactString::new(name), kind, None);
        if source.name == name {
            node.raw_name = source.raw_name.clone();
        }
        node
    }

    fn ensure_dirs(
        &mut self,
        mut parent: ItemIndex,
        dirs: impl Iterator<Item = FileItem>,
        for_item: ItemIndex,
    ) -> Result<ItemIndex, ItemFault> {
        for dir in dirs {
            parent = match self.preview.find_child(parent, &dir.name) {
                Some(existing) if self.preview.node(existing).is_dir() => existing,
                Some(existing) => {
                    return Err(ItemFault::new(
                        self.current.full_path(for_item),
                        FaultKind::Collision,
                        format!(
                            "{} is a file in the preview, not a directory",
                            self.preview.display_path(existing)
                        ),
                    ))
                }
                None => self.preview.add_child(parent, dir),
            };
        }
        Ok(parent)
    }

    /// Place `item` at `target` (relative to its parent's final location).
    fn place(&mut self, item: ItemIndex, target: &str) -> Result<(), ItemFault> {
        let segments = parse_target(target).map_err(|message| {
            ItemFault::new(self.current.full_path(item), FaultKind::InvalidTarget, message)
        })?;
        let Some((leaf, dirs)) = segments.split_last() else {
            return Err(ItemFault::new(
                self.current.full_path(item),
                FaultKind::InvalidTarget,
                "empty target path",
            ));
        };

        let current_parent = self.current.parent_of(item).unwrap_or(item);
        let base = self.location_of(current_parent)?;
        let new_dirs = dirs
            .iter()
            .map(|name| FileItem::new_dir(CompactString::new(*name), None));
        let parent = self.ensure_dirs(base, new_dirs, item)?;
        let kind = self.current.node(item).kind;

        let preview_item = match self.preview.find_child(parent, leaf) {
            // A directory created on demand for someone else's target can be
            // claimed by the directory that really ends up there.
            Some(existing)
                if kind == ItemKind::Directory
                    && self.preview.node(existing).is_dir()
                    && self.correspondence.counterpart(existing, TreeSide::Current).is_none() =>
            {
                existing
            }
            Some(existing) => {
                let taken_by = self
                    .correspondence
                    .counterpart(existing, TreeSide::Current)
                    .map(|c| self.current.display_path(c))
                    .unwrap_or_else(|| "an existing entry".to_string());
                return Err(ItemFault::new(
                    self.current.full_path(item),
                    FaultKind::Collision,
                    format!(
                        "target {} is already taken by {taken_by}",
                        self.preview.display_path(existing)
                    ),
                ));
            }
            None => {
                let node = self.preview_node(item, leaf, kind);
                self.preview.add_child(parent, node)
            }
        };

        self.correspondence
            .link(item, preview_item)
            .map_err(|e| ItemFault::new(self.current.full_path(item), FaultKind::Collision, e.to_string()))
    }

    fn finish(self) -> (ItemTree, Correspondence) {
        (self.preview, self.correspondence)
    }
}
