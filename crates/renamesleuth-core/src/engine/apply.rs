/// Applying a preview to disk — runs on the worker thread.
///
/// # Strategy
///
/// Every item whose own name or parent changes is moved in two passes:
///
/// 1. **Stage** (current tree, top-down): rename the item to a unique
///    temporary name inside its present directory.
/// 2. **Finalize** (preview tree, top-down): move the staged item to its
///    final location, creating intermediate directories as needed.
///
/// Staging first vacates every slot that takes part in the batch, so swaps
/// and rename cycles need no special ordering. Items that keep their name
/// under a parent that merely moves are carried along with the parent and
/// never touched individually.
///
/// Locations are tracked per moved node; the on-disk path of any node is the
/// recorded location of its nearest moved ancestor plus the unchanged names
/// below it. This keeps paths valid after ancestors have been renamed.
///
/// Failures are isolated per item: the item is put back under its original
/// name and the batch continues. Nothing already finalized is rolled back.
/// On abort, items still sitting at temporary names are restored.
use super::events::{EngineEvent, FaultKind, ItemFault, Reporter, WorkerMessage};
use super::workspace::Workspace;
use crate::model::{ItemIndex, ItemTree, TreeSide};
use crossbeam_channel::Sender;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

pub(crate) struct ApplyJob {
    pub workspace: Workspace,
    pub abort: Arc<AtomicBool>,
}

/// One item that needs its own move.
#[derive(Debug, Clone, Copy)]
struct PlannedMove {
    current: ItemIndex,
    preview: ItemIndex,
}

#[derive(Debug, Clone)]
enum Location {
    /// Renamed to a temporary name inside its original parent, which may
    /// itself move later.
    Staged(String),
    /// At its final location.
    Placed(PathBuf),
}

/// On-disk location of current-tree nodes while the batch is in flight.
struct Locations<'a> {
    tree: &'a ItemTree,
    moved: HashMap<ItemIndex, Location>,
}

impl<'a> Locations<'a> {
    fn new(tree: &'a ItemTree) -> Self {
        Self {
            tree,
            moved: HashMap::new(),
        }
    }

    fn resolve(&self, index: ItemIndex) -> PathBuf {
        match self.moved.get(&index) {
            Some(Location::Placed(path)) => path.clone(),
            Some(Location::Staged(temp)) => match self.tree.parent_of(index) {
                Some(parent) => self.resolve(parent).join(temp),
                None => self.tree.base_path().to_path_buf(),
            },
            None => self.original_slot(index),
        }
    }

    /// Where the node would be under its original name.
    fn original_slot(&self, index: ItemIndex) -> PathBuf {
        match self.tree.parent_of(index) {
            Some(parent) => self.resolve(parent).join(self.tree.node(index).os_name()),
            None => self.tree.base_path().to_path_buf(),
        }
    }

    fn stage(&mut self, index: ItemIndex, temp: String) {
        self.moved.insert(index, Location::Staged(temp));
    }

    fn place(&mut self, index: ItemIndex, path: PathBuf) {
        self.moved.insert(index, Location::Placed(path));
    }

    fn forget(&mut self, index: ItemIndex) {
        self.moved.remove(&index);
    }
}

pub(crate) fn run(job: ApplyJob, tx: Sender<WorkerMessage>) {
    let start = Instant::now();
    let ApplyJob { mut workspace, abort } = job;
    let mut reporter = Reporter::new(tx);

    let aborted = match workspace.preview.as_ref() {
        Some(preview) => apply(&workspace, preview, &abort, &mut reporter),
        None => false,
    };

    info!(
        "Changings {} after {:?}: {} processed, {} errors",
        if aborted { "aborted" } else { "applied" },
        start.elapsed(),
        reporter.items_processed,
        reporter.errors_occurred
    );

    workspace.applied = true;
    workspace.faults = reporter.take_faults();
    let event = EngineEvent::ChangingsApplied {
        items_processed: reporter.items_processed,
        aborted,
        errors_occurred: reporter.errors_occurred,
    };
    reporter.finish(event, workspace, aborted);
}

/// Returns `true` if the run was aborted.
fn apply(
    workspace: &Workspace,
    preview: &ItemTree,
    abort: &AtomicBool,
    reporter: &mut Reporter,
) -> bool {
    let current = &workspace.current;
    let correspondence = &workspace.correspondence;

    let mut moves = Vec::new();
    for (c, p) in correspondence.pairs() {
        if needs_own_move(workspace, preview, c, p) {
            moves.push(PlannedMove {
                current: c,
                preview: p,
            });
        } else {
            reporter.item_done();
        }
    }
    debug!(
        "{} items carried along or unchanged, {} to move",
        reporter.items_processed,
        moves.len()
    );

    let mut locations = Locations::new(current);
    let temp_tag = format!(".renamesleuth-{}", std::process::id());
    let mut temp_counter: u64 = 0;

    // Preview nodes whose item could not be moved; their subtrees cannot be
    // populated either.
    let mut failed_preview: HashSet<ItemIndex> = HashSet::new();

    // ── Pass 1: stage ───────────────────────────────────────────────────────
    let mut staged: Vec<PlannedMove> = Vec::with_capacity(moves.len());
    for planned in &moves {
        if abort.load(Ordering::Relaxed) {
            restore_all(&staged, &mut locations, reporter);
            return true;
        }
        match stage(&mut locations, planned.current, &temp_tag, &mut temp_counter) {
            Ok(()) => staged.push(*planned),
            Err(fault) => {
                failed_preview.insert(planned.preview);
                reporter.fault(fault);
                reporter.item_done();
            }
        }
    }

    // ── Pass 2: finalize ────────────────────────────────────────────────────
    staged.sort_by_key(|m| m.preview);

    for (position, planned) in staged.iter().enumerate() {
        if abort.load(Ordering::Relaxed) {
            restore_all(&staged[position..], &mut locations, reporter);
            return true;
        }

        let destination = preview.full_path(planned.preview);
        let blocked_by_parent = preview_ancestors(preview, planned.preview)
            .any(|ancestor| failed_preview.contains(&ancestor));

        let result = if blocked_by_parent {
            Err(ItemFault::new(
                destination.clone(),
                FaultKind::Io,
                "parent directory could not be renamed",
            ))
        } else {
            finalize(&mut locations, planned.current, &destination)
        };

        if let Err(fault) = result {
            failed_preview.insert(planned.preview);
            reporter.fault(fault);
            restore(planned.current, &mut locations, reporter);
        }
        reporter.item_done();
    }

    false
}

/// `false` when the item ends up in place just by its parent moving.
fn needs_own_move(workspace: &Workspace, preview: &ItemTree, current: ItemIndex, target: ItemIndex) -> bool {
    let tree = &workspace.current;
    if tree.node(current).os_name() != preview.node(target).os_name() {
        return true;
    }
    let (Some(current_parent), Some(preview_parent)) = (tree.parent_of(current), preview.parent_of(target)) else {
        return true;
    };
    let parent_lands_there = if Some(current_parent) == tree.root() {
        Some(preview_parent) == preview.root()
    } else {
        workspace.counterpart(current_parent, TreeSide::Preview) == Some(preview_parent)
    };
    !parent_lands_there
}

/// Move an item to a fresh temporary name inside its present directory.
fn stage(locations: &mut Locations<'_>, item: ItemIndex, tag: &str, counter: &mut u64) -> Result<(), ItemFault> {
    let source = locations.resolve(item);
    let Some(dir) = source.parent() else {
        return Err(ItemFault::new(source, FaultKind::Io, "item has no parent directory"));
    };
    let temp = unique_temp_name(dir, tag, counter);
    std::fs::rename(&source, dir.join(&temp))
        .map_err(|err| ItemFault::new(&source, FaultKind::Io, err.to_string()))?;
    locations.stage(item, temp);
    Ok(())
}

fn finalize(locations: &mut Locations<'_>, item: ItemIndex, destination: &Path) -> Result<(), ItemFault> {
    let source = locations.resolve(item);
    if let Some(parent) = destination.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|err| ItemFault::new(parent, FaultKind::Io, err.to_string()))?;
    }
    if std::fs::symlink_metadata(destination).is_ok() {
        return Err(ItemFault::new(
            destination,
            FaultKind::Collision,
            "destination already exists",
        ));
    }
    std::fs::rename(&source, destination)
        .map_err(|err| ItemFault::new(destination, FaultKind::Io, err.to_string()))?;
    locations.place(item, destination.to_path_buf());
    Ok(())
}

/// Move a staged item back to its original name.
fn restore(item: ItemIndex, locations: &mut Locations<'_>, reporter: &mut Reporter) {
    let staged_at = locations.resolve(item);
    let original = locations.original_slot(item);
    if std::fs::symlink_metadata(&original).is_ok() {
        reporter.fault(ItemFault::new(
            &original,
            FaultKind::Collision,
            format!("original name is taken; item left at {}", staged_at.display()),
        ));
        return;
    }
    match std::fs::rename(&staged_at, &original) {
        Ok(()) => locations.forget(item),
        Err(err) => reporter.fault(ItemFault::new(
            &original,
            FaultKind::Io,
            format!("unable to restore from {}: {err}", staged_at.display()),
        )),
    }
}

/// Restore items that were staged but not finalized, deepest first.
fn restore_all(pending: &[PlannedMove], locations: &mut Locations<'_>, reporter: &mut Reporter) {
    let mut order: Vec<ItemIndex> = pending.iter().map(|m| m.current).collect();
    order.sort_unstable_by(|a, b| b.cmp(a));
    for item in order {
        restore(item, locations, reporter);
    }
}

fn preview_ancestors(preview: &ItemTree, index: ItemIndex) -> impl Iterator<Item = ItemIndex> + '_ {
    std::iter::successors(preview.parent_of(index), move |&p| preview.parent_of(p))
}

fn unique_temp_name(dir: &Path, tag: &str, counter: &mut u64) -> String {
    loop {
        *counter += 1;
        let candidate = format!("{tag}-{counter}.tmp");
        if std::fs::symlink_metadata(dir.join(&candidate)).is_err() {
            return candidate;
        }
    }
}
