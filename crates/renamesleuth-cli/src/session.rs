/// Session state management.
///
/// Centralises all mutable state a frontend reads and writes while renaming:
/// the engine, run counters, the latest notification, the filtered views of
/// both trees and the synchronised selection between them.
///
/// The engine worker communicates via a channel; state updates happen in
/// [`Session::process_engine_events`], which a frontend calls once per tick.
use crate::render;
use crate::script_source::{ScriptSource, ScriptSourceError};
use renamesleuth_core::config::Settings;
use renamesleuth_core::engine::{EngineError, EngineEvent, ItemFault, RenamingEngine, RunRequest};
use renamesleuth_core::model::{FilteredItemModel, ItemIndex, ItemTree, ModelIndex, TreeSide};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// The current phase of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Nothing generated yet, or the preview was cleared.
    Idle,
    GeneratingPreview,
    /// A preview is available and may be applied.
    PreviewReady,
    ApplyingChangings,
    /// The preview has been written to disk.
    ChangingsApplied,
}

/// How the latest notification should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Progress,
    Information,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub text: String,
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Script(#[from] ScriptSourceError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Maximum engine events drained per call to `process_engine_events`.
///
/// Keeps a backlog (a frontend that was not pumping for a while) from
/// stalling the caller's loop for a perceptible duration.
const MAX_EVENTS_PER_TICK: usize = 300;

/// Maximum faults kept for display; the counters stay exact.
const MAX_FAULTS: usize = 1_000;

pub struct Session {
    pub engine: RenamingEngine,
    pub settings: Settings,

    // ── Run ────────────────────────────────────────────
    pub phase: SessionPhase,
    pub items_processed: u64,
    pub items_skipped: u64,
    pub errors_occurred: u64,
    /// True if the most recent run was aborted.
    pub was_aborted: bool,
    pub has_root_node: bool,
    pub faults: Vec<ItemFault>,
    pub notification: Option<Notification>,
    /// Terminal event of the most recent finished run.
    pub last_event: Option<EngineEvent>,

    // ── Views ──────────────────────────────────────────
    pub current_view: FilteredItemModel,
    pub preview_view: FilteredItemModel,
    pub selected_current: Vec<ModelIndex>,
    pub selected_preview: Vec<ModelIndex>,
}

impl Session {
    pub fn new(settings: Settings) -> Self {
        Self::with_engine(RenamingEngine::with_rhai(), settings)
    }

    pub fn with_engine(engine: RenamingEngine, settings: Settings) -> Self {
        Self {
            engine,
            current_view: FilteredItemModel::from_settings(&settings),
            preview_view: FilteredItemModel::from_settings(&settings),
            settings,
            phase: SessionPhase::Idle,
            items_processed: 0,
            items_skipped: 0,
            errors_occurred: 0,
            was_aborted: false,
            has_root_node: false,
            faults: Vec::new(),
            notification: None,
            last_event: None,
            selected_current: Vec::new(),
            selected_preview: Vec::new(),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.engine.is_busy()
    }

    fn notify(&mut self, kind: NotificationKind, text: impl Into<String>) {
        self.notification = Some(Notification {
            kind,
            text: text.into(),
        });
    }

    fn reset_run(&mut self) {
        self.items_processed = 0;
        self.items_skipped = 0;
        self.errors_occurred = 0;
        self.was_aborted = false;
        self.faults.clear();
        self.last_event = None;
    }

    /// Resolve `source` and start generating a preview of `root`.
    ///
    /// Failures that prevent the run from starting are returned and also
    /// left as a warning notification.
    pub fn generate_preview(
        &mut self,
        source: &ScriptSource,
        root: &Path,
        recursive: bool,
    ) -> Result<RunRequest, SessionError> {
        if self.is_busy() {
            return Ok(RunRequest::Ignored);
        }
        let result = match source.resolve() {
            Ok(script) => self
                .engine
                .generate_preview(&script, root, recursive)
                .map_err(SessionError::from),
            Err(err) => Err(err.into()),
        };

        match result {
            Ok(RunRequest::Started) => {
                info!("Generating preview of {} with {}", root.display(), source.describe());
                self.reset_run();
                self.has_root_node = false;
                self.phase = SessionPhase::GeneratingPreview;
                self.selected_current.clear();
                self.selected_preview.clear();
                self.current_view.invalidate();
                self.preview_view.invalidate();
                self.notify(NotificationKind::Progress, "Generating preview ...");
                Ok(RunRequest::Started)
            }
            Ok(RunRequest::Ignored) => Ok(RunRequest::Ignored),
            Err(err) => {
                self.notify(NotificationKind::Warning, render::start_failure_text(&err));
                Err(err)
            }
        }
    }

    /// Start applying the current preview.
    pub fn apply_changings(&mut self) -> Result<RunRequest, SessionError> {
        match self.engine.apply_changings() {
            Ok(RunRequest::Started) => {
                self.reset_run();
                self.phase = SessionPhase::ApplyingChangings;
                self.notify(NotificationKind::Progress, "Applying changings ...");
                Ok(RunRequest::Started)
            }
            Ok(RunRequest::Ignored) => Ok(RunRequest::Ignored),
            Err(err) => {
                let err = SessionError::from(err);
                self.notify(NotificationKind::Warning, render::start_failure_text(&err));
                Err(err)
            }
        }
    }

    /// Abort the running job, if any.
    pub fn abort(&self) {
        self.engine.abort();
    }

    pub fn clear_preview(&mut self) -> Result<(), SessionError> {
        self.engine.clear_preview()?;
        self.preview_view.invalidate();
        self.selected_preview.clear();
        self.has_root_node = false;
        self.phase = SessionPhase::Idle;
        Ok(())
    }

    /// Process pending engine events. Called once per tick.
    ///
    /// Returns `true` if anything changed.
    pub fn process_engine_events(&mut self) -> bool {
        let mut changed = false;
        for _ in 0..MAX_EVENTS_PER_TICK {
            let Some(event) = self.engine.try_next_event() else {
                break;
            };
            changed = true;
            if self.handle_event(event) {
                break;
            }
        }
        changed
    }

    /// Block until the running job finishes, calling `on_tick` after every
    /// batch of events. Returns immediately when nothing is running.
    pub fn wait_for_completion(&mut self, tick: Duration, mut on_tick: impl FnMut(&Session)) {
        while self.is_busy() {
            if let Some(event) = self.engine.next_event_timeout(tick) {
                if !self.handle_event(event) {
                    self.process_engine_events();
                }
            }
            on_tick(self);
        }
    }

    /// Returns `true` for a terminal event.
    fn handle_event(&mut self, event: EngineEvent) -> bool {
        match &event {
            EngineEvent::Progress {
                items_processed,
                errors_occurred,
            } => {
                self.items_processed = *items_processed;
                self.errors_occurred = *errors_occurred;
                self.notify(
                    NotificationKind::Progress,
                    render::progress_text(*items_processed, *errors_occurred),
                );
                return false;
            }
            EngineEvent::ItemFailed(fault) => {
                debug!("Item failed: {fault}");
                return false;
            }
            EngineEvent::PreviewReady {
                has_root_node,
                aborted,
                items_processed,
                items_skipped,
                errors_occurred,
            } => {
                self.items_processed = *items_processed;
                self.items_skipped = *items_skipped;
                self.errors_occurred = *errors_occurred;
                self.was_aborted = *aborted;
                self.has_root_node = *has_root_node;
                self.phase = if *has_root_node {
                    SessionPhase::PreviewReady
                } else {
                    SessionPhase::Idle
                };
            }
            EngineEvent::ChangingsApplied {
                items_processed,
                aborted,
                errors_occurred,
            } => {
                self.items_processed = *items_processed;
                self.errors_occurred = *errors_occurred;
                self.was_aborted = *aborted;
                self.phase = SessionPhase::ChangingsApplied;
            }
        }
        self.finish_run(&event);
        true
    }

    /// Take over the results of a finished run.
    fn finish_run(&mut self, event: &EngineEvent) {
        self.faults = self.engine.faults().iter().take(MAX_FAULTS).cloned().collect();
        if let Some(tree) = self.engine.current_tree() {
            self.current_view.sync(tree);
        }
        match self.engine.preview_tree() {
            Some(tree) => self.preview_view.sync(tree),
            None => self.preview_view.invalidate(),
        }
        let nothing_found = self.phase == SessionPhase::Idle;
        let kind = if self.was_aborted || self.errors_occurred > 0 || nothing_found {
            NotificationKind::Warning
        } else {
            NotificationKind::Information
        };
        self.notify(kind, render::summary_text(event));
        self.last_event = Some(event.clone());
    }

    // ── Selection ──────────────────────────────────────

    /// Select rows of the current view and mirror the selection into the
    /// preview view.
    pub fn select_current(&mut self, rows: &[ModelIndex]) {
        self.selected_current = rows.to_vec();
        self.selected_preview = self.mirror_selection(rows, TreeSide::Preview);
    }

    /// Select rows of the preview view and mirror the selection into the
    /// current view.
    pub fn select_preview(&mut self, rows: &[ModelIndex]) {
        self.selected_preview = rows.to_vec();
        self.selected_current = self.mirror_selection(rows, TreeSide::Current);
    }

    /// Map view rows on one side to the visible rows of their counterparts.
    ///
    /// A node without a counterpart falls back to the node at the same
    /// relative path on the other side (a directory that was left alone
    /// appears in both trees under the same path).
    fn mirror_selection(&self, rows: &[ModelIndex], target: TreeSide) -> Vec<ModelIndex> {
        let Some(workspace) = self.engine.workspace() else {
            return Vec::new();
        };
        let (Some(source_tree), Some(target_tree)) =
            (workspace.tree(target.other()), workspace.tree(target))
        else {
            return Vec::new();
        };
        let (source_view, target_view) = match target {
            TreeSide::Preview => (&self.current_view, &self.preview_view),
            TreeSide::Current => (&self.preview_view, &self.current_view),
        };

        rows.iter()
            .filter_map(|&row| {
                let source = source_view.map_to_source(row, source_tree).item;
                let other = workspace
                    .counterpart(source, target)
                    .or_else(|| same_path(source_tree, source, target_tree))?;
                target_view.map_from_source(other)
            })
            .collect()
    }
}

/// Node of `target` at the same relative path as `index` in `source`.
fn same_path(source: &ItemTree, index: ItemIndex, target: &ItemTree) -> Option<ItemIndex> {
    let relative = source.relative_path(index);
    let mut cursor = target.root()?;
    for segment in relative.iter() {
        cursor = target.find_child(cursor, &segment.to_string_lossy())?;
    }
    Some(cursor)
}
