/// Renaming engine — runs preview generation and applying on a background
/// worker thread.
///
/// Exactly one run is active at a time. A request made while busy is
/// ignored and the running job stays authoritative. The abort flag is the
/// only state shared with the worker; the trees and the correspondence are
/// moved into the worker for the duration of a run and handed back with the
/// terminal event.
///
/// The owner drives the engine by draining events with
/// [`RenamingEngine::try_next_event`] (once per frame / tick) or by blocking
/// on [`RenamingEngine::next_event`].
pub mod apply;
pub mod events;
pub mod preview;
pub mod workspace;

pub use events::{EngineEvent, FaultKind, ItemFault};
pub use workspace::Workspace;

use crate::model::{ItemIndex, ItemTree, TreeSide};
use crate::script::{RhaiEvaluator, ScriptEvaluator, ScriptSyntaxError};
use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use events::WorkerMessage;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

/// Maximum number of messages that may queue up in the worker channel.
///
/// Progress and per-item failures are dropped when the channel is full; the
/// terminal message waits for room.
pub const PROGRESS_CHANNEL_CAPACITY: usize = 4_096;

/// Engine state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    GeneratingPreview,
    ApplyingChangings,
    /// The last run was aborted. Accepts new runs like `Idle`.
    Aborted,
}

impl RunState {
    pub fn is_busy(self) -> bool {
        matches!(self, RunState::GeneratingPreview | RunState::ApplyingChangings)
    }
}

/// Whether a run request actually started a run.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunRequest {
    Started,
    /// The engine was busy; the running job continues unaffected.
    Ignored,
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("script is empty")]
    EmptyScript,

    #[error("invalid script: {0}")]
    Validation(#[from] ScriptSyntaxError),

    #[error("directory does not exist: {}", .0.display())]
    RootNotFound(PathBuf),

    #[error("there is no preview to apply")]
    NoPreview,

    #[error("the preview has already been applied; generate a new one")]
    PreviewAlreadyApplied,

    #[error("the engine is busy")]
    NotIdle,

    #[error("failed to start worker thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Cloneable handle that requests an abort from any thread.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    flag: Arc<AtomicBool>,
    state: Arc<Mutex<RunState>>,
}

impl AbortHandle {
    /// Ask the active run to stop. No effect when nothing is running.
    pub fn abort(&self) {
        if self.state.lock().is_busy() {
            self.flag.store(true, Ordering::Relaxed);
        }
    }
}

struct ActiveRun {
    rx: Receiver<WorkerMessage>,
    thread: Option<thread::JoinHandle<()>>,
}

pub struct RenamingEngine {
    evaluator: Arc<dyn ScriptEvaluator>,
    abort_flag: Arc<AtomicBool>,
    state: Arc<Mutex<RunState>>,
    /// `None` while a run owns it, or before the first preview.
    workspace: Option<Workspace>,
    active: Option<ActiveRun>,
}

impl Default for RenamingEngine {
    fn default() -> Self {
        Self::with_rhai()
    }
}

impl RenamingEngine {
    /// Engine using a custom evaluator. Abort is observed between items only.
    pub fn new(evaluator: Arc<dyn ScriptEvaluator>) -> Self {
        Self::with_abort_flag(evaluator, Arc::new(AtomicBool::new(false)))
    }

    /// Engine using the Rhai evaluator, which also stops a running script
    /// on abort.
    pub fn with_rhai() -> Self {
        let flag = Arc::new(AtomicBool::new(false));
        let evaluator = Arc::new(RhaiEvaluator::with_abort_flag(flag.clone()));
        Self::with_abort_flag(evaluator, flag)
    }

    fn with_abort_flag(evaluator: Arc<dyn ScriptEvaluator>, abort_flag: Arc<AtomicBool>) -> Self {
        Self {
            evaluator,
            abort_flag,
            state: Arc::new(Mutex::new(RunState::Idle)),
            workspace: None,
            active: None,
        }
    }

    // ── State ───────────────────────────────────────────────────────────────

    pub fn state(&self) -> RunState {
        *self.state.lock()
    }

    pub fn is_busy(&self) -> bool {
        self.state().is_busy()
    }

    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            flag: self.abort_flag.clone(),
            state: self.state.clone(),
        }
    }

    /// Ask the active run to stop. No effect when idle.
    pub fn abort(&self) {
        self.abort_handle().abort();
    }

    /// Validate `script` without running it.
    pub fn check_syntax(&self, script: &str) -> Result<(), ScriptSyntaxError> {
        self.evaluator.check_syntax(script)
    }

    // ── Runs ────────────────────────────────────────────────────────────────

    /// Scan `root` and evaluate `script` for every entry below it.
    ///
    /// Fails fast, leaving the engine idle and the previous workspace intact,
    /// if the script is empty or invalid or `root` is not a directory.
    pub fn generate_preview(
        &mut self,
        script: &str,
        root: &Path,
        recursive: bool,
    ) -> Result<RunRequest, EngineError> {
        if self.is_busy() {
            warn!("Preview requested while a run is active; ignored");
            return Ok(RunRequest::Ignored);
        }
        if script.trim().is_empty() {
            return Err(EngineError::EmptyScript);
        }
        self.evaluator.check_syntax(script)?;
        if !root.is_dir() {
            return Err(EngineError::RootNotFound(root.to_path_buf()));
        }

        let job = preview::PreviewJob {
            script: script.to_string(),
            root_path: root.to_path_buf(),
            recursive,
            evaluator: self.evaluator.clone(),
            abort: self.abort_flag.clone(),
        };
        let previous = self.workspace.take();
        match self.spawn("renamesleuth-preview", RunState::GeneratingPreview, move |tx| {
            preview::run(job, tx)
        }) {
            Ok(()) => Ok(RunRequest::Started),
            Err(err) => {
                self.workspace = previous;
                Err(err)
            }
        }
    }

    /// Perform the renames of the current preview on disk.
    pub fn apply_changings(&mut self) -> Result<RunRequest, EngineError> {
        if self.is_busy() {
            warn!("Apply requested while a run is active; ignored");
            return Ok(RunRequest::Ignored);
        }
        let workspace = match self.workspace.take() {
            Some(ws) if ws.preview.is_some() && !ws.correspondence.is_empty() => ws,
            other => {
                self.workspace = other;
                return Err(EngineError::NoPreview);
            }
        };
        if workspace.applied {
            self.workspace = Some(workspace);
            return Err(EngineError::PreviewAlreadyApplied);
        }

        // The workspace travels through a slot so it can be taken back if
        // the thread never starts.
        let (slot_tx, slot_rx) = crossbeam_channel::bounded::<Workspace>(1);
        let _ = slot_tx.send(workspace);
        let worker_slot = slot_rx.clone();
        let abort = self.abort_flag.clone();
        let started = self.spawn("renamesleuth-apply", RunState::ApplyingChangings, move |tx| {
            if let Ok(workspace) = worker_slot.recv() {
                apply::run(apply::ApplyJob { workspace, abort }, tx);
            }
        });
        match started {
            Ok(()) => Ok(RunRequest::Started),
            Err(err) => {
                self.workspace = slot_rx.try_recv().ok();
                Err(err)
            }
        }
    }

    /// Discard the preview tree and all correspondences.
    pub fn clear_preview(&mut self) -> Result<(), EngineError> {
        if self.is_busy() {
            return Err(EngineError::NotIdle);
        }
        if let Some(ws) = self.workspace.as_mut() {
            ws.clear_preview();
        }
        Ok(())
    }

    fn spawn<F>(&mut self, name: &str, state: RunState, job: F) -> Result<(), EngineError>
    where
        F: FnOnce(crossbeam_channel::Sender<WorkerMessage>) + Send + 'static,
    {
        let (tx, rx) = crossbeam_channel::bounded::<WorkerMessage>(PROGRESS_CHANNEL_CAPACITY);
        self.abort_flag.store(false, Ordering::Relaxed);
        *self.state.lock() = state;

        match thread::Builder::new().name(name.into()).spawn(move || job(tx)) {
            Ok(handle) => {
                info!("Started {name}");
                self.active = Some(ActiveRun {
                    rx,
                    thread: Some(handle),
                });
                Ok(())
            }
            Err(err) => {
                *self.state.lock() = RunState::Idle;
                Err(EngineError::Spawn(err))
            }
        }
    }

    // ── Events ──────────────────────────────────────────────────────────────

    /// Next event of the active run without blocking.
    pub fn try_next_event(&mut self) -> Option<EngineEvent> {
        let received = self.active.as_ref()?.rx.try_recv();
        match received {
            Ok(message) => Some(self.accept(message)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(self.worker_lost()),
        }
    }

    /// Next event of the active run, blocking until one arrives.
    /// Returns `None` when no run is active.
    pub fn next_event(&mut self) -> Option<EngineEvent> {
        let received = self.active.as_ref()?.rx.recv();
        match received {
            Ok(message) => Some(self.accept(message)),
            Err(_) => Some(self.worker_lost()),
        }
    }

    /// Like [`next_event`](Self::next_event) but gives up after `timeout`.
    pub fn next_event_timeout(&mut self, timeout: Duration) -> Option<EngineEvent> {
        let received = self.active.as_ref()?.rx.recv_timeout(timeout);
        match received {
            Ok(message) => Some(self.accept(message)),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(self.worker_lost()),
        }
    }

    /// Block until the active run finishes, passing every event to
    /// `on_event`. Returns the terminal event, or `None` if nothing was
    /// running.
    pub fn wait_for_completion(&mut self, mut on_event: impl FnMut(&EngineEvent)) -> Option<EngineEvent> {
        while let Some(event) = self.next_event() {
            on_event(&event);
            if event.is_terminal() {
                return Some(event);
            }
        }
        None
    }

    fn accept(&mut self, message: WorkerMessage) -> EngineEvent {
        match message {
            WorkerMessage::Event(event) => event,
            WorkerMessage::Finished {
                event,
                workspace,
                aborted,
            } => {
                self.workspace = Some(*workspace);
                self.finish_run(if aborted { RunState::Aborted } else { RunState::Idle });
                event
            }
        }
    }

    /// The worker went away without a terminal message (it panicked).
    fn worker_lost(&mut self) -> EngineEvent {
        let state = self.state();
        error!("Worker thread exited without reporting completion");
        self.finish_run(RunState::Aborted);
        match state {
            RunState::ApplyingChangings => EngineEvent::ChangingsApplied {
                items_processed: 0,
                aborted: true,
                errors_occurred: 1,
            },
            _ => EngineEvent::PreviewReady {
                has_root_node: false,
                aborted: true,
                items_processed: 0,
                items_skipped: 0,
                errors_occurred: 1,
            },
        }
    }

    fn finish_run(&mut self, state: RunState) {
        if let Some(mut run) = self.active.take() {
            if let Some(handle) = run.thread.take() {
                if handle.join().is_err() {
                    error!("Worker thread panicked");
                }
            }
        }
        self.abort_flag.store(false, Ordering::Relaxed);
        *self.state.lock() = state;
    }

    // ── Results ─────────────────────────────────────────────────────────────

    /// Trees and faults of the last finished run. `None` while a run is
    /// active or before the first preview.
    pub fn workspace(&self) -> Option<&Workspace> {
        self.workspace.as_ref()
    }

    pub fn current_tree(&self) -> Option<&ItemTree> {
        self.workspace.as_ref().map(Workspace::current)
    }

    pub fn preview_tree(&self) -> Option<&ItemTree> {
        self.workspace.as_ref().and_then(Workspace::preview)
    }

    /// Counterpart of `index` on the `target` side.
    pub fn counterpart(&self, index: ItemIndex, target: TreeSide) -> Option<ItemIndex> {
        self.workspace.as_ref()?.counterpart(index, target)
    }

    pub fn faults(&self) -> &[ItemFault] {
        self.workspace.as_ref().map(Workspace::faults).unwrap_or(&[])
    }
}

impl Drop for RenamingEngine {
    fn drop(&mut self) {
        if let Some(run) = self.active.as_mut() {
            self.abort_flag.store(true, Ordering::Relaxed);
            // Unblock a worker waiting on a full channel before joining.
            drop(std::mem::replace(&mut run.rx, crossbeam_channel::never()));
            if let Some(handle) = run.thread.take() {
                let _ = handle.join();
            }
        }
    }
}
