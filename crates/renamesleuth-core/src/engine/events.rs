/// Run events — lightweight messages sent from the worker thread to
/// whoever owns the engine, via a crossbeam channel.
///
/// Progress and per-item failures are advisory and may be dropped when the
/// channel is full. The terminal message of a run is always delivered.
use super::workspace::Workspace;
use crossbeam_channel::Sender;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Send a progress update every this many processed items.
const PROGRESS_EVERY: u64 = 16;

/// What went wrong with a single item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// Unreadable directory, vanished file, permission denied.
    Io,
    /// The script raised an error for this item.
    Script,
    /// The target path is already taken.
    Collision,
    /// The script produced a path that cannot be used (absolute, `..`, ...).
    InvalidTarget,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FaultKind::Io => "i/o error",
            FaultKind::Script => "script error",
            FaultKind::Collision => "collision",
            FaultKind::InvalidTarget => "invalid target",
        })
    }
}

/// A recoverable failure attached to one item. Counted, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFault {
    pub path: PathBuf,
    pub kind: FaultKind,
    pub message: String,
}

impl ItemFault {
    pub fn new(path: impl Into<PathBuf>, kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for ItemFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.path.display(), self.message, self.kind)
    }
}

/// Events delivered to the engine owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    /// Periodic update with running totals.
    Progress {
        items_processed: u64,
        errors_occurred: u64,
    },
    /// A non-fatal per-item failure.
    ItemFailed(ItemFault),
    /// Preview generation finished (completely or aborted).
    PreviewReady {
        has_root_node: bool,
        aborted: bool,
        items_processed: u64,
        items_skipped: u64,
        errors_occurred: u64,
    },
    /// Applying finished (completely or aborted).
    ChangingsApplied {
        items_processed: u64,
        aborted: bool,
        errors_occurred: u64,
    },
}

impl EngineEvent {
    /// `true` for the last event of a run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EngineEvent::PreviewReady { .. } | EngineEvent::ChangingsApplied { .. }
        )
    }
}

/// Messages on the worker → engine channel.
pub(crate) enum WorkerMessage {
    Event(EngineEvent),
    /// Terminal message: hands the workspace back to the engine owner.
    Finished {
        event: EngineEvent,
        workspace: Box<Workspace>,
        aborted: bool,
    },
}

/// Counters and fault log of one run, plus the sending half of the channel.
pub(crate) struct Reporter {
    tx: Sender<WorkerMessage>,
    pub items_processed: u64,
    pub errors_occurred: u64,
    faults: Vec<ItemFault>,
}

impl Reporter {
    pub fn new(tx: Sender<WorkerMessage>) -> Self {
        Self {
            tx,
            items_processed: 0,
            errors_occurred: 0,
            faults: Vec::new(),
        }
    }

    /// Count one processed item, reporting progress periodically.
    pub fn item_done(&mut self) {
        self.items_processed += 1;
        if self.items_processed.is_multiple_of(PROGRESS_EVERY) {
            self.progress();
        }
    }

    pub fn progress(&self) {
        let _ = self.tx.try_send(WorkerMessage::Event(EngineEvent::Progress {
            items_processed: self.items_processed,
            errors_occurred: self.errors_occurred,
        }));
    }

    pub fn fault(&mut self, fault: ItemFault) {
        warn!("{fault}");
        self.errors_occurred += 1;
        let _ = self
            .tx
            .try_send(WorkerMessage::Event(EngineEvent::ItemFailed(fault.clone())));
        self.faults.push(fault);
    }

    pub fn take_faults(&mut self) -> Vec<ItemFault> {
        std::mem::take(&mut self.faults)
    }

    /// Deliver the terminal event together with the workspace.
    ///
    /// Blocks until there is room in the channel so the completion is never
    /// lost; only a dropped receiver makes it a no-op.
    pub fn finish(self, event: EngineEvent, workspace: Workspace, aborted: bool) {
        self.progress();
        let sent = self.tx.send(WorkerMessage::Finished {
            event,
            workspace: Box::new(workspace),
            aborted,
        });
        if sent.is_err() {
            debug!("Engine dropped before the run finished; result discarded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_events() {
        assert!(!EngineEvent::Progress {
            items_processed: 1,
            errors_occurred: 0
        }
        .is_terminal());
        assert!(EngineEvent::ChangingsApplied {
            items_processed: 1,
            aborted: true,
            errors_occurred: 0
        }
        .is_terminal());
    }

    #[test]
    fn test_fault_display() {
        let fault = ItemFault::new("/tmp/a.txt", FaultKind::Collision, "target exists");
        assert_eq!(fault.to_string(), "/tmp/a.txt: target exists (collision)");
    }

    #[test]
    fn test_event_serialises_with_tag() {
        let json = serde_json::to_value(EngineEvent::Progress {
            items_processed: 3,
            errors_occurred: 1,
        })
        .unwrap();
        assert_eq!(json["event"], "progress");
        assert_eq!(json["items_processed"], 3);
    }

    #[test]
    fn test_reporter_progress_is_lossy_but_counts_exactly() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let mut reporter = Reporter::new(tx);
        for _ in 0..(PROGRESS_EVERY * 3) {
            reporter.item_done();
        }
        reporter.fault(ItemFault::new("/x", FaultKind::Io, "gone"));
        assert_eq!(reporter.items_processed, PROGRESS_EVERY * 3);
        assert_eq!(reporter.errors_occurred, 1);
        assert_eq!(reporter.take_faults().len(), 1);
        // Only the first progress update fit in the channel.
        assert_eq!(rx.len(), 1);
    }
}
