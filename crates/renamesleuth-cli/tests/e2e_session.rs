/// End-to-end tests for `Session` — the frontend state machine.
///
/// These tests exercise the real session paths (script resolution, event
/// pumping, view sync, selection mirroring) without any terminal I/O,
/// keeping them fast and deterministic. The real engine and Rhai evaluator
/// are used so no mocking is needed.
use renamesleuth_cli::render;
use renamesleuth_cli::session::NotificationKind;
use renamesleuth_cli::{ScriptSource, Session, SessionError, SessionPhase};
use renamesleuth_core::config::Settings;
use renamesleuth_core::engine::{EngineError, RunRequest};
use renamesleuth_core::model::TreeSide;
use std::fs;
use std::time::{Duration, Instant};
use tempfile::TempDir;

// ── Helpers ───────────────────────────────────────────────────────────────────

/// ```text
/// root/
///   a.txt
///   a.txt.bak
///   notes/
///     b.md
/// ```
fn make_temp_tree() -> TempDir {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("a.txt"), "a").unwrap();
    fs::write(tmp.path().join("a.txt.bak"), "backup").unwrap();
    fs::create_dir_all(tmp.path().join("notes")).unwrap();
    fs::write(tmp.path().join("notes").join("b.md"), "b").unwrap();
    tmp
}

fn inline(script: &str) -> ScriptSource {
    ScriptSource::Inline(script.to_string())
}

/// Pump `process_engine_events()` until the engine is idle or the deadline
/// expires.
fn pump_until_done(session: &mut Session) {
    let deadline = Instant::now() + Duration::from_secs(30);
    while session.is_busy() {
        assert!(
            Instant::now() < deadline,
            "run did not complete within 30 seconds"
        );
        session.process_engine_events();
        std::thread::sleep(Duration::from_millis(10));
    }
    session.process_engine_events();
}

fn preview(session: &mut Session, script: &str, tmp: &TempDir) {
    let request = session
        .generate_preview(&inline(script), tmp.path(), true)
        .unwrap();
    assert_eq!(request, RunRequest::Started);
    pump_until_done(session);
}

// ── Preview lifecycle ──────────────────────────────────────────────────────────

/// Starting a preview switches the phase and posts a progress notification.
#[test]
fn generate_preview_sets_generating_phase() {
    let tmp = make_temp_tree();
    let mut session = Session::new(Settings::default());
    let _ = session
        .generate_preview(&inline("name.to_upper()"), tmp.path(), true)
        .unwrap();
    assert_eq!(session.phase, SessionPhase::GeneratingPreview);
    assert_eq!(
        session.notification.as_ref().map(|n| n.kind),
        Some(NotificationKind::Progress)
    );
    pump_until_done(&mut session);
    assert_eq!(session.phase, SessionPhase::PreviewReady);
}

/// A finished preview syncs both views and reports a summary.
#[test]
fn preview_results_populate_views() {
    let tmp = make_temp_tree();
    let mut session = Session::new(Settings::default());
    preview(&mut session, "name.to_upper()", &tmp);

    assert_eq!(session.items_processed, 4);
    assert_eq!(session.errors_occurred, 0);
    assert!(session.has_root_node);
    let note = session.notification.clone().unwrap();
    assert_eq!(note.kind, NotificationKind::Information);
    assert!(note.text.starts_with("Preview has been generated."));
    assert!(session.last_event.as_ref().is_some_and(|e| e.is_terminal()));

    let current = session.engine.current_tree().unwrap();
    assert!(!session.current_view.is_stale(current));
    let preview_tree = session.engine.preview_tree().unwrap();
    assert!(!session.preview_view.is_stale(preview_tree));

    // Backup files are hidden from the current view by default.
    let root = current.root().unwrap();
    let backup = current.find_child(root, "a.txt.bak").unwrap();
    assert!(!session.current_view.is_visible(backup));
    assert!(session.current_view.is_visible(current.find_child(root, "a.txt").unwrap()));
    let text = render::tree_text(current, &session.current_view);
    assert!(text.contains("a.txt"));
    assert!(!text.contains("a.txt.bak"));
    // Directories sort before files.
    let notes = text.find("notes/").unwrap();
    let a = text.find("a.txt").unwrap();
    assert!(notes < a, "{text}");
}

/// Script errors are counted and listed as faults.
#[test]
fn preview_errors_are_collected() {
    let tmp = make_temp_tree();
    let mut session = Session::new(Settings::default());
    preview(
        &mut session,
        r#"if extension == "md" { throw "no markdown"; } name"#,
        &tmp,
    );
    assert_eq!(session.errors_occurred, 1);
    assert_eq!(session.faults.len(), 1);
    let note = session.notification.clone().unwrap();
    assert_eq!(note.kind, NotificationKind::Warning);
    assert!(note.text.ends_with("1 error(s) occurred."), "{}", note.text);
}

/// Skipping everything means nothing to show.
#[test]
fn preview_with_nothing_to_rename() {
    let tmp = make_temp_tree();
    let mut session = Session::new(Settings::default());
    preview(&mut session, "()", &tmp);
    assert_eq!(session.phase, SessionPhase::Idle);
    assert!(!session.has_root_node);
    assert_eq!(
        session.notification.clone().unwrap().text,
        "No files or directories would be renamed."
    );
}

/// An empty directory is reported as having nothing in it.
#[test]
fn preview_of_empty_directory() {
    let tmp = TempDir::new().unwrap();
    let mut session = Session::new(Settings::default());
    preview(&mut session, "name", &tmp);
    assert!(!session.has_root_node);
    assert_eq!(session.items_processed, 0);
    assert_eq!(
        session.notification.clone().unwrap().text,
        "No files and directories have been found."
    );
}

// ── Start failures ─────────────────────────────────────────────────────────────

/// Invalid syntax produces the validation notification and no run.
#[test]
fn invalid_script_is_reported() {
    let tmp = make_temp_tree();
    let mut session = Session::new(Settings::default());
    let err = session
        .generate_preview(&inline("let x = ;"), tmp.path(), true)
        .unwrap_err();
    assert!(matches!(err, SessionError::Engine(EngineError::Validation(_))));
    assert_eq!(session.phase, SessionPhase::Idle);
    let note = session.notification.clone().unwrap();
    assert_eq!(note.kind, NotificationKind::Warning);
    assert!(note.text.starts_with("The script is not valid.\nError in line 1 and column"));
}

/// Empty scripts and unreadable script files never reach the engine.
#[test]
fn script_source_failures_are_reported() {
    let tmp = make_temp_tree();
    let mut session = Session::new(Settings::default());

    let err = session
        .generate_preview(&inline("  "), tmp.path(), true)
        .unwrap_err();
    assert!(matches!(err, SessionError::Script(_)));
    assert_eq!(session.notification.clone().unwrap().text, "The script is empty.");

    let missing = ScriptSource::File(tmp.path().join("missing.rhai"));
    let err = session.generate_preview(&missing, tmp.path(), true).unwrap_err();
    assert!(err.to_string().contains("unable to open script file"));
}

/// A missing directory is reported the same way.
#[test]
fn missing_directory_is_reported() {
    let tmp = make_temp_tree();
    let mut session = Session::new(Settings::default());
    let _ = session.generate_preview(&inline("name"), &tmp.path().join("gone"), true);
    assert_eq!(
        session.notification.clone().unwrap().text,
        "The selected directory doesn't exist."
    );
}

// ── Selection ──────────────────────────────────────────────────────────────────

/// Selecting a renamed item selects its counterpart, and vice versa.
#[test]
fn selection_is_mirrored_through_counterparts() {
    let tmp = make_temp_tree();
    let mut session = Session::new(Settings::default());
    preview(&mut session, "name.to_upper()", &tmp);

    let current = session.engine.current_tree().unwrap();
    let root = current.root().unwrap();
    let a = current.find_child(root, "a.txt").unwrap();
    let a_row = session.current_view.map_from_source(a).unwrap();

    session.select_current(&[a_row]);
    assert_eq!(session.selected_preview.len(), 1);
    let preview_tree = session.engine.preview_tree().unwrap();
    let selected = session.selected_preview[0].item;
    assert_eq!(preview_tree.node(selected).name, "A.TXT");

    let preview_row = session.selected_preview[0];
    session.select_preview(&[preview_row]);
    assert_eq!(session.selected_current.len(), 1);
    assert_eq!(session.selected_current[0].item, a);
}

/// An item without a counterpart falls back to the node at the same path.
#[test]
fn selection_falls_back_to_same_path() {
    let tmp = make_temp_tree();
    let mut session = Session::new(Settings::default());
    // Directories are left alone, so `notes` only appears mirrored.
    preview(&mut session, "if is_dir { () } else { name.to_upper() }", &tmp);

    let current = session.engine.current_tree().unwrap();
    let root = current.root().unwrap();
    let notes = current.find_child(root, "notes").unwrap();
    assert!(session.engine.counterpart(notes, TreeSide::Preview).is_none());

    let row = session.current_view.map_from_source(notes).unwrap();
    session.select_current(&[row]);
    assert_eq!(session.selected_preview.len(), 1);
    let preview_tree = session.engine.preview_tree().unwrap();
    assert_eq!(preview_tree.node(session.selected_preview[0].item).name, "notes");
}

/// Nothing is selected on the other side before a preview exists.
#[test]
fn selection_without_preview_is_empty() {
    let mut session = Session::new(Settings::default());
    session.select_current(&[]);
    assert!(session.selected_preview.is_empty());
}

// ── Apply ──────────────────────────────────────────────────────────────────────

/// Applying renames on disk and moves the phase on.
#[test]
fn apply_changings_renames_on_disk() {
    let tmp = make_temp_tree();
    let mut session = Session::new(Settings::default());
    preview(&mut session, r#"if name == "a.txt" { "renamed.txt" } else { () }"#, &tmp);

    let changes = render::changes(session.engine.workspace().unwrap());
    assert_eq!(changes.len(), 1);
    assert!(changes[0].to.ends_with("/renamed.txt"));

    assert_eq!(session.apply_changings().unwrap(), RunRequest::Started);
    assert_eq!(session.phase, SessionPhase::ApplyingChangings);
    pump_until_done(&mut session);

    assert_eq!(session.phase, SessionPhase::ChangingsApplied);
    assert_eq!(session.errors_occurred, 0);
    assert!(tmp.path().join("renamed.txt").exists());
    assert!(!tmp.path().join("a.txt").exists());
    assert!(tmp.path().join("a.txt.bak").exists());
    assert!(session
        .notification
        .clone()
        .unwrap()
        .text
        .starts_with("Changings applied."));

    // The same preview cannot be applied again.
    assert!(matches!(
        session.apply_changings(),
        Err(SessionError::Engine(EngineError::PreviewAlreadyApplied))
    ));
}

/// Clearing the preview drops the preview view and selection.
#[test]
fn clear_preview_resets_phase() {
    let tmp = make_temp_tree();
    let mut session = Session::new(Settings::default());
    preview(&mut session, "name.to_upper()", &tmp);
    session.clear_preview().unwrap();
    assert_eq!(session.phase, SessionPhase::Idle);
    assert!(session.engine.preview_tree().is_none());
    assert!(session.selected_preview.is_empty());
}

/// The example script renames files to lower-case snake_case.
#[test]
fn example_script_renames_files() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("My Song.MP3"), "x").unwrap();
    let mut session = Session::new(Settings::default());
    let _ = session
        .generate_preview(&ScriptSource::Example, tmp.path(), true)
        .unwrap();
    pump_until_done(&mut session);

    let changes = render::changes(session.engine.workspace().unwrap());
    assert_eq!(changes.len(), 1);
    assert!(changes[0].to.ends_with("/my_song.mp3"), "{:?}", changes);
}
