/// RenameSleuth Core — scanning, script evaluation, and applying renames.
///
/// This crate contains all business logic with zero UI dependencies.
/// It is designed to be reusable across different frontends (CLI, GUI, TUI).
///
/// # Modules
///
/// - [`model`]: Arena-allocated item trees, correspondence and filtered views.
/// - [`script`]: Sandboxed per-item script evaluation.
/// - [`engine`]: Background preview generation and applying with progress reporting.
/// - [`config`]: Presentation settings loaded from JSON.
pub mod config;
pub mod engine;
pub mod model;
pub mod script;
