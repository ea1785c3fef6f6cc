/// RenameSleuth CLI — terminal frontend.
///
/// This crate contains all presentation code. Business logic lives in
/// `renamesleuth-core`.
pub mod render;
pub mod script_source;
pub mod session;

pub use script_source::ScriptSource;
pub use session::{Session, SessionError, SessionPhase};
