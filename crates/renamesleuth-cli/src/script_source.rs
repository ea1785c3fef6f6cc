/// Where the renaming script comes from: typed inline, read from a file, or
/// the example script shipped with the tool.
///
/// Resolution happens before the engine is involved so an unreadable file
/// or an empty script is reported up front.
use std::path::PathBuf;
use thiserror::Error;

/// The example script shipped with the tool.
pub const EXAMPLE_SCRIPT: &str = include_str!("../scripts/example.rhai");

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptSource {
    Inline(String),
    File(PathBuf),
    Example,
}

#[derive(Error, Debug)]
pub enum ScriptSourceError {
    #[error("the script is empty")]
    Empty,

    #[error("unable to open script file {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ScriptSource {
    /// Inline text if given, else the file, else the example script.
    pub fn from_args(inline: Option<String>, file: Option<PathBuf>) -> Self {
        match (inline, file) {
            (Some(text), _) => ScriptSource::Inline(text),
            (None, Some(path)) => ScriptSource::File(path),
            (None, None) => ScriptSource::Example,
        }
    }

    /// Load the script text.
    pub fn resolve(&self) -> Result<String, ScriptSourceError> {
        let text = match self {
            ScriptSource::Inline(text) => text.clone(),
            ScriptSource::File(path) => {
                std::fs::read_to_string(path).map_err(|source| ScriptSourceError::Unreadable {
                    path: path.clone(),
                    source,
                })?
            }
            ScriptSource::Example => EXAMPLE_SCRIPT.to_string(),
        };
        if text.trim().is_empty() {
            return Err(ScriptSourceError::Empty);
        }
        Ok(text)
    }

    pub fn describe(&self) -> String {
        match self {
            ScriptSource::Inline(_) => "inline script".to_string(),
            ScriptSource::File(path) => path.display().to_string(),
            ScriptSource::Example => "example script".to_string(),
        }
    }
}
