//! Edit session: stage text in a scratch file and hand it to the user's editor.
//!
//! The scratch file is removed when the session ends, whichever way it ends.

use std::{
    fs, io,
    io::Write,
    process::{Command, Stdio},
};

use tracing::debug;

use crate::config::EditorCommand;

/// Errors from an edit session.
#[derive(Debug, thiserror::Error)]
pub enum EditError {
    #[error("failed to prepare scratch file: {0}")]
    Scratch(#[source] io::Error),

    #[error("failed to run {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} exited with status {code}")]
    EditorFailed { program: String, code: i32 },

    #[error("failed to read back scratch file: {0}")]
    ReadBack(#[source] io::Error),
}

/// Something that lets the user rewrite a piece of text.
pub trait Editor {
    /// Return the edited text, trimmed of leading and trailing whitespace.
    fn edit(&self, text: &str) -> Result<String, EditError>;
}

/// The user's external editor program.
pub struct ExternalEditor {
    command: EditorCommand,
}

impl ExternalEditor {
    pub fn new(command: EditorCommand) -> Self {
        Self { command }
    }
}

impl Editor for ExternalEditor {
    fn edit(&self, text: &str) -> Result<String, EditError> {
        let mut scratch = tempfile::Builder::new()
            .prefix("jirae-")
            .suffix(".txt")
            .tempfile()
            .map_err(EditError::Scratch)?;
        scratch
            .write_all(text.as_bytes())
            .and_then(|()| scratch.flush())
            .map_err(EditError::Scratch)?;

        // Close our handle so the editor may replace the file; the path is deleted on drop.
        let path = scratch.into_temp_path();
        debug!(program = %self.command.program, path = %path.display(), "opening editor");

        let status = Command::new(&self.command.program)
            .args(&self.command.args)
            .arg(&*path)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|source| EditError::Launch {
                program: self.command.program.clone(),
                source,
            })?;

        if !status.success() {
            return Err(EditError::EditorFailed {
                program: self.command.program.clone(),
                code: status.code().unwrap_or(-1),
            });
        }

        // Invalid UTF-8 is replaced, not rejected: the edit must survive.
        let edited = fs::read(&path).map_err(EditError::ReadBack)?;
        Ok(String::from_utf8_lossy(&edited).trim().to_string())
    }
}
