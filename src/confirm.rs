//! Submission gate: ask before anything is written back.

use std::io::{BufRead, Write};

use tracing::debug;

pub const PROMPT: &str = "Submit updated text? [y/N]: ";

/// Prompt on `out` and read one line from `input`.
///
/// Only an exact `y` confirms. Anything else, including a failed read, declines.
pub fn confirm(input: &mut impl BufRead, out: &mut impl Write) -> bool {
    if let Err(e) = write!(out, "{PROMPT}").and_then(|()| out.flush()) {
        debug!(error = %e, "could not show prompt");
        return false;
    }

    let mut line = String::new();
    match input.read_line(&mut line) {
        Ok(_) => line.trim_end_matches(['\r', '\n']) == "y",
        Err(e) => {
            debug!(error = %e, "could not read confirmation");
            false
        }
    }
}
