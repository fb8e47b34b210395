//! The end-to-end run: resolve, fetch, edit, confirm, submit.
//!
//! Every step is blocking and strictly sequential. Failures before editing
//! end the run with an [`Error`]. Once the user has edited text, the run always
//! ends in a [`SubmissionOutcome`], and text that was not submitted is printed
//! so it is never lost.

use std::io::{self, BufRead, Write};

use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::config::ConfigError;
use crate::confirm::confirm;
use crate::edit::{EditError, Editor};
use crate::target::{self, Reference, ResolveError, ResolvedTarget, TargetKind};
use crate::tracker::{NetworkError, Tracker};

/// Shown above text that was edited but not submitted.
pub const DISCARDED: &str = "The text was not submitted. This new text is discarded:";

/// Exit status for configuration and invocation errors.
pub const EXIT_CONFIG: i32 = 1;

/// Exit status for failures while running.
pub const EXIT_RUNTIME: i32 = 2;

/// Any error that ends a run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Fatal error: {0}")]
    Config(#[from] ConfigError),

    #[error("Could not understand given argument: {0}")]
    Resolve(#[from] ResolveError),

    #[error("Could not retrieve text: {0}")]
    Fetch(#[source] NetworkError),

    #[error("Could not get edited text: {0}")]
    Edit(#[from] EditError),

    #[error("Could not submit text: {0}")]
    Submit(#[source] NetworkError),
}

impl Error {
    /// The process exit status for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Resolve(ResolveError::MissingBaseUrl { .. }) => EXIT_CONFIG,
            _ => EXIT_RUNTIME,
        }
    }
}

/// How a run ended once the user had edited text.
#[derive(Debug)]
pub struct SubmissionOutcome {
    pub submitted: bool,
    pub text: String,
    pub error: Option<NetworkError>,
}

impl SubmissionOutcome {
    /// A declined submission is a successful run; a failed one is an error.
    pub fn into_result(self) -> Result<(), Error> {
        match self.error {
            Some(e) => Err(Error::Submit(e)),
            None => Ok(()),
        }
    }
}

/// The pieces a run needs, wired up once at startup.
pub struct Workflow<'a, T, E> {
    tracker: &'a T,
    editor: &'a E,
    /// Extra fields merged into a newly created comment.
    extra_fields: &'a Map<String, Value>,
}

impl<'a, T: Tracker, E: Editor> Workflow<'a, T, E> {
    pub fn new(tracker: &'a T, editor: &'a E, extra_fields: &'a Map<String, Value>) -> Self {
        Self {
            tracker,
            editor,
            extra_fields,
        }
    }

    /// Run the whole workflow for one reference.
    ///
    /// The prompt and any unsubmitted text go to `out`; the answer is read from `input`.
    pub fn run(
        &self,
        reference: &Reference,
        base_url: Option<&str>,
        input: &mut impl BufRead,
        out: &mut impl Write,
    ) -> Result<SubmissionOutcome, Error> {
        let target = target::resolve(reference, base_url, self.tracker)?;
        let original = self.fetch(&target).map_err(Error::Fetch)?;
        let text = self.editor.edit(&original)?;

        let outcome = if confirm(input, out) {
            match self.submit(&target, &text) {
                Ok(()) => {
                    info!(issue = %target.issue, endpoint = %target.endpoint, "submitted text");
                    SubmissionOutcome {
                        submitted: true,
                        text,
                        error: None,
                    }
                }
                Err(e) => SubmissionOutcome {
                    submitted: false,
                    text,
                    error: Some(e),
                },
            }
        } else {
            info!("submission declined");
            SubmissionOutcome {
                submitted: false,
                text,
                error: None,
            }
        };

        if !outcome.submitted {
            show_unsubmitted(&outcome.text, out, &mut io::stderr());
        }

        Ok(outcome)
    }

    fn fetch(&self, target: &ResolvedTarget) -> Result<String, NetworkError> {
        match target.kind {
            TargetKind::Issue => self.tracker.fetch_issue_text(&target.endpoint),
            TargetKind::Comment => self.tracker.fetch_comment_text(&target.endpoint),
            TargetKind::NewComment => Ok(String::new()),
        }
    }

    fn submit(&self, target: &ResolvedTarget, text: &str) -> Result<(), NetworkError> {
        match target.kind {
            TargetKind::Issue => self.tracker.update_issue_text(&target.endpoint, text),
            TargetKind::Comment => self.tracker.update_comment_text(&target.endpoint, text),
            TargetKind::NewComment => {
                self.tracker
                    .create_comment(&target.endpoint, text, self.extra_fields)
            }
        }
    }
}

/// Print text that was not submitted to `out`, or to `fallback` if `out` is unusable.
fn show_unsubmitted(text: &str, out: &mut impl Write, fallback: &mut impl Write) {
    let shown = writeln!(out, "\n{DISCARDED}\n{text}").and_then(|()| out.flush());
    if let Err(e) = shown {
        warn!(error = %e, "could not print unsubmitted text to stdout");
        let _ = writeln!(fallback, "\n{DISCARDED}\n{text}").and_then(|()| fallback.flush());
    }
}
