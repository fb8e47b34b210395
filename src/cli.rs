//! CLI interface for jirae.
//!
//! One invocation edits one piece of tracker text:
//!
//! - `jirae COMMENT_URL`: edit a comment
//! - `jirae ISSUE_URL`: edit an issue description
//! - `jirae ISSUE [COMMENT_ID | --latest]`: same, by identifiers
//! - `jirae -c [-f JSON] ISSUE`: write a new comment

use std::io;

use clap::Parser;
use serde_json::{Map, Value};

use crate::config::Settings;
use crate::edit::ExternalEditor;
use crate::target::{CommentSelector, Reference};
use crate::tracker::JiraClient;
use crate::workflow::{Error, Workflow};

/// Edit issue descriptions and comments in your $EDITOR.
#[derive(Debug, Parser)]
#[command(name = "jirae", version, after_long_help = ENVIRONMENT_HELP)]
pub struct Cli {
    /// Comment URL, issue URL, or issue key (e.g. `PROJ-1`).
    reference: String,

    /// Id of the comment to edit on the referenced issue.
    #[arg(conflicts_with_all = ["latest", "create_comment"])]
    comment_id: Option<String>,

    /// Edit the most recent comment on the referenced issue.
    #[arg(short, long, conflicts_with = "create_comment")]
    latest: bool,

    /// Create a new comment for the referenced issue.
    #[arg(short = 'c', long)]
    create_comment: bool,

    /// Additional fields to set when creating a comment, as a JSON object.
    /// E.g. `{"visibility": {"type": "role", "value": "Admins"}}`.
    #[arg(short = 'f', long, value_name = "JSON", requires = "create_comment", value_parser = parse_fields)]
    fields: Option<Map<String, Value>>,

    /// Tracker base URL for bare issue keys. Overrides `JIRA_URL`.
    #[arg(long, value_name = "URL")]
    base_url: Option<String>,
}

const ENVIRONMENT_HELP: &str = r"Environment:
  EDITOR              Editor to open the text in (required)
  JIRA_USER           Account to authenticate as (required)
  JIRA_TOKEN          API token for that account (required)
  JIRA_URL            Base URL for bare issue keys, e.g. https://acme.atlassian.net
  JIRAE_TIMEOUT_SECS  Network timeout in seconds (default: none)
  JIRAE_LOG           Log filter, e.g. debug (default: warn)

Defaults for base-url and timeout-secs may be set in ~/.jirae/config.toml.";

impl Cli {
    /// The reference this invocation targets.
    pub fn reference(&self) -> Reference {
        let comment = match (&self.comment_id, self.latest) {
            (Some(id), _) => Some(CommentSelector::Id(id.clone())),
            (None, true) => Some(CommentSelector::Latest),
            (None, false) => None,
        };

        Reference {
            target: self.reference.clone(),
            comment,
            create: self.create_comment,
        }
    }

    /// Extra fields for a created comment, empty unless `-f` was given.
    pub fn fields(&self) -> Map<String, Value> {
        self.fields.clone().unwrap_or_default()
    }
}

/// Parse `--fields` at startup so a bad value fails before anything is edited.
fn parse_fields(raw: &str) -> Result<Map<String, Value>, String> {
    match serde_json::from_str(raw) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(_) => Err("expected a JSON object".to_string()),
        Err(e) => Err(format!("invalid JSON: {e}")),
    }
}

/// Run one edit against the real tracker, editor, and terminal.
pub fn run(cli: &Cli) -> Result<(), Error> {
    let settings = Settings::from_env(cli.base_url.as_deref())?;
    let tracker = JiraClient::new(&settings.credentials, settings.timeout);
    let editor = ExternalEditor::new(settings.editor.clone());
    let fields = cli.fields();
    let workflow = Workflow::new(&tracker, &editor, &fields);

    let mut input = io::stdin().lock();
    let mut out = io::stdout();
    workflow
        .run(
            &cli.reference(),
            settings.base_url.as_deref(),
            &mut input,
            &mut out,
        )?
        .into_result()
}
