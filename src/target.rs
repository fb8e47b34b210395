//! Target resolution: which tracker resource a reference points at.
//!
//! A reference is classified once into a [`Route`], then resolved into a
//! [`ResolvedTarget`] naming the endpoint every later step talks to.
//! Classification is pure. Only the latest-comment route reads from the tracker.
//!
//! Accepted references:
//!
//! - `{base}/browse/{issue}?focusedCommentId={id}`: a comment permalink
//! - `{base}/browse/{issue}`: an issue permalink
//! - `{issue}` plus an optional comment id or `--latest`, with the base from config

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;
use url::{Position, Url};

use crate::tracker::{self, NetworkError, Tracker};

/// Project-scoped issue key, e.g. `PROJ-1`.
static ISSUE_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z][A-Z0-9_]*-[0-9]+$").expect("issue key pattern is valid"));

/// Query parameter carrying the comment id in a comment permalink.
const FOCUSED_COMMENT: &str = "focusedCommentId";

/// Errors from resolving a reference.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("invalid reference '{reference}': {reason}")]
    InvalidReference {
        reference: String,
        reason: &'static str,
    },

    #[error("'{reference}' is a bare issue key; set JIRA_URL or pass --base-url")]
    MissingBaseUrl { reference: String },

    #[error("issue {issue} has no comments")]
    NoCommentsFound { issue: String },

    #[error("could not look up the latest comment: {0}")]
    Lookup(#[from] NetworkError),
}

/// Which comment of an issue to edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommentSelector {
    Id(String),
    Latest,
}

/// The raw user input, as given on the command line.
#[derive(Debug, Clone)]
pub struct Reference {
    /// A permalink or a bare issue key.
    pub target: String,
    pub comment: Option<CommentSelector>,
    /// Create a new comment on the issue instead of editing existing text.
    pub create: bool,
}

/// The shape of a reference, decided once per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    CommentPermalink {
        base: String,
        issue: String,
        comment: String,
    },
    IssuePermalink {
        base: String,
        issue: String,
    },
    IssueAndCommentId {
        base: String,
        issue: String,
        comment: Option<CommentSelector>,
    },
    CreateCommentRequest {
        base: String,
        issue: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    /// An issue description.
    Issue,
    /// An existing comment body.
    Comment,
    /// A comment yet to be created; the endpoint is the issue's comment collection.
    NewComment,
}

/// The resource a run edits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub kind: TargetKind,
    pub endpoint: String,
    /// The issue the resource belongs to.
    pub issue: String,
}

/// Classify and resolve a reference in one step.
pub fn resolve(
    reference: &Reference,
    base_url: Option<&str>,
    client: &impl Tracker,
) -> Result<ResolvedTarget, ResolveError> {
    classify(reference, base_url)?.resolve(client)
}

/// Decide which route a reference takes, without touching the network.
///
/// `base_url` is only consulted for bare issue keys.
pub fn classify(reference: &Reference, base_url: Option<&str>) -> Result<Route, ResolveError> {
    let invalid = |reason| ResolveError::InvalidReference {
        reference: reference.target.clone(),
        reason,
    };

    if reference.create && reference.comment.is_some() {
        return Err(invalid("cannot select an existing comment when creating one"));
    }

    if let Some(CommentSelector::Id(id)) = &reference.comment
        && !is_comment_id(id)
    {
        return Err(ResolveError::InvalidReference {
            reference: id.clone(),
            reason: "comment id must be numeric",
        });
    }

    if reference.target.contains("://") {
        let link = parse_permalink(&reference.target).map_err(invalid)?;
        return route_permalink(link, reference).map_err(invalid);
    }

    if !ISSUE_KEY.is_match(&reference.target) {
        return Err(invalid("expected an issue URL, a comment URL, or an issue key"));
    }

    let base = base_url
        .ok_or_else(|| ResolveError::MissingBaseUrl {
            reference: reference.target.clone(),
        })?
        .to_string();
    let issue = reference.target.clone();

    Ok(if reference.create {
        Route::CreateCommentRequest { base, issue }
    } else {
        Route::IssueAndCommentId {
            base,
            issue,
            comment: reference.comment.clone(),
        }
    })
}

impl Route {
    /// Turn the route into a concrete target.
    ///
    /// Selecting the latest comment fetches the issue's comment collection
    /// and takes its last element in server order.
    pub fn resolve(self, client: &impl Tracker) -> Result<ResolvedTarget, ResolveError> {
        match self {
            Self::CommentPermalink {
                base,
                issue,
                comment,
            }
            | Self::IssueAndCommentId {
                base,
                issue,
                comment: Some(CommentSelector::Id(comment)),
            } => Ok(comment_target(&base, issue, &comment)),

            Self::IssuePermalink { base, issue }
            | Self::IssueAndCommentId {
                base,
                issue,
                comment: None,
            } => Ok(ResolvedTarget {
                kind: TargetKind::Issue,
                endpoint: tracker::issue_endpoint(&base, &issue),
                issue,
            }),

            Self::IssueAndCommentId {
                base,
                issue,
                comment: Some(CommentSelector::Latest),
            } => {
                let comments = client.fetch_comments(&tracker::comments_endpoint(&base, &issue))?;
                let Some(latest) = comments.last() else {
                    return Err(ResolveError::NoCommentsFound { issue });
                };
                debug!(
                    %issue,
                    comment = %latest.id,
                    chars = latest.body.chars().count(),
                    "selected latest comment"
                );
                Ok(comment_target(&base, issue, &latest.id))
            }

            Self::CreateCommentRequest { base, issue } => Ok(ResolvedTarget {
                kind: TargetKind::NewComment,
                endpoint: tracker::comments_endpoint(&base, &issue),
                issue,
            }),
        }
    }
}

fn comment_target(base: &str, issue: String, comment: &str) -> ResolvedTarget {
    ResolvedTarget {
        kind: TargetKind::Comment,
        endpoint: tracker::comment_endpoint(base, &issue, comment),
        issue,
    }
}

/// The parts of a `/browse/` permalink.
struct Permalink {
    base: String,
    issue: String,
    comment: Option<String>,
}

fn parse_permalink(raw: &str) -> Result<Permalink, &'static str> {
    let url = Url::parse(raw).map_err(|_| "not a valid URL")?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err("only http and https URLs are supported");
    }

    let segments: Vec<&str> = url.path_segments().map(Iterator::collect).unwrap_or_default();
    let [prefix @ .., "browse", issue] = segments.as_slice() else {
        return Err("expected a URL ending in /browse/<issue>");
    };
    if issue.is_empty() {
        return Err("missing issue key after /browse/");
    }

    let comment = url
        .query_pairs()
        .find(|(key, _)| key == FOCUSED_COMMENT)
        .map(|(_, value)| value.into_owned());
    if let Some(id) = &comment
        && !is_comment_id(id)
    {
        return Err("focusedCommentId must be numeric");
    }

    // Scheme, host and port, plus any context path in front of /browse.
    let mut base = url[..Position::BeforePath].to_string();
    for segment in prefix {
        base.push('/');
        base.push_str(segment);
    }

    Ok(Permalink {
        base,
        issue: (*issue).to_string(),
        comment,
    })
}

fn route_permalink(link: Permalink, reference: &Reference) -> Result<Route, &'static str> {
    let Permalink {
        base,
        issue,
        comment,
    } = link;

    // A new comment always goes to the parent issue, even from a comment link.
    if reference.create {
        return Ok(Route::CreateCommentRequest { base, issue });
    }

    match (comment, reference.comment.clone()) {
        (Some(_), Some(_)) => Err("a comment URL already selects a comment"),
        (Some(comment), None) => Ok(Route::CommentPermalink {
            base,
            issue,
            comment,
        }),
        (None, None) => Ok(Route::IssuePermalink { base, issue }),
        (None, selector) => Ok(Route::IssueAndCommentId {
            base,
            issue,
            comment: selector,
        }),
    }
}

fn is_comment_id(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit())
}
