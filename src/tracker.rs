//! Remote resource client: read and write issue descriptions and comment bodies.
//!
//! Talks to the tracker's REST API v2 over blocking HTTP. Every request carries
//! HTTP Basic credentials; write requests send JSON bodies. Only the text
//! fields this tool edits are decoded, everything else in a payload is ignored.

#[cfg(test)]
pub mod fake;

use std::time::Duration;

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Deserializer, de::DeserializeOwned};
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::config::Credentials;

/// Errors from talking to the tracker.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// The request never produced an HTTP response (DNS, connect, TLS, I/O).
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    /// The server answered with a non-2xx status.
    #[error("got non-2xx response {status}: {body}")]
    Application { status: u16, body: String },

    /// A 2xx response whose payload could not be decoded.
    #[error("could not decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = core::result::Result<T, NetworkError>;

/// A comment as listed in an issue's comment collection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Comment {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub body: String,
}

/// Operations the workflow needs from an issue tracker.
pub trait Tracker {
    /// Fetch an issue's description.
    fn fetch_issue_text(&self, endpoint: &str) -> Result<String>;

    /// Fetch a single comment's body.
    fn fetch_comment_text(&self, endpoint: &str) -> Result<String>;

    /// List an issue's comments in server order.
    fn fetch_comments(&self, endpoint: &str) -> Result<Vec<Comment>>;

    /// Replace an issue's description.
    fn update_issue_text(&self, endpoint: &str, text: &str) -> Result<()>;

    /// Replace a comment's body.
    fn update_comment_text(&self, endpoint: &str, text: &str) -> Result<()>;

    /// Post a new comment to an issue's comment collection.
    fn create_comment(
        &self,
        endpoint: &str,
        text: &str,
        extra_fields: &Map<String, Value>,
    ) -> Result<()>;
}

// ── Endpoints ──

/// `{base}/rest/api/2/issue/{issue}`
pub fn issue_endpoint(base: &str, issue: &str) -> String {
    format!("{base}/rest/api/2/issue/{issue}")
}

/// `{base}/rest/api/2/issue/{issue}/comment`
pub fn comments_endpoint(base: &str, issue: &str) -> String {
    format!("{}/comment", issue_endpoint(base, issue))
}

/// `{base}/rest/api/2/issue/{issue}/comment/{comment}`
pub fn comment_endpoint(base: &str, issue: &str, comment: &str) -> String {
    format!("{}/{comment}", comments_endpoint(base, issue))
}

// ── Payloads ──

/// Partial issue update: the description nests under `fields`.
pub fn issue_update_payload(text: &str) -> Value {
    json!({ "fields": { "description": text } })
}

/// Comment update: the body sits at top level.
pub fn comment_update_payload(text: &str) -> Value {
    json!({ "body": text })
}

/// New comment: the caller's extra fields with `body` set to `text`.
///
/// `body` always wins over an extra field of the same name. Every other key
/// passes through untouched for the server to validate.
pub fn comment_create_payload(text: &str, extra_fields: &Map<String, Value>) -> Value {
    let mut payload = extra_fields.clone();
    payload.insert("body".to_string(), Value::String(text.to_string()));
    Value::Object(payload)
}

/// Issue JSON shape: only `fields.description` matters.
#[derive(Deserialize)]
struct IssuePayload {
    fields: IssueFields,
}

#[derive(Deserialize)]
struct IssueFields {
    #[serde(default, deserialize_with = "null_as_empty")]
    description: String,
}

/// Single comment JSON shape.
#[derive(Deserialize)]
struct CommentPayload {
    #[serde(default, deserialize_with = "null_as_empty")]
    body: String,
}

/// One page of an issue's comment collection.
#[derive(Deserialize)]
struct CommentPage {
    comments: Vec<Comment>,
    #[serde(default)]
    total: Option<usize>,
}

/// The tracker sends `null` for an empty description or body.
fn null_as_empty<'de, D>(deserializer: D) -> core::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

// ── HTTP client ──

/// Blocking REST client for a Jira-style tracker.
pub struct JiraClient<'a> {
    agent: ureq::Agent,
    credentials: &'a Credentials,
}

impl<'a> JiraClient<'a> {
    /// Create a client that authenticates every request with `credentials`.
    ///
    /// Without a timeout, requests block until the server or the OS gives up.
    pub fn new(credentials: &'a Credentials, timeout: Option<Duration>) -> Self {
        let mut builder = ureq::AgentBuilder::new();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Self {
            agent: builder.build(),
            credentials,
        }
    }

    fn authorization(&self) -> String {
        let pair = format!("{}:{}", self.credentials.user(), self.credentials.token());
        format!("Basic {}", STANDARD.encode(pair))
    }

    fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        debug!(method = "GET", url, "sending request");
        let response = self
            .agent
            .get(url)
            .set("Authorization", &self.authorization())
            .set("Accept", "application/json")
            .call();

        check(url, response)?
            .into_json()
            .map_err(|source| NetworkError::Decode {
                url: url.to_string(),
                source,
            })
    }

    fn send(&self, method: &str, url: &str, payload: &Value) -> Result<()> {
        debug!(method, url, "sending request");
        let response = self
            .agent
            .request(method, url)
            .set("Authorization", &self.authorization())
            .set("Content-Type", "application/json")
            .send_json(payload);

        check(url, response).map(drop)
    }
}

impl Tracker for JiraClient<'_> {
    fn fetch_issue_text(&self, endpoint: &str) -> Result<String> {
        let issue: IssuePayload = self.get(endpoint)?;
        Ok(issue.fields.description)
    }

    fn fetch_comment_text(&self, endpoint: &str) -> Result<String> {
        let comment: CommentPayload = self.get(endpoint)?;
        Ok(comment.body)
    }

    fn fetch_comments(&self, endpoint: &str) -> Result<Vec<Comment>> {
        let mut comments = Vec::new();
        loop {
            let url = if comments.is_empty() {
                endpoint.to_string()
            } else {
                format!("{endpoint}?startAt={}", comments.len())
            };
            let page: CommentPage = self.get(&url)?;
            let fetched = page.comments.len();
            comments.extend(page.comments);

            // Keep paging only while the server reports more than we hold.
            match page.total {
                Some(total) if fetched > 0 && comments.len() < total => {}
                _ => return Ok(comments),
            }
        }
    }

    fn update_issue_text(&self, endpoint: &str, text: &str) -> Result<()> {
        self.send("PUT", endpoint, &issue_update_payload(text))
    }

    fn update_comment_text(&self, endpoint: &str, text: &str) -> Result<()> {
        self.send("PUT", endpoint, &comment_update_payload(text))
    }

    fn create_comment(
        &self,
        endpoint: &str,
        text: &str,
        extra_fields: &Map<String, Value>,
    ) -> Result<()> {
        self.send("POST", endpoint, &comment_create_payload(text, extra_fields))
    }
}

/// Classify a response: any 2xx passes, anything else is an error.
fn check(
    url: &str,
    result: core::result::Result<ureq::Response, ureq::Error>,
) -> Result<ureq::Response> {
    match result {
        Ok(response) if (200..300).contains(&response.status()) => Ok(response),
        Ok(response) | Err(ureq::Error::Status(_, response)) => Err(application_error(response)),
        Err(ureq::Error::Transport(transport)) => Err(NetworkError::Transport {
            url: url.to_string(),
            message: transport.to_string(),
        }),
    }
}

/// Capture status and as much of the body as can be read.
fn application_error(response: ureq::Response) -> NetworkError {
    let status = response.status();
    let body = response
        .into_string()
        .unwrap_or_else(|e| format!("(could not read response body: {e})"));
    NetworkError::Application { status, body }
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::thread::{self, JoinHandle};

    use super::*;

    /// A request as seen by the stub server.
    struct Captured {
        head: String,
        body: String,
    }

    impl Captured {
        fn request_line(&self) -> &str {
            self.head.lines().next().unwrap_or_default()
        }

        fn header(&self, name: &str) -> Option<String> {
            self.head.lines().skip(1).find_map(|line| {
                let (key, value) = line.split_once(':')?;
                key.trim()
                    .eq_ignore_ascii_case(name)
                    .then(|| value.trim().to_string())
            })
        }
    }

    /// Serve one canned response per connection, in order, and hand back the requests.
    fn serve(responses: Vec<(u16, &'static str)>) -> (String, JoinHandle<Vec<Captured>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());

        let handle = thread::spawn(move || {
            let mut captured = Vec::new();
            for (status, body) in responses {
                let (stream, _) = listener.accept().unwrap();
                let mut reader = BufReader::new(stream.try_clone().unwrap());

                let mut head = String::new();
                let mut content_length = 0;
                loop {
                    let mut line = String::new();
                    reader.read_line(&mut line).unwrap();
                    if line == "\r\n" || line.is_empty() {
                        break;
                    }
                    if let Some((key, value)) = line.split_once(':')
                        && key.eq_ignore_ascii_case("content-length")
                    {
                        content_length = value.trim().parse().unwrap();
                    }
                    head.push_str(&line);
                }
                let mut request_body = vec![0; content_length];
                reader.read_exact(&mut request_body).unwrap();

                let mut stream = stream;
                write!(
                    stream,
                    "HTTP/1.1 {status} Stub\r\nContent-Type: application/json\r\n\
                     Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                )
                .unwrap();
                stream.flush().unwrap();

                captured.push(Captured {
                    head,
                    body: String::from_utf8(request_body).unwrap(),
                });
            }
            captured
        });

        (base, handle)
    }

    fn credentials() -> Credentials {
        Credentials::new("alice", "s3cret")
    }

    #[test]
    fn endpoints_follow_rest_layout() {
        let base = "https://acme.atlassian.net";
        assert_eq!(
            issue_endpoint(base, "PROJ-1"),
            "https://acme.atlassian.net/rest/api/2/issue/PROJ-1"
        );
        assert_eq!(
            comments_endpoint(base, "PROJ-1"),
            "https://acme.atlassian.net/rest/api/2/issue/PROJ-1/comment"
        );
        assert_eq!(
            comment_endpoint(base, "PROJ-1", "10042"),
            "https://acme.atlassian.net/rest/api/2/issue/PROJ-1/comment/10042"
        );
    }

    #[test]
    fn create_payload_merges_extra_fields() {
        let extra: Map<String, Value> =
            serde_json::from_str(r#"{"visibility":{"type":"role","value":"Admins"}}"#).unwrap();

        let payload = comment_create_payload("note", &extra);
        assert_eq!(
            payload,
            json!({"visibility": {"type": "role", "value": "Admins"}, "body": "note"})
        );
    }

    #[test]
    fn create_payload_body_wins() {
        let extra: Map<String, Value> =
            serde_json::from_str(r#"{"body":"stale","id":"7"}"#).unwrap();

        let payload = comment_create_payload("fresh", &extra);
        assert_eq!(payload, json!({"body": "fresh", "id": "7"}));
    }

    #[test]
    fn fetch_issue_decodes_description_only() {
        let (base, server) = serve(vec![(
            200,
            r#"{"key":"PROJ-1","fields":{"summary":"x","description":"old text"}}"#,
        )]);
        let credentials = credentials();
        let client = JiraClient::new(&credentials, None);

        let text = client
            .fetch_issue_text(&issue_endpoint(&base, "PROJ-1"))
            .unwrap();
        assert_eq!(text, "old text");

        let requests = server.join().unwrap();
        assert_eq!(requests[0].request_line(), "GET /rest/api/2/issue/PROJ-1 HTTP/1.1");
        // "alice:s3cret" in base64.
        assert_eq!(
            requests[0].header("authorization").as_deref(),
            Some("Basic YWxpY2U6czNjcmV0")
        );
    }

    #[test]
    fn null_description_is_empty() {
        let (base, server) = serve(vec![(200, r#"{"fields":{"description":null}}"#)]);
        let credentials = credentials();
        let client = JiraClient::new(&credentials, None);

        let text = client.fetch_issue_text(&issue_endpoint(&base, "PROJ-1")).unwrap();
        assert_eq!(text, "");
        server.join().unwrap();
    }

    #[test]
    fn fetch_comment_decodes_body() {
        let (base, server) = serve(vec![(200, r#"{"id":"10042","body":"hello"}"#)]);
        let credentials = credentials();
        let client = JiraClient::new(&credentials, None);

        let text = client
            .fetch_comment_text(&comment_endpoint(&base, "PROJ-1", "10042"))
            .unwrap();
        assert_eq!(text, "hello");
        server.join().unwrap();
    }

    #[test]
    fn fetch_failure_is_application_error() {
        let (base, server) = serve(vec![(404, r#"{"errorMessages":["Issue does not exist"]}"#)]);
        let credentials = credentials();
        let client = JiraClient::new(&credentials, None);

        let err = client
            .fetch_issue_text(&issue_endpoint(&base, "PROJ-404"))
            .unwrap_err();
        match err {
            NetworkError::Application { status, body } => {
                assert_eq!(status, 404);
                assert!(body.contains("Issue does not exist"));
            }
            other => panic!("expected application error, got {other:?}"),
        }
        server.join().unwrap();
    }

    #[test]
    fn undecodable_payload_is_decode_error() {
        let (base, server) = serve(vec![(200, "not json")]);
        let credentials = credentials();
        let client = JiraClient::new(&credentials, None);

        let err = client
            .fetch_issue_text(&issue_endpoint(&base, "PROJ-1"))
            .unwrap_err();
        assert!(matches!(err, NetworkError::Decode { .. }));
        server.join().unwrap();
    }

    #[test]
    fn fetch_comments_follows_pages() {
        let (base, server) = serve(vec![
            (
                200,
                r#"{"startAt":0,"maxResults":2,"total":3,"comments":[{"id":"1","body":"a"},{"id":"2","body":"b"}]}"#,
            ),
            (
                200,
                r#"{"startAt":2,"maxResults":2,"total":3,"comments":[{"id":"3","body":null}]}"#,
            ),
        ]);
        let credentials = credentials();
        let client = JiraClient::new(&credentials, None);

        let comments = client
            .fetch_comments(&comments_endpoint(&base, "PROJ-1"))
            .unwrap();
        let ids: Vec<&str> = comments.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["1", "2", "3"]);
        assert_eq!(comments[2].body, "");

        let requests = server.join().unwrap();
        assert_eq!(
            requests[1].request_line(),
            "GET /rest/api/2/issue/PROJ-1/comment?startAt=2 HTTP/1.1"
        );
    }

    #[test]
    fn update_issue_nests_description_under_fields() {
        let (base, server) = serve(vec![(204, "")]);
        let credentials = credentials();
        let client = JiraClient::new(&credentials, None);

        client
            .update_issue_text(&issue_endpoint(&base, "PROJ-1"), "new text")
            .unwrap();

        let requests = server.join().unwrap();
        assert_eq!(requests[0].request_line(), "PUT /rest/api/2/issue/PROJ-1 HTTP/1.1");
        assert_eq!(
            requests[0].header("content-type").as_deref(),
            Some("application/json")
        );
        assert!(requests[0].header("authorization").is_some());
        let body: Value = serde_json::from_str(&requests[0].body).unwrap();
        assert_eq!(body, json!({"fields": {"description": "new text"}}));
    }

    #[test]
    fn update_comment_sends_top_level_body() {
        let (base, server) = serve(vec![(200, r#"{"id":"10042"}"#)]);
        let credentials = credentials();
        let client = JiraClient::new(&credentials, None);

        client
            .update_comment_text(&comment_endpoint(&base, "PROJ-1", "10042"), "edited")
            .unwrap();

        let requests = server.join().unwrap();
        assert_eq!(
            requests[0].request_line(),
            "PUT /rest/api/2/issue/PROJ-1/comment/10042 HTTP/1.1"
        );
        let body: Value = serde_json::from_str(&requests[0].body).unwrap();
        assert_eq!(body, json!({"body": "edited"}));
    }

    #[test]
    fn create_comment_posts_merged_payload() {
        let (base, server) = serve(vec![(201, r#"{"id":"10043"}"#)]);
        let credentials = credentials();
        let client = JiraClient::new(&credentials, None);
        let extra: Map<String, Value> =
            serde_json::from_str(r#"{"visibility":{"type":"role","value":"Admins"}}"#).unwrap();

        client
            .create_comment(&comments_endpoint(&base, "PROJ-1"), "note", &extra)
            .unwrap();

        let requests = server.join().unwrap();
        assert_eq!(
            requests[0].request_line(),
            "POST /rest/api/2/issue/PROJ-1/comment HTTP/1.1"
        );
        let body: Value = serde_json::from_str(&requests[0].body).unwrap();
        assert_eq!(
            body,
            json!({"visibility": {"type": "role", "value": "Admins"}, "body": "note"})
        );
    }

    #[test]
    fn write_failure_captures_status_and_body() {
        let (base, server) = serve(vec![(500, r#"{"error":"boom"}"#)]);
        let credentials = credentials();
        let client = JiraClient::new(&credentials, None);

        let err = client
            .update_issue_text(&issue_endpoint(&base, "PROJ-1"), "new text")
            .unwrap_err();
        match err {
            NetworkError::Application { status, ref body } => {
                assert_eq!(status, 500);
                assert_eq!(body, r#"{"error":"boom"}"#);
            }
            ref other => panic!("expected application error, got {other:?}"),
        }
        assert_eq!(err.to_string(), r#"got non-2xx response 500: {"error":"boom"}"#);
        server.join().unwrap();
    }

    #[test]
    fn unreachable_server_is_transport_error() {
        // Bind and drop to get a port nothing listens on.
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let credentials = credentials();
        let client = JiraClient::new(&credentials, Some(Duration::from_secs(5)));

        let err = client
            .update_comment_text(
                &comment_endpoint(&format!("http://127.0.0.1:{port}"), "PROJ-1", "1"),
                "text",
            )
            .unwrap_err();
        assert!(matches!(err, NetworkError::Transport { .. }));
    }
}
